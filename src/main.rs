//! Release Notifier
//!
//! Polls a vendor release feed and announces new releases to every subscribed
//! community, routed by per-tenant category settings stored in SQLite.

mod api;
mod cache;
mod cli;
mod config;
mod db;
mod delivery;
mod errors;
mod fanout;
mod models;
mod poller;
mod render;
mod source;

use std::sync::Arc;

use axum::{routing::get, Router};
use clap::Parser;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cache::SnapshotCache;
use cli::{Cli, Command};
use config::Config;
use db::SubscriptionStore;
use delivery::ChatApiSink;
use errors::AppError;
use fanout::{DispatchConfig, FanoutDispatcher};
use poller::{PollConfig, PollLoop, PollStatus};
use render::{Branding, NotificationRenderer};
use source::{FeedSource, ReleaseSource};

/// State shared with the diagnostics handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SnapshotCache>,
    pub status: watch::Receiver<PollStatus>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = db::init_database(&config.db_path).await?;
    let store = SubscriptionStore::new(pool);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, store).await,
        Command::Tenant { action } => {
            cli::run_tenant(&store, action).await?;
            Ok(())
        }
    }
}

async fn serve(config: Config, store: SubscriptionStore) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting release notifier");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Feed URL: {}", config.feed_url);
    tracing::info!("Bind address: {}", config.bind_addr);

    let token = config
        .bot_token
        .clone()
        .ok_or_else(|| AppError::Config("RELEASES_BOT_TOKEN is required to serve".to_string()))?;

    let source: Arc<dyn ReleaseSource> =
        Arc::new(FeedSource::new(config.feed_url.clone(), config.fetch_timeout)?);
    let sink = Arc::new(ChatApiSink::new(
        config.api_base.clone(),
        token,
        config.delivery_timeout,
    )?);
    let cache = Arc::new(SnapshotCache::new());

    let dispatcher = FanoutDispatcher::new(
        store,
        Arc::clone(&source),
        sink,
        NotificationRenderer::new(Branding {
            footer_text: config.footer_text.clone(),
            footer_icon_url: config.footer_icon_url.clone(),
        }),
        DispatchConfig {
            concurrency: config.delivery_concurrency,
            delivery_timeout: config.delivery_timeout,
        },
    );

    let poll_loop = PollLoop::new(
        source,
        Arc::clone(&cache),
        dispatcher,
        PollConfig {
            interval: config.poll_interval,
            fetch_timeout: config.fetch_timeout,
            shutdown_grace: config.shutdown_grace,
        },
    );

    let state = AppState {
        cache,
        status: poll_loop.status(),
    };

    let cancel = CancellationToken::new();
    let (ready_tx, ready_rx) = oneshot::channel();
    let poller = tokio::spawn(poll_loop.run(ready_rx, cancel.clone()));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
            }
            cancel.cancel();
        });
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Diagnostics listening on {}", config.bind_addr);

    // Everything the loop depends on is up.
    let _ = ready_tx.send(());

    let shutdown = cancel.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    poller.await?;
    tracing::info!("Release notifier stopped");
    Ok(())
}

/// Create the diagnostics router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(api::get_status))
        .route("/snapshot", get(api::get_snapshot));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
