//! Configuration module for the release notifier.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// URL of the JSON release feed
    pub feed_url: String,
    /// Base URL of the chat platform REST API
    pub api_base: String,
    /// Bot token used by the delivery sink
    pub bot_token: Option<String>,
    /// Address the diagnostics endpoint binds to
    pub bind_addr: SocketAddr,
    /// Pause between the end of one tick and the start of the next
    pub poll_interval: Duration,
    /// Upper bound on a single feed fetch
    pub fetch_timeout: Duration,
    /// Upper bound on a single per-tenant delivery
    pub delivery_timeout: Duration,
    /// Maximum in-flight deliveries for one release
    pub delivery_concurrency: usize,
    /// How long an in-flight tick may run after shutdown is requested
    pub shutdown_grace: Duration,
    /// Footer text on every notification
    pub footer_text: String,
    /// Footer icon on every notification
    pub footer_icon_url: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("RELEASES_DB_PATH")
            .unwrap_or_else(|_| "./data/releases.sqlite".to_string())
            .into();

        let feed_url = env::var("RELEASES_FEED_URL")
            .unwrap_or_else(|_| "https://releases.example.com/feed.json".to_string());

        let api_base = env::var("RELEASES_API_BASE")
            .unwrap_or_else(|_| "https://discord.com/api/v10".to_string());

        let bot_token = env::var("RELEASES_BOT_TOKEN").ok();

        let bind_addr = env::var("RELEASES_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|_| AppError::Config("Invalid RELEASES_BIND_ADDR format".to_string()))?;

        let poll_interval = Duration::from_secs(parse_var("RELEASES_POLL_INTERVAL_SECS", 60)?);
        let fetch_timeout = Duration::from_secs(parse_var("RELEASES_FETCH_TIMEOUT_SECS", 30)?);
        let delivery_timeout =
            Duration::from_secs(parse_var("RELEASES_DELIVERY_TIMEOUT_SECS", 15)?);
        let delivery_concurrency = parse_var("RELEASES_DELIVERY_CONCURRENCY", 8)?.max(1) as usize;
        let shutdown_grace = Duration::from_secs(parse_var("RELEASES_SHUTDOWN_GRACE_SECS", 10)?);

        let footer_text =
            env::var("RELEASES_FOOTER_TEXT").unwrap_or_else(|_| "Apple Releases".to_string());
        let footer_icon_url = env::var("RELEASES_FOOTER_ICON_URL").ok();

        let log_level = env::var("RELEASES_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            db_path,
            feed_url,
            api_base,
            bot_token,
            bind_addr,
            poll_interval,
            fetch_timeout,
            delivery_timeout,
            delivery_concurrency,
            shutdown_grace,
            footer_text,
            footer_icon_url,
            log_level,
        })
    }
}

fn parse_var(name: &str, default: u64) -> Result<u64, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid {} value: {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}
