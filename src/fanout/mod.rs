//! Fan-out of one release to every subscribed tenant.
//!
//! Deliveries for a release run concurrently up to a fixed bound and are all
//! awaited before `dispatch` returns. A failing tenant never stops the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use crate::db::SubscriptionStore;
use crate::delivery::DeliverySink;
use crate::errors::{AppError, RejectReason};
use crate::models::{Category, ChannelId, Payload, Release, TenantId};
use crate::render::{ping, NotificationRenderer};
use crate::source::ReleaseSource;

/// Per-release delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Tenants with the category disabled or without a destination
    pub skipped: usize,
    pub failed: usize,
}

/// Tunables for a dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub concurrency: usize,
    pub delivery_timeout: Duration,
}

/// Delivers new releases to every eligible tenant.
pub struct FanoutDispatcher {
    store: SubscriptionStore,
    source: Arc<dyn ReleaseSource>,
    sink: Arc<dyn DeliverySink>,
    renderer: NotificationRenderer,
    config: DispatchConfig,
}

struct Target {
    tenant_id: TenantId,
    channel: ChannelId,
    content: String,
}

impl FanoutDispatcher {
    pub fn new(
        store: SubscriptionStore,
        source: Arc<dyn ReleaseSource>,
        sink: Arc<dyn DeliverySink>,
        renderer: NotificationRenderer,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            source,
            sink,
            renderer,
            config,
        }
    }

    /// Deliver `release` to every tenant that has its category enabled.
    ///
    /// Only a store failure (including a malformed row) is returned as an
    /// error; delivery failures are counted in the report.
    #[tracing::instrument(
        skip_all,
        fields(category = %release.category, version = %release.version)
    )]
    pub async fn dispatch(&self, release: &Release) -> Result<DispatchReport, AppError> {
        let icon = match tokio::time::timeout(
            self.config.delivery_timeout,
            self.source.icon_url(release),
        )
        .await
        {
            Ok(icon) => icon,
            Err(_) => {
                tracing::warn!("Icon lookup timed out, rendering without thumbnail");
                None
            }
        };
        let base = self.renderer.render(release, icon, Utc::now());

        let mut report = DispatchReport::default();
        let mut targets = Vec::new();
        for (tenant_id, sub) in self.store.list_all().await? {
            let config = sub.get(release.category);
            match config.destination() {
                Some(channel) => targets.push(Target {
                    tenant_id,
                    channel,
                    content: ping(config),
                }),
                None => report.skipped += 1,
            }
        }

        let outcomes: Vec<(Target, Result<(), AppError>)> = stream::iter(targets)
            .map(|target| {
                let mut payload = base.clone();
                payload.content = Some(target.content.clone());
                async move {
                    let result = deliver_within(
                        self.sink.as_ref(),
                        self.config.delivery_timeout,
                        target.channel,
                        &payload,
                    )
                    .await;
                    (target, result)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (target, result) in outcomes {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    self.record_failure(release.category, &target, err).await;
                }
            }
        }

        tracing::info!(
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Release dispatched"
        );
        Ok(report)
    }

    async fn record_failure(&self, category: Category, target: &Target, err: AppError) {
        let reason = match &err {
            AppError::DeliveryRejected { reason, .. } => *reason,
            _ => RejectReason::Transient,
        };

        tracing::warn!(
            tenant_id = target.tenant_id,
            channel = target.channel,
            reason = reason.as_str(),
            error = %err,
            "Delivery rejected"
        );

        if !reason.is_permanent() {
            return;
        }

        match self
            .store
            .clear_destination(target.tenant_id, category, target.channel)
            .await
        {
            Ok(true) => tracing::info!(
                tenant_id = target.tenant_id,
                %category,
                "Cleared destination that no longer exists"
            ),
            Ok(false) => {}
            Err(AppError::TenantNotFound(tenant_id)) => {
                tracing::debug!(tenant_id, "Tenant left during dispatch")
            }
            Err(e) => tracing::warn!(
                tenant_id = target.tenant_id,
                error = %e,
                "Failed to clear stale destination"
            ),
        }
    }
}

/// One delivery bounded by `limit`; expiry is a `TimedOut` rejection.
async fn deliver_within(
    sink: &dyn DeliverySink,
    limit: Duration,
    channel: ChannelId,
    payload: &Payload,
) -> Result<(), AppError> {
    match tokio::time::timeout(limit, sink.deliver(channel, payload)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::rejected(
            RejectReason::TimedOut,
            "Delivery did not complete in time",
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use mockall::predicate::{always, eq};
    use tempfile::TempDir;

    use super::*;
    use crate::db::init_database;
    use crate::delivery::MockDeliverySink;
    use crate::models::{RoleId, TenantSubscription};
    use crate::render::Branding;
    use crate::source::MockReleaseSource;

    async fn store() -> (SubscriptionStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .expect("Failed to init DB");
        (SubscriptionStore::new(pool), temp_dir)
    }

    async fn join(
        store: &SubscriptionStore,
        tenant_id: TenantId,
        channel: Option<ChannelId>,
        enabled: bool,
    ) {
        let roles: BTreeMap<Category, RoleId> =
            Category::ALL.into_iter().map(|c| (c, tenant_id * 10)).collect();
        store
            .upsert_on_join(tenant_id, &TenantSubscription::with_roles(&roles).unwrap())
            .await
            .unwrap();
        store
            .set_category_config(tenant_id, Category::Ios, channel, enabled, tenant_id * 10)
            .await
            .unwrap();
    }

    fn source() -> Arc<dyn ReleaseSource> {
        let mut source = MockReleaseSource::new();
        source.expect_icon_url().returning(|_| None);
        Arc::new(source)
    }

    fn dispatcher(store: SubscriptionStore, sink: MockDeliverySink) -> FanoutDispatcher {
        dispatcher_with(store, source(), Arc::new(sink), Duration::from_secs(5))
    }

    fn dispatcher_with(
        store: SubscriptionStore,
        source: Arc<dyn ReleaseSource>,
        sink: Arc<dyn DeliverySink>,
        delivery_timeout: Duration,
    ) -> FanoutDispatcher {
        FanoutDispatcher::new(
            store,
            source,
            sink,
            NotificationRenderer::new(Branding {
                footer_text: "Apple Releases".to_string(),
                footer_icon_url: None,
            }),
            DispatchConfig {
                concurrency: 4,
                delivery_timeout,
            },
        )
    }

    /// Never answers for `stalled`; records every other delivery.
    #[derive(Default)]
    struct StallingSink {
        stalled: ChannelId,
        delivered: Mutex<Vec<(ChannelId, Payload)>>,
    }

    #[async_trait]
    impl DeliverySink for StallingSink {
        async fn deliver(&self, destination: ChannelId, payload: &Payload) -> Result<(), AppError> {
            if destination == self.stalled {
                std::future::pending::<()>().await;
            }
            self.delivered.lock().push((destination, payload.clone()));
            Ok(())
        }
    }

    /// Icon lookup that never completes.
    struct StallingIcons;

    #[async_trait]
    impl ReleaseSource for StallingIcons {
        async fn fetch_all(&self) -> Result<Vec<Release>, AppError> {
            Ok(Vec::new())
        }

        async fn icon_url(&self, _release: &Release) -> Option<String> {
            std::future::pending().await
        }
    }

    fn ios_release() -> Release {
        Release {
            category: Category::Ios,
            product: "iOS".to_string(),
            version: "17.1".to_string(),
            build_number: Some("21B74".to_string()),
            release_date: Utc.with_ymd_and_hms(2023, 10, 25, 17, 0, 0).unwrap(),
            link: "https://example.com/notes".to_string(),
        }
    }

    #[tokio::test]
    async fn test_disabled_and_unset_tenants_are_skipped() {
        let (store, _dir) = store().await;
        join(&store, 1, Some(100), true).await;
        join(&store, 2, Some(200), false).await;
        join(&store, 3, None, true).await;

        let mut sink = MockDeliverySink::new();
        sink.expect_deliver()
            .with(eq(100), always())
            .times(1)
            .returning(|_, payload| {
                assert_eq!(payload.content.as_deref(), Some("<@&10>"));
                assert_eq!(payload.embed.description, "17.1");
                Ok(())
            });

        let report = dispatcher(store, sink).dispatch(&ios_release()).await.unwrap();
        assert_eq!(
            report,
            DispatchReport {
                delivered: 1,
                skipped: 2,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_other_category_routing_is_independent() {
        let (store, _dir) = store().await;
        join(&store, 1, Some(100), true).await;

        let mut sink = MockDeliverySink::new();
        sink.expect_deliver().never();

        let mut release = ios_release();
        release.category = Category::MacOs;
        let report = dispatcher(store, sink).dispatch(&release).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_one_failing_tenant_does_not_block_others() {
        let (store, _dir) = store().await;
        for tenant_id in 1..=5 {
            join(&store, tenant_id, Some(tenant_id * 100), true).await;
        }

        let mut sink = MockDeliverySink::new();
        sink.expect_deliver().times(5).returning(|channel, _| {
            if channel == 300 {
                Err(AppError::rejected(RejectReason::PermissionDenied, "Missing Access"))
            } else {
                Ok(())
            }
        });

        let report = dispatcher(store.clone(), sink)
            .dispatch(&ios_release())
            .await
            .unwrap();
        assert_eq!(report.delivered, 4);
        assert_eq!(report.failed, 1);

        // Permission problems are not permanent; the destination stays.
        assert_eq!(store.get(3).await.unwrap().get(Category::Ios).channel, Some(300));
    }

    #[tokio::test]
    async fn test_gone_destination_is_cleared() {
        let (store, _dir) = store().await;
        join(&store, 1, Some(100), true).await;
        join(&store, 2, Some(200), true).await;

        let mut sink = MockDeliverySink::new();
        sink.expect_deliver().times(2).returning(|channel, _| {
            if channel == 100 {
                Err(AppError::rejected(RejectReason::DestinationGone, "Unknown Channel"))
            } else {
                Ok(())
            }
        });

        let report = dispatcher(store.clone(), sink)
            .dispatch(&ios_release())
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);

        let cfg = store.get(1).await.unwrap().get(Category::Ios).clone();
        assert_eq!(cfg.channel, None);
        assert!(cfg.enabled);
        assert_eq!(store.get(2).await.unwrap().get(Category::Ios).channel, Some(200));
    }

    #[tokio::test]
    async fn test_no_tenants() {
        let (store, _dir) = store().await;
        let mut sink = MockDeliverySink::new();
        sink.expect_deliver().never();

        let report = dispatcher(store, sink).dispatch(&ios_release()).await.unwrap();
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_corrupt_row_is_surfaced() {
        let (store, _dir) = store().await;
        store.write_raw(1, "not json").await.unwrap();

        let mut sink = MockDeliverySink::new();
        sink.expect_deliver().never();

        let err = dispatcher(store, sink)
            .dispatch(&ios_release())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CORRUPT_SUBSCRIPTION");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_delivery_times_out() {
        let sink = StallingSink {
            stalled: 100,
            ..Default::default()
        };
        let payload = NotificationRenderer::new(Branding {
            footer_text: "Apple Releases".to_string(),
            footer_icon_url: None,
        })
        .render(&ios_release(), None, Utc::now());

        let err = deliver_within(&sink, Duration::from_secs(15), 100, &payload)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::DeliveryRejected {
                reason: RejectReason::TimedOut,
                ..
            }
        ));

        deliver_within(&sink, Duration::from_secs(15), 200, &payload)
            .await
            .unwrap();
        assert_eq!(sink.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_hung_tenant_does_not_block_others() {
        let (store, _dir) = store().await;
        for tenant_id in 1..=3 {
            join(&store, tenant_id, Some(tenant_id * 100), true).await;
        }

        let sink = Arc::new(StallingSink {
            stalled: 200,
            ..Default::default()
        });
        let report = dispatcher_with(
            store.clone(),
            source(),
            Arc::clone(&sink) as Arc<dyn DeliverySink>,
            Duration::from_millis(50),
        )
        .dispatch(&ios_release())
        .await
        .unwrap();

        assert_eq!(
            report,
            DispatchReport {
                delivered: 2,
                skipped: 0,
                failed: 1
            }
        );
        let mut channels: Vec<ChannelId> = sink.delivered.lock().iter().map(|(c, _)| *c).collect();
        channels.sort_unstable();
        assert_eq!(channels, vec![100, 300]);
        // A timeout is not permanent; the destination stays.
        assert_eq!(store.get(2).await.unwrap().get(Category::Ios).channel, Some(200));
    }

    #[tokio::test]
    async fn test_hung_icon_lookup_renders_without_thumbnail() {
        let (store, _dir) = store().await;
        join(&store, 1, Some(100), true).await;

        let sink = Arc::new(StallingSink::default());
        let report = dispatcher_with(
            store,
            Arc::new(StallingIcons),
            Arc::clone(&sink) as Arc<dyn DeliverySink>,
            Duration::from_millis(50),
        )
        .dispatch(&ios_release())
        .await
        .unwrap();

        assert_eq!(report.delivered, 1);
        let delivered = sink.delivered.lock();
        assert_eq!(delivered[0].0, 100);
        assert!(delivered[0].1.embed.thumbnail.is_none());
    }
}
