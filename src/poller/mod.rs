//! The poll loop: fetch, diff, fan out, sleep.
//!
//! One long-lived task owns the snapshot cache as its only writer. Ticks are
//! strictly sequential; the interval is measured from the end of one tick to
//! the start of the next.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::cache::SnapshotCache;
use crate::errors::AppError;
use crate::fanout::{DispatchReport, FanoutDispatcher};
use crate::models::Release;
use crate::source::ReleaseSource;

/// Where the loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    Uninitialized,
    Warmed,
    Polling,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First successful fetch recorded as the baseline
    Warmed,
    /// Nothing new since the held snapshot
    NoChange,
    /// Fetch failed or timed out; treated as no change
    SourceUnavailable,
    /// New releases were fanned out
    Dispatched {
        releases: usize,
        report: DispatchReport,
    },
}

/// Observable loop status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStatus {
    pub state: PollState,
    /// Completed ticks since start
    pub ticks: u64,
}

/// Loop timing.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub shutdown_grace: Duration,
}

/// Scheduler driving fetch, diff and fan-out.
pub struct PollLoop {
    source: Arc<dyn ReleaseSource>,
    cache: Arc<SnapshotCache>,
    dispatcher: FanoutDispatcher,
    config: PollConfig,
    status: watch::Sender<PollStatus>,
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn ReleaseSource>,
        cache: Arc<SnapshotCache>,
        dispatcher: FanoutDispatcher,
        config: PollConfig,
    ) -> Self {
        let (status, _) = watch::channel(PollStatus {
            state: PollState::Uninitialized,
            ticks: 0,
        });
        Self {
            source,
            cache,
            dispatcher,
            config,
            status,
        }
    }

    /// A handle for readers of the loop status.
    pub fn status(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    fn state(&self) -> PollState {
        self.status.borrow().state
    }

    /// Run one tick.
    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = match self.state() {
            PollState::Uninitialized => match self.fetch().await {
                Ok(releases) => {
                    self.cache.warm(releases);
                    self.set_state(PollState::Warmed);
                    TickOutcome::Warmed
                }
                Err(_) => TickOutcome::SourceUnavailable,
            },
            PollState::Warmed | PollState::Polling => match self.fetch().await {
                Ok(current) => {
                    self.set_state(PollState::Polling);
                    self.apply(current).await
                }
                Err(_) => TickOutcome::SourceUnavailable,
            },
        };

        self.status.send_modify(|s| s.ticks += 1);
        tracing::debug!(ticks = self.status.borrow().ticks, ?outcome, "Tick complete");
        outcome
    }

    /// Diff against the held snapshot and fan out anything new.
    async fn apply(&self, current: Vec<Release>) -> TickOutcome {
        let diff = self.cache.diff(&current);
        if diff.is_empty() {
            return TickOutcome::NoChange;
        }

        tracing::info!(count = diff.len(), "New releases detected");
        // Replace before dispatch so a cancelled tick never leaves a partial snapshot.
        self.cache.replace(current);

        let mut total = DispatchReport::default();
        for release in &diff {
            match self.dispatcher.dispatch(release).await {
                Ok(report) => {
                    total.delivered += report.delivered;
                    total.skipped += report.skipped;
                    total.failed += report.failed;
                }
                Err(e) => tracing::error!(
                    category = %release.category,
                    version = %release.version,
                    error = %e,
                    "Dispatch aborted"
                ),
            }
        }

        TickOutcome::Dispatched {
            releases: diff.len(),
            report: total,
        }
    }

    async fn fetch(&self) -> Result<Vec<Release>, AppError> {
        let result = match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch_all())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::SourceUnavailable(format!(
                "Fetch did not complete within {:?}",
                self.config.fetch_timeout
            ))),
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Release source unavailable, retrying next interval");
        }
        result
    }

    fn set_state(&self, state: PollState) {
        self.status.send_if_modified(|s| {
            let changed = s.state != state;
            s.state = state;
            changed
        });
    }

    /// Wait for `ready`, then tick until `cancel` fires.
    ///
    /// A tick in flight when shutdown is requested gets `shutdown_grace` to finish.
    pub async fn run(mut self, ready: oneshot::Receiver<()>, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Poll loop cancelled before start");
                return;
            }
            signal = ready => {
                if signal.is_err() {
                    tracing::warn!("Readiness signal dropped, poll loop not started");
                    return;
                }
            }
        }

        tracing::info!(interval = ?self.config.interval, "Poll loop started");
        let grace = self.config.shutdown_grace;
        let interval = self.config.interval;

        loop {
            let tick = self.tick();
            tokio::pin!(tick);
            let cancelled = tokio::select! {
                _ = &mut tick => false,
                _ = cancel.cancelled() => {
                    if tokio::time::timeout(grace, &mut tick).await.is_err() {
                        tracing::warn!(?grace, "In-flight tick abandoned after grace period");
                    }
                    true
                }
            };
            if cancelled {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("Poll loop stopped");
    }
}
