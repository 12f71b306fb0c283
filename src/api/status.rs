//! Poll loop and snapshot endpoints.

use axum::extract::State;
use serde::Serialize;

use super::ApiResponse;
use crate::models::Release;
use crate::poller::PollState;
use crate::AppState;

/// Body of `GET /api/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub state: PollState,
    pub ticks: u64,
    /// Releases in the held snapshot; `None` before the first warm-up
    pub snapshot_size: Option<usize>,
}

/// GET /api/status - Poll loop state and tick counter.
pub async fn get_status(State(state): State<AppState>) -> ApiResponse<StatusView> {
    let status = *state.status.borrow();
    let snapshot_size = state.cache.current().map(|s| s.len());

    ApiResponse::new(StatusView {
        state: status.state,
        ticks: status.ticks,
        snapshot_size,
    })
}

/// GET /api/snapshot - The cached release list.
pub async fn get_snapshot(State(state): State<AppState>) -> ApiResponse<Vec<Release>> {
    let releases = state
        .cache
        .current()
        .map(|s| s.as_ref().clone())
        .unwrap_or_default();

    ApiResponse::new(releases)
}
