//! In-memory snapshot of the last known release list.
//!
//! The poll loop is the only writer. Diagnostics readers take a shared
//! handle to the current snapshot and never hold the lock across work.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::{Release, ReleaseKey};

/// Last known full release list.
#[derive(Default)]
pub struct SnapshotCache {
    current: RwLock<Option<Arc<Vec<Release>>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the initial baseline. No diff is produced.
    pub fn warm(&self, releases: Vec<Release>) {
        tracing::info!(count = releases.len(), "Release snapshot warmed");
        *self.current.write() = Some(Arc::new(releases));
    }

    /// Releases in `fresh` whose identity is absent from the held snapshot.
    ///
    /// Source order is preserved and duplicates within `fresh` are reported once.
    /// The held snapshot is not modified.
    pub fn diff(&self, fresh: &[Release]) -> Vec<Release> {
        let snapshot = self.current();
        let known: HashSet<ReleaseKey> = snapshot
            .as_deref()
            .map(|releases| releases.iter().map(Release::key).collect())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        fresh
            .iter()
            .filter(|release| {
                let key = release.key();
                !known.contains(&key) && seen.insert(key)
            })
            .cloned()
            .collect()
    }

    /// Swap in a new snapshot.
    pub fn replace(&self, releases: Vec<Release>) {
        *self.current.write() = Some(Arc::new(releases));
    }

    /// The held snapshot, possibly already superseded by the time it is read.
    pub fn current(&self) -> Option<Arc<Vec<Release>>> {
        self.current.read().clone()
    }
}
