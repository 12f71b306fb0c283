//! Release source abstraction.
//!
//! The poll loop only needs the full current release list and a per-release
//! icon; everything about how the feed is fetched lives behind this trait.

mod feed;

use async_trait::async_trait;

pub use feed::FeedSource;

use crate::errors::AppError;
use crate::models::Release;

/// Where releases come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the current full release list.
    async fn fetch_all(&self) -> Result<Vec<Release>, AppError>;

    /// Thumbnail for a release, if one can be resolved.
    async fn icon_url(&self, release: &Release) -> Option<String>;
}
