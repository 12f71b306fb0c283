//! JSON release feed over HTTP.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;

use super::ReleaseSource;
use crate::errors::AppError;
use crate::models::{Category, Release, ReleaseKey};

/// Vendor logo used when the feed carries no icon for a release.
pub const DEFAULT_ICON_URL: &str =
    "https://www.apple.com/ac/structured-data/images/open_graph_logo.png";

/// One entry of the feed document.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    category: String,
    version: String,
    #[serde(default)]
    build: Option<String>,
    released: DateTime<Utc>,
    link: String,
    #[serde(default)]
    icon: Option<String>,
}

/// Release source backed by a JSON array served over HTTP.
pub struct FeedSource {
    client: Client,
    url: String,
    icons: Mutex<HashMap<ReleaseKey, String>>,
}

impl FeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("release-notifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            icons: Mutex::new(HashMap::new()),
        })
    }

    fn into_release(entry: FeedEntry) -> (Release, Option<String>) {
        let product = entry.category.trim().to_string();
        let category = Category::from_label(&product);
        let build_number = entry
            .build
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        let release = Release {
            category,
            product,
            version: entry.version.trim().to_string(),
            build_number,
            release_date: entry.released,
            link: entry.link,
        };
        (release, entry.icon)
    }
}

#[async_trait]
impl ReleaseSource for FeedSource {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch_all(&self) -> Result<Vec<Release>, AppError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("Feed request failed: {}", e)))?;

        let response = response
            .error_for_status()
            .map_err(|e| AppError::SourceUnavailable(format!("Feed returned error: {}", e)))?;

        let entries: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("Feed body is invalid: {}", e)))?;

        let mut icons = HashMap::new();
        let mut releases = Vec::with_capacity(entries.len());
        for (index, value) in entries.into_iter().enumerate() {
            let entry: FeedEntry = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping malformed feed entry");
                    continue;
                }
            };
            let (release, icon) = Self::into_release(entry);
            if let Some(icon) = icon {
                icons.insert(release.key(), icon);
            }
            releases.push(release);
        }

        tracing::debug!(count = releases.len(), "Fetched release feed");
        *self.icons.lock() = icons;
        Ok(releases)
    }

    async fn icon_url(&self, release: &Release) -> Option<String> {
        let recorded = self.icons.lock().get(&release.key()).cloned();
        Some(recorded.unwrap_or_else(|| DEFAULT_ICON_URL.to_string()))
    }
}
