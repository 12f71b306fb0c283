//! Delivery sink abstraction.

mod chat;

use async_trait::async_trait;

pub use chat::ChatApiSink;

use crate::errors::AppError;
use crate::models::{ChannelId, Payload};

/// Somewhere rendered notifications are posted.
///
/// Failures are reported as `AppError::DeliveryRejected` with a reason the
/// dispatcher can act on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, destination: ChannelId, payload: &Payload) -> Result<(), AppError>;
}
