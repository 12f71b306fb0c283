//! Data models for the release notifier.

mod payload;
mod release;
mod subscription;

pub use payload::*;
pub use release::*;
pub use subscription::*;
