//! Error handling module for the release notifier.
//!
//! Provides the centralized error taxonomy shared by the poll loop, the
//! subscription store and the delivery path.

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const SOURCE_UNAVAILABLE: &str = "SOURCE_UNAVAILABLE";
    pub const TENANT_NOT_FOUND: &str = "TENANT_NOT_FOUND";
    pub const DELIVERY_REJECTED: &str = "DELIVERY_REJECTED";
    pub const STORE_WRITE_CONFLICT: &str = "STORE_WRITE_CONFLICT";
    pub const CORRUPT_SUBSCRIPTION: &str = "CORRUPT_SUBSCRIPTION";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Why a delivery sink refused a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The destination no longer exists.
    DestinationGone,
    /// The sender lacks permission to post there.
    PermissionDenied,
    /// Rate limits, server errors, connection failures.
    Transient,
    /// The call did not complete within the delivery timeout.
    TimedOut,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::DestinationGone => "destination_gone",
            RejectReason::PermissionDenied => "permission_denied",
            RejectReason::Transient => "transient",
            RejectReason::TimedOut => "timed_out",
        }
    }

    /// Whether retrying the same destination later can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, RejectReason::DestinationGone)
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Release feed fetch failed or timed out
    SourceUnavailable(String),
    /// No subscription row for the tenant
    TenantNotFound(u64),
    /// Delivery sink refused the message
    DeliveryRejected {
        reason: RejectReason,
        message: String,
    },
    /// Optimistic concurrency retries exhausted on a subscription row
    StoreWriteConflict(u64),
    /// Persisted subscription JSON does not match the typed model
    CorruptSubscription { tenant_id: u64, message: String },
    /// Database error
    Database(String),
    /// Invalid configuration value
    Config(String),
    /// Internal error
    Internal(String),
}

impl AppError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::SourceUnavailable(_) => codes::SOURCE_UNAVAILABLE,
            AppError::TenantNotFound(_) => codes::TENANT_NOT_FOUND,
            AppError::DeliveryRejected { .. } => codes::DELIVERY_REJECTED,
            AppError::StoreWriteConflict(_) => codes::STORE_WRITE_CONFLICT,
            AppError::CorruptSubscription { .. } => codes::CORRUPT_SUBSCRIPTION,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Config(_) => codes::CONFIG_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::SourceUnavailable(msg) => msg.clone(),
            AppError::TenantNotFound(id) => format!("Tenant {} not found", id),
            AppError::DeliveryRejected { reason, message } => {
                format!("{} ({})", message, reason.as_str())
            }
            AppError::StoreWriteConflict(id) => {
                format!("Concurrent modification of tenant {} not resolved", id)
            }
            AppError::CorruptSubscription { tenant_id, message } => {
                format!("Subscription for tenant {} is malformed: {}", tenant_id, message)
            }
            AppError::Database(msg) => msg.clone(),
            AppError::Config(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
        }
    }

    /// Shorthand for a delivery rejection.
    pub fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        AppError::DeliveryRejected {
            reason,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}
