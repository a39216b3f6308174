//! Error types for the ordering coordinator.

use thiserror::Error;

/// Result type alias for coordinator operations.
pub type OrderResult<T> = Result<T, OrderError>;

/// Errors produced by order targets and the coordinator.
///
/// The settle loop never propagates these to the registering caller; they are
/// logged and recorded in the [`SettleReport`](crate::SettleReport).
#[derive(Debug, Clone, Error)]
pub enum OrderError {
    /// A remote call made on behalf of the settle loop failed.
    #[error("Remote {operation} failed: {message}")]
    Remote {
        /// The remote operation (e.g. "rule_count", "update_order").
        operation: String,
        /// Error message.
        message: String,
    },

    /// The background settle task panicked or was aborted.
    #[error("Settle task for '{resource_type}' failed: {message}")]
    SettleTask {
        /// Partition the task was coordinating.
        resource_type: String,
        /// Error message.
        message: String,
    },

    /// Invalid settle configuration.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },
}

impl OrderError {
    /// Creates a remote call error.
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a settle task error.
    pub fn settle_task(resource_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SettleTask {
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}
