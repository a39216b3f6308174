//! Error types for rule placement.
//!
//! [`ApiError`] is what a [`RuleApi`](crate::api::RuleApi) backend returns;
//! [`RuleError`] is what the placement layer hands back to the resource
//! apply, after classifying the remote error.

use thiserror::Error;
use ztx_order_common::{OrderError, RuleId};

/// Result type alias for remote rule API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for placement operations.
pub type RuleResult<T> = Result<T, RuleError>;

/// Errors returned by the remote rule API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The API answered with a non-success status.
    #[error("API responded with status {status}: {body}")]
    Response {
        /// HTTP status code.
        status: u16,
        /// Raw response body, usually `{"code": "...", "message": "..."}`.
        body: String,
    },

    /// The request never produced a structured response.
    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    code: String,
}

impl ApiError {
    /// Creates a response error.
    pub fn response(status: u16, body: impl Into<String>) -> Self {
        Self::Response {
            status,
            body: body.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns the API error code if the response body carries one.
    pub fn code(&self) -> Option<String> {
        match self {
            ApiError::Response { body, .. } => serde_json::from_str::<ErrorBody>(body)
                .ok()
                .map(|b| b.code),
            ApiError::Transport(_) => None,
        }
    }

    /// Returns true if the error means the rule does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Response { status: 404, .. } => true,
            ApiError::Response { .. } => self.code().as_deref() == Some("RESOURCE_NOT_FOUND"),
            ApiError::Transport(_) => false,
        }
    }
}

/// Errors that can occur while placing rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The API returned a code that retrying cannot fix.
    #[error("Failing immediately due to API error code '{code}': {source}")]
    FailFast {
        /// The matched error code.
        code: String,
        /// The underlying API error.
        #[source]
        source: ApiError,
    },

    /// The engine refused the provisional rank/order combination.
    #[error(
        "error creating resource: {name}, please check the order {order} vs rank {rank}, \
         current rules:{current_rules} , err:{source}"
    )]
    RankOrderConflict {
        /// Rule name.
        name: String,
        /// Intended order.
        order: i32,
        /// Rank the request was sent with.
        rank: i32,
        /// `Rank r VS Order o` dump of the remote rules.
        current_rules: String,
        /// The underlying API error.
        #[source]
        source: ApiError,
    },

    /// Remote create failed.
    #[error("error creating resource: {name}: {source}")]
    Create {
        /// Rule name.
        name: String,
        /// The underlying API error.
        #[source]
        source: ApiError,
    },

    /// Remote update failed.
    #[error("error updating rule {id}: {source}")]
    Update {
        /// Rule id.
        id: RuleId,
        /// The underlying API error.
        #[source]
        source: ApiError,
    },

    /// Remote delete failed.
    #[error("error deleting rule {id}: {source}")]
    Delete {
        /// Rule id.
        id: RuleId,
        /// The underlying API error.
        #[source]
        source: ApiError,
    },

    /// Remote lookup failed.
    #[error("error retrieving rule {id}: {source}")]
    Lookup {
        /// Rule id.
        id: RuleId,
        /// The underlying API error.
        #[source]
        source: ApiError,
    },

    /// Remote listing failed.
    #[error("error listing rules: {source}")]
    List {
        /// The underlying API error.
        #[source]
        source: ApiError,
    },

    /// The rule ships with the tenant and cannot be deleted.
    #[error("predefined rule '{name}' cannot be deleted")]
    PredefinedRule {
        /// Rule name.
        name: String,
    },

    /// The starting order could not be read from the remote engine.
    #[error("failed to determine the starting order: {source}")]
    StartingOrder {
        /// The underlying API error.
        #[source]
        source: ApiError,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration for {field}: {message}")]
    Config {
        /// The field or file that failed.
        field: String,
        /// Error message.
        message: String,
    },

    /// Coordinator failure.
    #[error(transparent)]
    Settle(#[from] OrderError),
}

impl RuleError {
    /// Creates a create error.
    pub fn create(name: impl Into<String>, source: ApiError) -> Self {
        Self::Create {
            name: name.into(),
            source,
        }
    }

    /// Creates an update error.
    pub fn update(id: RuleId, source: ApiError) -> Self {
        Self::Update { id, source }
    }

    /// Creates a delete error.
    pub fn delete(id: RuleId, source: ApiError) -> Self {
        Self::Delete { id, source }
    }

    /// Creates a lookup error.
    pub fn lookup(id: RuleId, source: ApiError) -> Self {
        Self::Lookup { id, source }
    }

    /// Creates a listing error.
    pub fn list(source: ApiError) -> Self {
        Self::List { source }
    }

    /// Creates a configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the remote error behind this failure, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            RuleError::FailFast { source, .. }
            | RuleError::RankOrderConflict { source, .. }
            | RuleError::Create { source, .. }
            | RuleError::Update { source, .. }
            | RuleError::Delete { source, .. }
            | RuleError::Lookup { source, .. }
            | RuleError::List { source }
            | RuleError::StartingOrder { source } => Some(source),
            RuleError::PredefinedRule { .. }
            | RuleError::Config { .. }
            | RuleError::Settle(_) => None,
        }
    }

    /// Returns true if the apply should stop without retrying.
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            RuleError::FailFast { .. } | RuleError::RankOrderConflict { .. }
        )
    }
}
