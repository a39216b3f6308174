//! Tracing subscriber setup for provider processes.

use tracing_subscriber::EnvFilter;

use crate::error::{RuleError, RuleResult};

/// Default directive when neither `RUST_LOG` nor a filter is given.
pub const DEFAULT_FILTER: &str = "ztx_rules=info,ztx_order_common=info";

/// Installs a global fmt subscriber.
///
/// `filter` takes precedence over `RUST_LOG`. Fails if the filter does not
/// parse or a global subscriber is already installed.
pub fn init_logging(filter: Option<&str>) -> RuleResult<()> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| RuleError::config("log_filter", e.to_string()))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .try_init()
        .map_err(|e| RuleError::config("log_filter", e.to_string()))
}
