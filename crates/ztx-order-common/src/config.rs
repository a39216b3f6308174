//! Settle loop tuning.

use std::time::Duration;

use crate::error::{OrderError, OrderResult};

/// Default interval between quiescence checks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of consecutive equal-size observations required.
pub const DEFAULT_STABILITY_WINDOW: usize = 3;

/// Tuning for the settle-and-reorder loop.
///
/// Quiescence detection is a timeout heuristic: a round is considered settled
/// once its size has not changed for `stability_window` consecutive ticks and
/// every member has reported done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleConfig {
    /// Interval between quiescence checks. The first check happens one full
    /// interval after the leader registers.
    pub tick_interval: Duration,
    /// Consecutive ticks that must observe the same round size.
    pub stability_window: usize,
    /// Upper bound on ticks before the round is abandoned. `None` polls until
    /// quiescence or cancellation.
    pub max_ticks: Option<u64>,
    /// Whether a leader's create/update call waits for the reorder to finish
    /// before returning.
    pub await_reorder: bool,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            stability_window: DEFAULT_STABILITY_WINDOW,
            max_ticks: None,
            await_reorder: true,
        }
    }
}

impl SettleConfig {
    /// Sets the tick interval.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Sets the stability window.
    pub fn with_stability_window(mut self, stability_window: usize) -> Self {
        self.stability_window = stability_window;
        self
    }

    /// Bounds the number of ticks.
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Sets whether leaders wait for the reorder.
    pub fn with_await_reorder(mut self, await_reorder: bool) -> Self {
        self.await_reorder = await_reorder;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> OrderResult<()> {
        if self.tick_interval.is_zero() {
            return Err(OrderError::invalid_config(
                "tick_interval",
                "must be greater than zero",
            ));
        }
        if self.stability_window == 0 {
            return Err(OrderError::invalid_config(
                "stability_window",
                "must be at least 1",
            ));
        }
        if self.max_ticks == Some(0) {
            return Err(OrderError::invalid_config("max_ticks", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SettleConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(30));
        assert_eq!(config.stability_window, 3);
        assert_eq!(config.max_ticks, None);
        assert!(config.await_reorder);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(SettleConfig::default()
            .with_tick_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SettleConfig::default()
            .with_stability_window(0)
            .validate()
            .is_err());
        assert!(SettleConfig::default().with_max_ticks(0).validate().is_err());
    }
}
