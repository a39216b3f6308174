//! Provider configuration file.
//!
//! ```toml
//! [settle]
//! tick_interval_secs = 30
//! stability_window = 3
//! await_reorder = true
//!
//! [placement]
//! provisional_rank = 7
//! sweep_prefixes = ["tf-acc-test-", "tf-updated-"]
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use ztx_order_common::SettleConfig;

use crate::error::{RuleError, RuleResult};
use crate::family::PROVISIONAL_RANK;
use crate::placement::PlacementOptions;
use crate::sweep::default_sweep_prefixes;

/// Complete provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub settle: SettleSection,

    #[serde(default)]
    pub placement: PlacementSection,
}

/// `[settle]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleSection {
    /// Seconds between settle loop observations.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Equal consecutive observations required before pushing.
    #[serde(default = "default_stability_window")]
    pub stability_window: usize,

    /// Ticks after which a round is abandoned. Unbounded if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ticks: Option<u64>,

    /// Whether the leading apply waits for its round to be pushed.
    #[serde(default = "default_await_reorder")]
    pub await_reorder: bool,
}

/// `[placement]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementSection {
    #[serde(default = "default_provisional_rank")]
    pub provisional_rank: i32,

    /// Name prefixes the sweeper removes.
    #[serde(default = "default_sweep_prefixes")]
    pub sweep_prefixes: Vec<String>,
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_stability_window() -> usize {
    3
}

fn default_await_reorder() -> bool {
    true
}

fn default_provisional_rank() -> i32 {
    PROVISIONAL_RANK
}

impl Default for SettleSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            stability_window: default_stability_window(),
            max_ticks: None,
            await_reorder: default_await_reorder(),
        }
    }
}

impl Default for PlacementSection {
    fn default() -> Self {
        Self {
            provisional_rank: default_provisional_rank(),
            sweep_prefixes: default_sweep_prefixes(),
        }
    }
}

impl ProviderConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> RuleResult<Self> {
        toml::from_str(content).map_err(|e| RuleError::config("toml", e.to_string()))
    }

    /// Loads configuration from `path`, falling back to defaults if the
    /// file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> RuleResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| {
                RuleError::config(path.display().to_string(), e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RuleError::config(path.display().to_string(), e.to_string())),
        }
    }

    /// Writes configuration to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> RuleResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| RuleError::config("toml", format!("Failed to serialize config: {e}")))?;
        fs::write(path, content)
            .map_err(|e| RuleError::config(path.display().to_string(), e.to_string()))
    }

    /// Checks every value and the settle configuration derived from them.
    pub fn validate(&self) -> RuleResult<()> {
        if self.placement.provisional_rank < 0 {
            return Err(RuleError::config(
                "placement.provisional_rank",
                "must be >= 0",
            ));
        }
        if self.placement.sweep_prefixes.iter().any(String::is_empty) {
            return Err(RuleError::config(
                "placement.sweep_prefixes",
                "an empty prefix would match every rule",
            ));
        }
        self.settle_config().validate()?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.settle.tick_interval_secs)
    }

    /// Settle loop configuration for the coordinator.
    pub fn settle_config(&self) -> SettleConfig {
        let config = SettleConfig::default()
            .with_tick_interval(self.tick_interval())
            .with_stability_window(self.settle.stability_window)
            .with_await_reorder(self.settle.await_reorder);
        match self.settle.max_ticks {
            Some(max_ticks) => config.with_max_ticks(max_ticks),
            None => config,
        }
    }

    pub fn placement_options(&self) -> PlacementOptions {
        PlacementOptions {
            provisional_rank: self.placement.provisional_rank,
        }
    }
}
