//! Rule placement for the ZTC/ZTW ordered rule families.
//!
//! Each resource apply goes through a [`RulePlacer`]:
//!
//! - [`RuleApi`]: the remote CRUD seam, one per family
//! - [`RulePlacer`]: provisional create/update, error classification and
//!   hand-off to the [`Coordinator`](ztx_order_common::Coordinator)
//! - [`FamilyTarget`]: the settle loop's view of a family's rule list
//! - [`fail_fast`]: codes that end an apply without retrying
//! - [`sweep()`]: removal of rules left behind by acceptance runs
//! - [`ProviderConfig`]: TOML configuration for all of the above
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ztx_order_common::Coordinator;
//! use ztx_rules::{ProviderConfig, Rule, RuleFamily, RulePlacer};
//!
//! let config = ProviderConfig::load_or_default("/etc/ztx/provider.toml")?;
//! config.validate()?;
//!
//! let coordinator = Coordinator::new(config.settle_config());
//! let placer = RulePlacer::new(api, RuleFamily::ForwardingControl, coordinator)
//!     .with_options(config.placement_options());
//!
//! let created = placer.create(Rule::new("fwd-a", 3, 7)).await?;
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod fail_fast;
pub mod family;
pub mod logging;
pub mod placement;
pub mod starting_order;
pub mod sweep;

pub use api::{Rule, RuleApi};
pub use config::ProviderConfig;
pub use error::{ApiError, ApiResult, RuleError, RuleResult};
pub use family::{RuleFamily, PROVISIONAL_RANK};
pub use placement::{format_order_vs_rank, FamilyTarget, PlacementOptions, RulePlacer};
pub use starting_order::StartingOrder;
pub use sweep::sweep;
