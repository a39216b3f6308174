//! Cross-resource rule ordering coordinator.
//!
//! Terraform applies every rule resource independently and concurrently, but
//! the remote policy engine keeps one globally ordered rule list partitioned
//! by admin rank. This crate reconciles the two:
//!
//! - [`RuleRegistry`]: per resource-type table of intended placements
//! - [`RuleOrderPair`]: rank, then order, then id comparator for push order
//! - [`Coordinator`]: registration/completion API, leader election and
//!   background settle task management
//! - [`OrderTarget`]: the remote operations a settle loop needs
//! - [`SettleConfig`]: tick interval and stability window tuning
//!
//! # Flow
//!
//! 1. Each rule apply creates its remote object at a provisional placement
//! 2. It registers its intended placement with the [`Coordinator`]; the first
//!    registrant of a resource type leads the round
//! 3. It marks itself done
//! 4. The leader's settle loop waits until the round stops growing and every
//!    member is done, then pushes the sorted placements that fit within the
//!    live rule count
//!
//! # Example
//!
//! ```ignore
//! use ztx_order_common::{Coordinator, OrderRule, SettleConfig};
//!
//! let coordinator = Coordinator::new(SettleConfig::default());
//! let placement = coordinator.place_and_maybe_lead(intended, id, "forwarding_control_rule", target);
//! coordinator.mark_done(id, "forwarding_control_rule");
//! if let Some(handle) = placement.into_handle() {
//!     handle.join().await?;
//! }
//! ```

mod config;
mod coordinator;
mod error;
mod registry;
mod settle;
mod target;
mod types;

pub use config::{SettleConfig, DEFAULT_STABILITY_WINDOW, DEFAULT_TICK_INTERVAL};
pub use coordinator::{Coordinator, Placement, SettleHandle};
pub use error::{OrderError, OrderResult};
pub use registry::{Registration, RuleRegistry};
pub use settle::{SettleOutcome, SettleReport, SettleState};
pub use target::OrderTarget;
pub use types::{sort_pairs, OrderRule, RegisteredRule, RuleId, RuleOrderPair};
