//! Test infrastructure for the rule ordering coordinator
//!
//! Provides:
//! - An in-memory policy engine implementing `RuleApi`
//! - A scripted `OrderTarget` that records every push
//! - Rule and error fixtures for the ordered families
//! - Push sequence and engine state verification helpers

pub mod fixtures;
mod mock_api;
mod recording;
mod verification;

pub use fixtures::*;
pub use mock_api::{ApiCall, MockRuleApi, Operation};
pub use recording::RecordingTarget;
pub use verification::*;
