//! Verification helpers for ordering tests
//!
//! Provides assertions over push sequences and mock engine state

use std::collections::HashMap;

use thiserror::Error;
use ztx_order_common::{OrderRule, RuleId, RuleOrderPair};

use crate::MockRuleApi;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("push sequence out of order at position {index}: {previous} before {next}")]
    Unsorted {
        index: usize,
        previous: RuleOrderPair,
        next: RuleOrderPair,
    },

    #[error("rule {id} pushed to order {order} beyond the live count {count}")]
    BeyondCount { id: RuleId, order: i32, count: usize },

    #[error("rule {id} pushed {times} times")]
    Repeated { id: RuleId, times: usize },

    #[error("rule '{name}' not found in the engine")]
    RuleNotFound { name: String },

    #[error("rule '{name}' is at {actual}, expected {expected}")]
    PlacementMismatch {
        name: String,
        expected: OrderRule,
        actual: OrderRule,
    },

    #[error("rank {rank} at order {order} follows a higher rank")]
    RankInversion { order: i32, rank: i32 },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Pushes must follow the rank/order/id comparator.
pub fn verify_push_sorted(calls: &[RuleOrderPair]) -> VerifyResult<()> {
    for (index, window) in calls.windows(2).enumerate() {
        if window[0] >= window[1] {
            return Err(VerificationError::Unsorted {
                index: index + 1,
                previous: window[0],
                next: window[1],
            });
        }
    }
    Ok(())
}

/// No push may target an order beyond the count observed at push time.
pub fn verify_push_bound(calls: &[RuleOrderPair], count: usize) -> VerifyResult<()> {
    match calls.iter().find(|pair| !pair.order.fits_within(count)) {
        Some(pair) => Err(VerificationError::BeyondCount {
            id: pair.id,
            order: pair.order.order,
            count,
        }),
        None => Ok(()),
    }
}

/// Every rule is pushed at most once per round.
pub fn verify_pushed_once(calls: &[RuleOrderPair]) -> VerifyResult<()> {
    let mut seen: HashMap<RuleId, usize> = HashMap::new();
    for pair in calls {
        *seen.entry(pair.id).or_default() += 1;
    }
    match seen.into_iter().find(|(_, times)| *times > 1) {
        Some((id, times)) => Err(VerificationError::Repeated { id, times }),
        None => Ok(()),
    }
}

/// Mock engine state verifier
pub struct EngineVerifier<'a> {
    api: &'a MockRuleApi,
}

impl<'a> EngineVerifier<'a> {
    pub fn new(api: &'a MockRuleApi) -> Self {
        Self { api }
    }

    /// Verify that the rule named `name` sits at `expected`
    pub fn assert_placement(&self, name: &str, expected: OrderRule) -> VerifyResult<()> {
        let rule = self
            .api
            .rule_named(name)
            .ok_or_else(|| VerificationError::RuleNotFound {
                name: name.to_string(),
            })?;
        if rule.placement() != expected {
            return Err(VerificationError::PlacementMismatch {
                name: name.to_string(),
                expected,
                actual: rule.placement(),
            });
        }
        Ok(())
    }

    /// Verify that every `{prefix}{order}` rule sits at its own order
    pub fn assert_batch_placed(&self, prefix: &str, orders: &[i32], rank: i32) -> VerifyResult<()> {
        for order in orders {
            self.assert_placement(&format!("{prefix}{order}"), OrderRule::new(*order, rank))?;
        }
        Ok(())
    }

    /// Returns true if no rule named `name` exists
    pub fn is_absent(&self, name: &str) -> bool {
        self.api.rule_named(name).is_none()
    }

    /// Verify that ranks never decrease along the list
    pub fn assert_ranks_non_decreasing(&self) -> VerifyResult<()> {
        let rules = self.api.rules();
        for window in rules.windows(2) {
            if window[1].rank < window[0].rank {
                return Err(VerificationError::RankInversion {
                    order: window[1].order,
                    rank: window[1].rank,
                });
            }
        }
        Ok(())
    }
}
