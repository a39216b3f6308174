//! Placement value types and the push-order comparator.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of a remote policy rule.
pub type RuleId = i64;

/// Intended placement of a rule: fine-grained order within a coarse rank tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRule {
    /// Position within the full ordered rule list.
    pub order: i32,
    /// Admin rank tier.
    pub rank: i32,
}

impl OrderRule {
    /// Creates a new placement.
    pub fn new(order: i32, rank: i32) -> Self {
        Self { order, rank }
    }

    /// Returns true if this placement fits within a remote list of `count` rules.
    ///
    /// Orders start at 1. Placements beyond the live count are skipped by the
    /// settle loop, never clamped.
    pub fn fits_within(&self, count: usize) -> bool {
        self.order >= 1 && i64::from(self.order) <= count as i64
    }
}

impl fmt::Display for OrderRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {} rank {}", self.order, self.rank)
    }
}

/// A rule participating in a coordination round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredRule {
    /// Remote rule ID.
    pub id: RuleId,
    /// Placement the owner asked for.
    pub intended: OrderRule,
    /// Set once the owner's remote create/update has returned.
    pub done: bool,
}

impl RegisteredRule {
    /// Creates a pending (not yet done) entry.
    pub fn pending(id: RuleId, intended: OrderRule) -> Self {
        Self {
            id,
            intended,
            done: false,
        }
    }

    /// Returns the sortable pair for this entry.
    pub fn pair(&self) -> RuleOrderPair {
        RuleOrderPair::new(self.id, self.intended)
    }
}

/// A `(rule id, placement)` pair in push order.
///
/// Pairs sort by rank, then order, then id, all ascending. The id tie-break
/// makes the push sequence deterministic for identical placements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleOrderPair {
    pub id: RuleId,
    pub order: OrderRule,
}

impl RuleOrderPair {
    pub fn new(id: RuleId, order: OrderRule) -> Self {
        Self { id, order }
    }
}

impl Ord for RuleOrderPair {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .rank
            .cmp(&other.order.rank)
            .then_with(|| self.order.order.cmp(&other.order.order))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RuleOrderPair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RuleOrderPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.order)
    }
}

/// Builds the push sequence for a set of registered rules.
pub fn sort_pairs<'a>(rules: impl IntoIterator<Item = &'a RegisteredRule>) -> Vec<RuleOrderPair> {
    let mut pairs: Vec<RuleOrderPair> = rules.into_iter().map(RegisteredRule::pair).collect();
    pairs.sort();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn pair(id: RuleId, order: i32, rank: i32) -> RuleOrderPair {
        RuleOrderPair::new(id, OrderRule::new(order, rank))
    }

    #[test]
    fn test_rank_is_primary_key() {
        assert!(pair(9, 50, 0) < pair(1, 1, 7));
    }

    #[test]
    fn test_order_breaks_rank_ties() {
        assert!(pair(9, 2, 7) < pair(1, 3, 7));
    }

    #[test]
    fn test_id_breaks_full_ties() {
        assert!(pair(1, 3, 7) < pair(2, 3, 7));
        assert_eq!(pair(1, 3, 7).cmp(&pair(1, 3, 7)), Ordering::Equal);
    }

    #[test]
    fn test_sort_pairs() {
        let rules = [
            RegisteredRule::pending(10, OrderRule::new(5, 7)),
            RegisteredRule::pending(11, OrderRule::new(3, 7)),
            RegisteredRule::pending(12, OrderRule::new(1, 7)),
            RegisteredRule::pending(13, OrderRule::new(4, 0)),
        ];
        let ids: Vec<RuleId> = sort_pairs(&rules).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![13, 12, 11, 10]);
    }

    #[test]
    fn test_fits_within() {
        assert!(OrderRule::new(3, 7).fits_within(3));
        assert!(!OrderRule::new(4, 7).fits_within(3));
        assert!(!OrderRule::new(0, 7).fits_within(3));
        assert!(!OrderRule::new(-1, 7).fits_within(0));
        assert!(!OrderRule::new(1, 7).fits_within(0));
    }

    fn arb_pair() -> impl Strategy<Value = RuleOrderPair> {
        // Narrow ranges so ties on every field show up often.
        (0i64..4, -1i32..4, 0i32..8).prop_map(|(id, order, rank)| pair(id, order, rank))
    }

    proptest! {
        #[test]
        fn prop_comparator_is_strict_total_order(a in arb_pair(), b in arb_pair(), c in arb_pair()) {
            // Irreflexive
            prop_assert!(!(a < a));
            // Antisymmetric, and equality only for identical pairs
            prop_assert!(!(a < b && b < a));
            if a.cmp(&b) == Ordering::Equal {
                prop_assert_eq!(a, b);
            }
            // Total
            prop_assert!(a < b || b < a || a == b);
            // Transitive
            if a < b && b < c {
                prop_assert!(a < c);
            }
        }

        #[test]
        fn prop_sort_is_deterministic(mut pairs in proptest::collection::vec(arb_pair(), 0..16)) {
            let mut reversed: Vec<RuleOrderPair> = pairs.iter().rev().copied().collect();
            pairs.sort();
            reversed.sort();
            prop_assert_eq!(pairs, reversed);
        }
    }
}
