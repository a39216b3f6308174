//! Process-wide table of rules taking part in a coordination round.
//!
//! The registry is partitioned by resource-type key so that unrelated rule
//! families never share a batch. Each partition belongs to one round, tagged
//! with a generation number, and has exactly one leader: the first rule that
//! registered into it.
//!
//! # Rounds
//!
//! A partition is created by the first [`register`](RuleRegistry::register)
//! for its key and removed by [`retire`](RuleRegistry::retire) once its
//! settle loop confirms quiescence. The next registration for the same key
//! opens a new generation with a new leader, so a later batch never observes
//! `done` flags left behind by an earlier one.
//!
//! Lookups never create entries: [`mark_done`](RuleRegistry::mark_done) on an
//! unknown key or id is a no-op.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use crate::types::{OrderRule, RegisteredRule, RuleId};

/// Outcome of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Round the rule joined.
    pub generation: u64,
    /// True if the caller became the leader of that round.
    pub is_leader: bool,
}

#[derive(Debug)]
struct Partition {
    generation: u64,
    leader: RuleId,
    entries: BTreeMap<RuleId, RegisteredRule>,
}

#[derive(Debug, Default)]
struct RegistryState {
    partitions: HashMap<String, Partition>,
    next_generation: u64,
}

/// Mutex-guarded registry of rule placements.
///
/// All methods hold the lock only for map access; none of them perform I/O.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    state: Mutex<RegistryState>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the intended placement of `id` under `resource_type`.
    ///
    /// Opens a new round if none is active and grants its leadership to `id`.
    /// Always inserts (or overwrites) the entry with `done = false`.
    pub fn register(&self, resource_type: &str, id: RuleId, intended: OrderRule) -> Registration {
        let mut guard = self.state.lock();
        let RegistryState {
            partitions,
            next_generation,
        } = &mut *guard;

        let mut is_leader = false;
        let partition = partitions
            .entry(resource_type.to_string())
            .or_insert_with(|| {
                is_leader = true;
                *next_generation += 1;
                debug!(
                    resource_type,
                    rule_id = id,
                    generation = *next_generation,
                    "Opened ordering round"
                );
                Partition {
                    generation: *next_generation,
                    leader: id,
                    entries: BTreeMap::new(),
                }
            });
        partition
            .entries
            .insert(id, RegisteredRule::pending(id, intended));

        trace!(
            resource_type,
            rule_id = id,
            generation = partition.generation,
            is_leader,
            %intended,
            "Registered rule placement"
        );

        Registration {
            generation: partition.generation,
            is_leader,
        }
    }

    /// Marks `id` as done in the active round for `resource_type`.
    ///
    /// Returns false (and changes nothing) if the entry is absent.
    pub fn mark_done(&self, resource_type: &str, id: RuleId) -> bool {
        let mut state = self.state.lock();
        match state
            .partitions
            .get_mut(resource_type)
            .and_then(|p| p.entries.get_mut(&id))
        {
            Some(entry) => {
                entry.done = true;
                true
            }
            None => {
                debug!(resource_type, rule_id = id, "mark_done for unknown rule ignored");
                false
            }
        }
    }

    /// Returns a point-in-time copy of the active round, ordered by id.
    pub fn snapshot(&self, resource_type: &str) -> Vec<RegisteredRule> {
        let state = self.state.lock();
        state
            .partitions
            .get(resource_type)
            .map(|p| p.entries.values().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the leader of the active round, if any.
    pub fn leader(&self, resource_type: &str) -> Option<RuleId> {
        self.state.lock().partitions.get(resource_type).map(|p| p.leader)
    }

    /// Returns the generation of the active round, if any.
    pub fn generation(&self, resource_type: &str) -> Option<u64> {
        self.state
            .lock()
            .partitions
            .get(resource_type)
            .map(|p| p.generation)
    }

    /// Returns the number of active rounds.
    pub fn partition_count(&self) -> usize {
        self.state.lock().partitions.len()
    }

    /// Retires round `generation` of `resource_type` if it is still quiescent.
    ///
    /// The round is removed and its entries returned only when it still holds
    /// exactly `expected_len` entries and all of them are done. Otherwise the
    /// registry is left untouched and `None` is returned.
    pub fn retire(
        &self,
        resource_type: &str,
        generation: u64,
        expected_len: usize,
    ) -> Option<Vec<RegisteredRule>> {
        let mut state = self.state.lock();
        let partition = state.partitions.get(resource_type)?;
        if partition.generation != generation
            || partition.entries.len() != expected_len
            || partition.entries.values().any(|e| !e.done)
        {
            return None;
        }

        let partition = state.partitions.remove(resource_type)?;
        debug!(
            resource_type,
            generation,
            rules = partition.entries.len(),
            "Retired ordering round"
        );
        Some(partition.entries.into_values().collect())
    }

    /// Drops round `generation` of `resource_type` without pushing anything.
    ///
    /// Returns true if the round was still active.
    pub fn abandon(&self, resource_type: &str, generation: u64) -> bool {
        let mut state = self.state.lock();
        match state.partitions.get(resource_type) {
            Some(p) if p.generation == generation => {
                state.partitions.remove(resource_type);
                debug!(resource_type, generation, "Abandoned ordering round");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Arc;

    const T: &str = "forwarding_control_rule";

    #[test]
    fn test_first_registrant_leads() {
        let registry = RuleRegistry::new();

        let first = registry.register(T, 1, OrderRule::new(1, 7));
        let second = registry.register(T, 2, OrderRule::new(2, 7));

        assert!(first.is_leader);
        assert!(!second.is_leader);
        assert_eq!(first.generation, second.generation);
        assert_eq!(registry.leader(T), Some(1));
    }

    #[test]
    fn test_partitions_are_independent() {
        let registry = RuleRegistry::new();

        assert!(registry.register(T, 1, OrderRule::new(1, 7)).is_leader);
        assert!(registry.register("traffic_forwarding_dns_rule", 1, OrderRule::new(1, 7)).is_leader);
        assert_eq!(registry.partition_count(), 2);
        assert_eq!(registry.snapshot(T).len(), 1);
    }

    #[test]
    fn test_register_overwrites_entry() {
        let registry = RuleRegistry::new();
        registry.register(T, 1, OrderRule::new(1, 7));
        registry.mark_done(T, 1);

        registry.register(T, 1, OrderRule::new(4, 3));

        let snapshot = registry.snapshot(T);
        assert_eq!(snapshot, vec![RegisteredRule::pending(1, OrderRule::new(4, 3))]);
    }

    #[test]
    fn test_mark_done_never_creates() {
        let registry = RuleRegistry::new();

        assert!(!registry.mark_done(T, 42));
        assert_eq!(registry.partition_count(), 0);

        registry.register(T, 1, OrderRule::new(1, 7));
        assert!(!registry.mark_done(T, 42));
        assert_eq!(registry.snapshot(T).len(), 1);
    }

    #[test]
    fn test_retire_requires_quiescence() {
        let registry = RuleRegistry::new();
        let reg = registry.register(T, 1, OrderRule::new(1, 7));
        registry.register(T, 2, OrderRule::new(2, 7));
        registry.mark_done(T, 1);

        // Not all done
        assert!(registry.retire(T, reg.generation, 2).is_none());

        registry.mark_done(T, 2);
        // Size changed since the caller looked
        assert!(registry.retire(T, reg.generation, 1).is_none());
        // Wrong round
        assert!(registry.retire(T, reg.generation + 1, 2).is_none());

        let retired = registry.retire(T, reg.generation, 2).unwrap();
        assert_eq!(retired.len(), 2);
        assert!(retired.iter().all(|r| r.done));
        assert!(registry.snapshot(T).is_empty());
        assert_eq!(registry.leader(T), None);
    }

    #[test]
    fn test_new_round_after_retire() {
        let registry = RuleRegistry::new();
        let first = registry.register(T, 1, OrderRule::new(1, 7));
        registry.mark_done(T, 1);
        registry.retire(T, first.generation, 1).unwrap();

        // A late mark_done from the old round is ignored
        assert!(!registry.mark_done(T, 1));

        let next = registry.register(T, 5, OrderRule::new(1, 7));
        assert!(next.is_leader);
        assert!(next.generation > first.generation);
        assert_eq!(registry.snapshot(T), vec![RegisteredRule::pending(5, OrderRule::new(1, 7))]);
    }

    #[test]
    fn test_abandon_only_matching_generation() {
        let registry = RuleRegistry::new();
        let reg = registry.register(T, 1, OrderRule::new(1, 7));

        assert!(!registry.abandon(T, reg.generation + 1));
        assert!(registry.abandon(T, reg.generation));
        assert!(!registry.abandon(T, reg.generation));
        assert_eq!(registry.partition_count(), 0);
    }

    #[test]
    fn test_exactly_one_leader_under_contention() {
        let registry = Arc::new(RuleRegistry::new());

        let handles: Vec<_> = (0..32)
            .map(|id| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register(T, id, OrderRule::new(id as i32, 7)))
            })
            .collect();

        let registrations: Vec<Registration> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registrations.iter().filter(|r| r.is_leader).count(), 1);
        assert_eq!(registry.snapshot(T).len(), 32);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register(RuleId),
        MarkDone(RuleId),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (100i64..120).prop_map(Op::Register),
            (100i64..120).prop_map(Op::MarkDone),
        ]
    }

    proptest! {
        #[test]
        fn prop_done_is_monotonic(ops in proptest::collection::vec(arb_op(), 0..40)) {
            let registry = RuleRegistry::new();
            registry.register(T, 1, OrderRule::new(1, 7));
            registry.mark_done(T, 1);

            for op in ops {
                match op {
                    Op::Register(id) => { registry.register(T, id, OrderRule::new(2, 7)); }
                    Op::MarkDone(id) => { registry.mark_done(T, id); }
                }
                let entry = registry.snapshot(T).into_iter().find(|r| r.id == 1);
                prop_assert!(entry.map(|r| r.done).unwrap_or(false));
            }
        }
    }
}
