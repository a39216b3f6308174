//! Per-call rule placement and the remote target the settle loop drives.
//!
//! A create never asks the engine for its intended placement directly: the
//! rule lands at the end of the list under the provisional rank, then joins
//! the coordinator's round for its family. Once the round settles, the leader
//! pushes every intended placement in rank/order/id sequence.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use ztx_order_common::{
    Coordinator, OrderError, OrderResult, OrderRule, OrderTarget, RuleId, RuleOrderPair,
};

use crate::api::{Rule, RuleApi};
use crate::error::{ApiError, RuleError, RuleResult};
use crate::fail_fast::{fail_fast_code, is_rank_order_conflict};
use crate::family::{RuleFamily, PROVISIONAL_RANK};
use crate::starting_order::StartingOrder;

/// Tuning for provisional placements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementOptions {
    /// Rank every write is sent with until the settle loop pushes the
    /// intended rank. Creates keep intended ranks above it.
    pub provisional_rank: i32,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            provisional_rank: PROVISIONAL_RANK,
        }
    }
}

impl PlacementOptions {
    /// Placement a create is sent with, given the order it should land at.
    pub fn provisional(&self, intended: OrderRule, order: i32) -> OrderRule {
        OrderRule::new(order, intended.rank.max(self.provisional_rank))
    }
}

/// Placement the caller asked for, with an unset order falling back to 1.
fn intended_placement(rule: &Rule) -> OrderRule {
    let placement = rule.placement();
    if placement.order == 0 {
        warn!(name = %rule.name, "Rule order is 0, using order 1 instead");
        return OrderRule::new(1, placement.rank);
    }
    placement
}

/// Renders `Rank r VS Order o, ...` for a rank/order conflict diagnostic.
pub fn format_order_vs_rank(rules: &[Rule]) -> String {
    rules
        .iter()
        .map(|r| format!("Rank {} VS Order {}", r.rank, r.order))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy)]
enum Write {
    Create,
    Update(RuleId),
}

/// Creates, updates and deletes the rules of one family.
pub struct RulePlacer<A> {
    api: Arc<A>,
    family: RuleFamily,
    coordinator: Coordinator,
    starting_order: StartingOrder,
    options: PlacementOptions,
}

impl<A: RuleApi + 'static> RulePlacer<A> {
    pub fn new(api: Arc<A>, family: RuleFamily, coordinator: Coordinator) -> Self {
        Self {
            api,
            family,
            coordinator,
            starting_order: StartingOrder::new(),
            options: PlacementOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlacementOptions) -> Self {
        self.options = options;
        self
    }

    pub fn family(&self) -> RuleFamily {
        self.family
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Starting order, once the first create has read it.
    pub fn starting_order(&self) -> Option<i32> {
        self.starting_order.get()
    }

    /// Creates `rule` at a provisional placement and hands its intended
    /// placement to the coordinator.
    ///
    /// Returns the rule as the engine reports it after the hand-off. When
    /// this call leads its round and `await_reorder` is set, that is after
    /// the round has been pushed.
    #[instrument(skip(self, rule), fields(family = %self.family, name = %rule.name))]
    pub async fn create(&self, rule: Rule) -> RuleResult<Rule> {
        let started = Instant::now();
        let starting_order = self.starting_order.get_or_init(self.api.as_ref()).await?;
        let without_init = Instant::now();

        let intended = intended_placement(&rule);
        let provisional = self.options.provisional(intended, starting_order);
        let request = rule.with_placement(provisional);

        let created = match self.api.create(&request).await {
            Ok(created) => created,
            Err(err) => {
                return Err(self
                    .classify(Write::Create, &request.name, intended, provisional, err)
                    .await)
            }
        };
        info!(
            rule_id = created.id,
            %intended,
            %provisional,
            took_ms = started.elapsed().as_millis() as u64,
            without_init_ms = without_init.elapsed().as_millis() as u64,
            "Created rule at provisional placement"
        );

        self.hand_off(created.id, intended).await?;
        self.api
            .get(created.id)
            .await
            .map_err(|err| RuleError::lookup(created.id, err))
    }

    /// Reads a rule. Returns `Ok(None)` if the engine no longer has it.
    pub async fn read(&self, id: RuleId) -> RuleResult<Option<Rule>> {
        match self.api.get(id).await {
            Ok(rule) => Ok(Some(rule)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(RuleError::lookup(id, err)),
        }
    }

    /// Moves `id` to the end of the list at the provisional rank, writes
    /// the rest of `rule`, then hands the intended placement to the
    /// coordinator as a create does.
    ///
    /// Returns `Ok(None)` if the rule no longer exists remotely.
    #[instrument(skip(self, rule), fields(family = %self.family, rule_id = id))]
    pub async fn update(&self, id: RuleId, rule: Rule) -> RuleResult<Option<Rule>> {
        if self.read(id).await?.is_none() {
            warn!("Rule not found, removing from state");
            return Ok(None);
        }

        let existing = self.api.get_all().await.map_err(RuleError::list)?;
        let last_order = existing
            .iter()
            .map(|r| RuleOrderPair::new(r.id, r.placement()))
            .max()
            .map_or(1, |pair| pair.order.order);

        let intended = intended_placement(&rule);
        let provisional = OrderRule::new(last_order, self.options.provisional_rank);
        let request = rule.with_id(id).with_placement(provisional);

        if let Err(err) = self.api.update(id, &request).await {
            return Err(self
                .classify(Write::Update(id), &request.name, intended, provisional, err)
                .await);
        }
        debug!(%intended, %provisional, "Updated rule at provisional placement");

        self.hand_off(id, intended).await?;
        self.read(id).await
    }

    /// Deletes `id` unless it is one of the family's predefined rules.
    #[instrument(skip(self), fields(family = %self.family))]
    pub async fn delete(&self, id: RuleId) -> RuleResult<()> {
        let Some(rule) = self.read(id).await? else {
            warn!(rule_id = id, "Rule already gone");
            return Ok(());
        };
        self.family.ensure_deletable(&rule)?;

        self.api
            .delete(id)
            .await
            .map_err(|err| RuleError::delete(id, err))?;
        info!(rule_id = id, name = %rule.name, "Deleted rule");
        Ok(())
    }

    /// `Rank r VS Order o` dump of the remote rules, or an empty string if
    /// they cannot be listed.
    pub async fn order_vs_rank_table(&self) -> String {
        match self.api.get_all().await {
            Ok(rules) => format_order_vs_rank(&rules),
            Err(err) => {
                debug!(error = %err, "Could not list rules for the conflict diagnostic");
                String::new()
            }
        }
    }

    async fn hand_off(&self, id: RuleId, intended: OrderRule) -> RuleResult<()> {
        let resource_type = self.family.resource_type();
        let target: Arc<dyn OrderTarget> =
            Arc::new(FamilyTarget::new(Arc::clone(&self.api), self.family));

        let placement = self
            .coordinator
            .place_and_maybe_lead(intended, id, resource_type, target);
        self.coordinator.mark_done(id, resource_type);

        let Some(handle) = placement.into_handle() else {
            debug!(rule_id = id, "Joined reorder round as follower");
            return Ok(());
        };
        if !self.coordinator.config().await_reorder {
            debug!(
                rule_id = id,
                generation = handle.generation(),
                "Leaving reorder round to settle in the background"
            );
            return Ok(());
        }

        let report = handle.join().await?;
        info!(
            rule_id = id,
            generation = report.generation,
            outcome = ?report.outcome,
            pushed = report.pushed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Reorder round finished"
        );
        Ok(())
    }

    async fn classify(
        &self,
        write: Write,
        name: &str,
        intended: OrderRule,
        sent: OrderRule,
        err: ApiError,
    ) -> RuleError {
        if is_rank_order_conflict(&err) {
            let current_rules = self.order_vs_rank_table().await;
            return RuleError::RankOrderConflict {
                name: name.to_string(),
                order: intended.order,
                rank: sent.rank,
                current_rules,
                source: err,
            };
        }
        if let Some(code) = fail_fast_code(&err) {
            return RuleError::FailFast {
                code: code.to_string(),
                source: err,
            };
        }
        match write {
            Write::Create => RuleError::create(name, err),
            Write::Update(id) => RuleError::update(id, err),
        }
    }
}

/// [`OrderTarget`] over one family's remote rule list.
pub struct FamilyTarget<A> {
    api: Arc<A>,
    family: RuleFamily,
}

impl<A> FamilyTarget<A> {
    pub fn new(api: Arc<A>, family: RuleFamily) -> Self {
        Self { api, family }
    }
}

#[async_trait]
impl<A: RuleApi + 'static> OrderTarget for FamilyTarget<A> {
    async fn rule_count(&self) -> OrderResult<usize> {
        self.api
            .get_all()
            .await
            .map(|rules| rules.len())
            .map_err(|err| OrderError::remote("get_all", err.to_string()))
    }

    async fn update_order(&self, id: RuleId, order: OrderRule) -> OrderResult<()> {
        let current = self
            .api
            .get(id)
            .await
            .map_err(|err| OrderError::remote("get", err.to_string()))?;
        if current.placement() == order {
            debug!(family = %self.family, rule_id = id, %order, "Rule already in place");
            return Ok(());
        }

        self.api
            .update(id, &current.with_placement(order))
            .await
            .map_err(|err| OrderError::remote("update", err.to_string()))?;
        Ok(())
    }

    fn before_reorder(&self) {
        debug!(family = %self.family, "Pushing intended placements");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiResult;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use ztx_order_common::SettleConfig;

    #[derive(Default)]
    struct MemoryApi {
        rules: Mutex<Vec<Rule>>,
        next_id: Mutex<RuleId>,
        create_error: Mutex<Option<ApiError>>,
        creates: Mutex<Vec<Rule>>,
        updates: Mutex<Vec<(RuleId, OrderRule)>>,
        deletes: Mutex<Vec<RuleId>>,
    }

    impl MemoryApi {
        fn with_rules(rules: Vec<Rule>) -> Self {
            let next_id = rules.iter().map(|r| r.id).max().unwrap_or(0);
            Self {
                rules: Mutex::new(rules),
                next_id: Mutex::new(next_id),
                ..Default::default()
            }
        }

        fn placement_of(&self, id: RuleId) -> OrderRule {
            self.rules
                .lock()
                .iter()
                .find(|r| r.id == id)
                .map(Rule::placement)
                .unwrap()
        }
    }

    #[async_trait]
    impl RuleApi for MemoryApi {
        async fn get_all(&self) -> ApiResult<Vec<Rule>> {
            Ok(self.rules.lock().clone())
        }

        async fn get(&self, id: RuleId) -> ApiResult<Rule> {
            self.rules
                .lock()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| ApiError::response(404, r#"{"code":"RESOURCE_NOT_FOUND"}"#))
        }

        async fn create(&self, rule: &Rule) -> ApiResult<Rule> {
            self.creates.lock().push(rule.clone());
            if let Some(err) = self.create_error.lock().clone() {
                return Err(err);
            }
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            let created = rule.clone().with_id(*next_id);
            self.rules.lock().push(created.clone());
            Ok(created)
        }

        async fn update(&self, id: RuleId, rule: &Rule) -> ApiResult<Rule> {
            self.updates.lock().push((id, rule.placement()));
            let mut rules = self.rules.lock();
            let slot = rules
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| ApiError::response(404, ""))?;
            *slot = rule.clone().with_id(id);
            Ok(slot.clone())
        }

        async fn delete(&self, id: RuleId) -> ApiResult<()> {
            self.deletes.lock().push(id);
            self.rules.lock().retain(|r| r.id != id);
            Ok(())
        }
    }

    fn placer(api: Arc<MemoryApi>, family: RuleFamily) -> RulePlacer<MemoryApi> {
        RulePlacer::new(api, family, Coordinator::new(SettleConfig::default()))
    }

    #[test]
    fn test_provisional_rank() {
        let options = PlacementOptions::default();
        assert_eq!(options.provisional(OrderRule::new(3, 1), 10), OrderRule::new(10, 7));
        assert_eq!(options.provisional(OrderRule::new(3, 7), 10), OrderRule::new(10, 7));
        assert_eq!(options.provisional(OrderRule::new(3, 9), 10), OrderRule::new(10, 9));
    }

    #[test]
    fn test_format_order_vs_rank() {
        let rules = vec![Rule::new("a", 1, 7), Rule::new("b", 2, 0)];
        assert_eq!(format_order_vs_rank(&rules), "Rank 7 VS Order 1, Rank 0 VS Order 2");
        assert_eq!(format_order_vs_rank(&[]), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_lands_provisionally_then_settles() {
        let api = Arc::new(MemoryApi::default());
        let placer = placer(api.clone(), RuleFamily::ForwardingControl);

        let created = placer.create(Rule::new("fwd-a", 1, 2)).await.unwrap();

        assert_eq!(api.creates.lock()[0].placement(), OrderRule::new(1, 7));
        assert_eq!(placer.starting_order(), Some(1));
        assert_eq!(created.placement(), OrderRule::new(1, 2));
        assert_eq!(*api.updates.lock(), vec![(created.id, OrderRule::new(1, 2))]);
        assert_eq!(placer.coordinator().active_rounds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_starts_after_existing_rules() {
        let api = Arc::new(MemoryApi::with_rules(vec![
            Rule::new("ZPA Resolver", 1, 7).with_id(1),
            Rule::new("Redirect Resolution of Zscaler Domains to WAN CTR", 2, 7).with_id(2),
        ]));
        let placer = placer(api.clone(), RuleFamily::DnsForwarding);

        let created = placer.create(Rule::new("dns-a", 3, 7)).await.unwrap();

        assert_eq!(api.creates.lock()[0].order, 3);
        // Already where it was asked to be, so the push is skipped.
        assert_eq!(created.placement(), OrderRule::new(3, 7));
        assert!(api.updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_create_conflict_carries_rule_table() {
        let api = Arc::new(MemoryApi::with_rules(vec![Rule::new("a", 1, 7).with_id(1)]));
        *api.create_error.lock() = Some(ApiError::response(
            400,
            r#"{"code":"INVALID_INPUT_ARGUMENT","message":"Rule with rank 7 is not allowed at order 2"}"#,
        ));
        let placer = placer(api.clone(), RuleFamily::ForwardingControl);

        let err = placer.create(Rule::new("fwd-b", 5, 3)).await.unwrap_err();

        match err {
            RuleError::RankOrderConflict {
                name,
                order,
                rank,
                current_rules,
                ..
            } => {
                assert_eq!(name, "fwd-b");
                assert_eq!(order, 5);
                assert_eq!(rank, 7);
                assert_eq!(current_rules, "Rank 7 VS Order 1");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(placer.coordinator().snapshot("forwarding_control_rule").is_empty());
    }

    #[tokio::test]
    async fn test_create_fail_fast_and_generic_errors() {
        let api = Arc::new(MemoryApi::default());
        let placer = placer(api.clone(), RuleFamily::TrafficLogForwarding);

        *api.create_error.lock() = Some(ApiError::response(400, r#"{"code":"DUPLICATE_ITEM"}"#));
        let err = placer.create(Rule::new("log-a", 1, 7)).await.unwrap_err();
        assert!(matches!(err, RuleError::FailFast { ref code, .. } if code == "DUPLICATE_ITEM"));

        *api.create_error.lock() = Some(ApiError::transport("connection reset"));
        let err = placer.create(Rule::new("log-a", 1, 7)).await.unwrap_err();
        assert!(matches!(err, RuleError::Create { ref name, .. } if name == "log-a"));
        assert!(!err.is_fail_fast());
    }

    #[tokio::test]
    async fn test_update_missing_rule() {
        let api = Arc::new(MemoryApi::default());
        let placer = placer(api.clone(), RuleFamily::ForwardingControl);

        assert_eq!(placer.update(99, Rule::new("gone", 1, 7)).await.unwrap(), None);
        assert!(api.updates.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_moves_to_end_then_settles() {
        let api = Arc::new(MemoryApi::with_rules(vec![
            Rule::new("a", 1, 7).with_id(1),
            Rule::new("b", 2, 7).with_id(2),
            Rule::new("c", 3, 7).with_id(3),
        ]));
        let placer = placer(api.clone(), RuleFamily::ForwardingControl);

        let updated = placer
            .update(1, Rule::new("a-renamed", 2, 7))
            .await
            .unwrap()
            .unwrap();

        let updates = api.updates.lock().clone();
        assert_eq!(updates[0], (1, OrderRule::new(3, 7)));
        assert_eq!(updates.last(), Some(&(1, OrderRule::new(2, 7))));
        assert_eq!(updated.name, "a-renamed");
        assert_eq!(api.placement_of(1), OrderRule::new(2, 7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_sends_provisional_rank_regardless_of_intended() {
        let api = Arc::new(MemoryApi::with_rules(vec![
            Rule::new("a", 1, 7).with_id(1),
            Rule::new("b", 2, 7).with_id(2),
        ]));
        let placer = placer(api.clone(), RuleFamily::DnsForwarding);

        placer.update(1, Rule::new("a", 1, 9)).await.unwrap().unwrap();

        assert_eq!(
            *api.updates.lock(),
            vec![(1, OrderRule::new(2, 7)), (1, OrderRule::new(1, 9))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_zero_falls_back_to_one() {
        let api = Arc::new(MemoryApi::default());
        let placer = placer(api.clone(), RuleFamily::TrafficLogForwarding);

        let created = placer.create(Rule::new("log-a", 0, 3)).await.unwrap();

        assert_eq!(created.placement(), OrderRule::new(1, 3));
        assert_eq!(*api.updates.lock(), vec![(created.id, OrderRule::new(1, 3))]);
    }

    #[tokio::test]
    async fn test_delete_refuses_predefined() {
        let api = Arc::new(MemoryApi::with_rules(vec![
            Rule::new("ZPA Forwarding Rule", 1, 7).with_id(1),
            Rule::new("tf-acc-test-fwd", 2, 7).with_id(2),
        ]));
        let placer = placer(api.clone(), RuleFamily::ForwardingControl);

        let err = placer.delete(1).await.unwrap_err();
        assert!(matches!(err, RuleError::PredefinedRule { .. }));

        placer.delete(2).await.unwrap();
        placer.delete(2).await.unwrap();
        assert_eq!(*api.deletes.lock(), vec![2]);
    }

    #[tokio::test]
    async fn test_family_target_skips_rules_in_place() {
        let api = Arc::new(MemoryApi::with_rules(vec![
            Rule::new("a", 1, 7).with_id(1),
            Rule::new("b", 2, 7).with_id(2),
        ]));
        let target = FamilyTarget::new(api.clone(), RuleFamily::ForwardingControl);

        assert_eq!(target.rule_count().await.unwrap(), 2);
        target.update_order(1, OrderRule::new(1, 7)).await.unwrap();
        target.update_order(2, OrderRule::new(1, 3)).await.unwrap();

        assert_eq!(*api.updates.lock(), vec![(2, OrderRule::new(1, 3))]);
        assert!(target.update_order(9, OrderRule::new(1, 7)).await.is_err());
    }
}
