//! In-memory policy engine.
//!
//! Rules live in one positional list, as on the real engine: inserting or
//! moving a rule to an order shifts the rules behind it, and orders are
//! always renumbered `1..=n` afterwards.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use ztx_order_common::{OrderRule, RuleId};
use ztx_rules::{ApiError, ApiResult, Rule, RuleApi};

use crate::fixtures::{conflict_error, not_found_error};

/// Remote operation kinds, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetAll,
    Get,
    Create,
    Update,
    Delete,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    GetAll,
    Get(RuleId),
    Create { name: String, placement: OrderRule },
    Update { id: RuleId, placement: OrderRule },
    Delete(RuleId),
}

#[derive(Default)]
struct EngineState {
    rules: Vec<Rule>,
    next_id: RuleId,
    validate_ranks: bool,
    faults: HashMap<Operation, VecDeque<ApiError>>,
    sticky_faults: HashMap<Operation, ApiError>,
    calls: Vec<ApiCall>,
}

impl EngineState {
    fn take_fault(&mut self, op: Operation) -> Option<ApiError> {
        if let Some(err) = self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Some(err);
        }
        self.sticky_faults.get(&op).cloned()
    }

    fn position_of(&self, id: RuleId) -> Option<usize> {
        self.rules.iter().position(|r| r.id == id)
    }

    fn place(&mut self, rule: Rule) -> usize {
        let max = self.rules.len() as i64 + 1;
        let order = i64::from(rule.order).clamp(1, max);
        let index = (order - 1) as usize;
        self.rules.insert(index, rule);
        self.renumber();
        index
    }

    fn renumber(&mut self) {
        for (index, rule) in self.rules.iter_mut().enumerate() {
            rule.order = index as i32 + 1;
        }
    }

    /// Ranks must not decrease along the list.
    fn rank_violation(&self, index: usize) -> bool {
        let rank = self.rules[index].rank;
        let before = self.rules[..index].iter().any(|r| r.rank > rank);
        let after = self.rules[index + 1..].iter().any(|r| r.rank < rank);
        before || after
    }
}

/// In-memory [`RuleApi`] with call recording and fault injection.
#[derive(Default)]
pub struct MockRuleApi {
    state: Mutex<EngineState>,
    latency: Option<Duration>,
}

impl MockRuleApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine holding `rules` in the given sequence. Rules with
    /// id 0 are assigned fresh ids.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        let api = Self::new();
        {
            let mut state = api.state.lock();
            let mut next_id = rules.iter().map(|r| r.id).max().unwrap_or(0).max(0);
            for mut rule in rules {
                if rule.id == 0 {
                    next_id += 1;
                    rule.id = next_id;
                }
                state.rules.push(rule);
            }
            state.next_id = next_id;
            state.renumber();
        }
        api
    }

    /// Sleeps for `latency` (on the tokio clock) before every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Rejects writes that would leave a lower rank behind a higher one.
    pub fn with_rank_validation(self) -> Self {
        self.state.lock().validate_ranks = true;
        self
    }

    /// Fails the next call of `op` with `err`.
    pub fn fail_next(&self, op: Operation, err: ApiError) {
        self.state.lock().faults.entry(op).or_default().push_back(err);
    }

    /// Fails every call of `op` with `err` until [`heal`](Self::heal).
    pub fn fail_always(&self, op: Operation, err: ApiError) {
        self.state.lock().sticky_faults.insert(op, err);
    }

    /// Clears every injected fault.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.faults.clear();
        state.sticky_faults.clear();
    }

    /// Current rule list in order.
    pub fn rules(&self) -> Vec<Rule> {
        self.state.lock().rules.clone()
    }

    pub fn rule_named(&self, name: &str) -> Option<Rule> {
        self.state.lock().rules.iter().find(|r| r.name == name).cloned()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().calls.clone()
    }

    /// Placements sent with every update, in call order.
    pub fn updates(&self) -> Vec<(RuleId, OrderRule)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ApiCall::Update { id, placement } => Some((*id, *placement)),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, op: Operation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    (op, call),
                    (Operation::GetAll, ApiCall::GetAll)
                        | (Operation::Get, ApiCall::Get(_))
                        | (Operation::Create, ApiCall::Create { .. })
                        | (Operation::Update, ApiCall::Update { .. })
                        | (Operation::Delete, ApiCall::Delete(_))
                )
            })
            .count()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RuleApi for MockRuleApi {
    async fn get_all(&self) -> ApiResult<Vec<Rule>> {
        self.delay().await;
        let mut state = self.state.lock();
        state.calls.push(ApiCall::GetAll);
        if let Some(err) = state.take_fault(Operation::GetAll) {
            return Err(err);
        }
        Ok(state.rules.clone())
    }

    async fn get(&self, id: RuleId) -> ApiResult<Rule> {
        self.delay().await;
        let mut state = self.state.lock();
        state.calls.push(ApiCall::Get(id));
        if let Some(err) = state.take_fault(Operation::Get) {
            return Err(err);
        }
        let index = state.position_of(id).ok_or_else(|| not_found_error(id))?;
        Ok(state.rules[index].clone())
    }

    async fn create(&self, rule: &Rule) -> ApiResult<Rule> {
        self.delay().await;
        let mut state = self.state.lock();
        state.calls.push(ApiCall::Create {
            name: rule.name.clone(),
            placement: rule.placement(),
        });
        if let Some(err) = state.take_fault(Operation::Create) {
            return Err(err);
        }
        if state.rules.iter().any(|r| r.name == rule.name) {
            return Err(ApiError::response(
                409,
                format!(
                    r#"{{"code":"DUPLICATE_ITEM","message":"Rule with name {} already exists"}}"#,
                    rule.name
                ),
            ));
        }

        state.next_id += 1;
        let created = rule.clone().with_id(state.next_id);
        let index = state.place(created);
        if state.validate_ranks && state.rank_violation(index) {
            let rejected = state.rules.remove(index);
            state.next_id -= 1;
            state.renumber();
            return Err(conflict_error(rejected.rank, rejected.order));
        }

        let created = state.rules[index].clone();
        debug!(rule_id = created.id, order = created.order, "Engine created rule");
        Ok(created)
    }

    async fn update(&self, id: RuleId, rule: &Rule) -> ApiResult<Rule> {
        self.delay().await;
        let mut state = self.state.lock();
        state.calls.push(ApiCall::Update {
            id,
            placement: rule.placement(),
        });
        if let Some(err) = state.take_fault(Operation::Update) {
            return Err(err);
        }
        let old_index = state.position_of(id).ok_or_else(|| not_found_error(id))?;

        let previous = state.rules.remove(old_index);
        let index = state.place(rule.clone().with_id(id));
        if state.validate_ranks && state.rank_violation(index) {
            let rejected = state.rules.remove(index);
            state.rules.insert(old_index, previous);
            state.renumber();
            return Err(conflict_error(rejected.rank, rejected.order));
        }
        Ok(state.rules[index].clone())
    }

    async fn delete(&self, id: RuleId) -> ApiResult<()> {
        self.delay().await;
        let mut state = self.state.lock();
        state.calls.push(ApiCall::Delete(id));
        if let Some(err) = state.take_fault(Operation::Delete) {
            return Err(err);
        }
        let index = state.position_of(id).ok_or_else(|| not_found_error(id))?;
        state.rules.remove(index);
        state.renumber();
        Ok(())
    }
}
