//! Scripted [`OrderTarget`] that records every push.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use ztx_order_common::{OrderError, OrderResult, OrderRule, OrderTarget, RuleId, RuleOrderPair};

#[derive(Debug, Clone)]
enum CountScript {
    Fixed(usize),
    Fail(String),
}

/// Records `update_order` calls and answers `rule_count` from a script.
#[derive(Debug)]
pub struct RecordingTarget {
    count: Mutex<CountScript>,
    failing_ids: Mutex<HashSet<RuleId>>,
    calls: Mutex<Vec<RuleOrderPair>>,
    count_calls: Mutex<usize>,
    reorders: Mutex<usize>,
}

impl RecordingTarget {
    /// Target whose live rule count is `count`.
    pub fn with_count(count: usize) -> Self {
        Self {
            count: Mutex::new(CountScript::Fixed(count)),
            failing_ids: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            count_calls: Mutex::new(0),
            reorders: Mutex::new(0),
        }
    }

    /// Target whose `rule_count` always fails.
    pub fn failing_count(message: impl Into<String>) -> Self {
        let target = Self::with_count(0);
        *target.count.lock() = CountScript::Fail(message.into());
        target
    }

    pub fn set_count(&self, count: usize) {
        *self.count.lock() = CountScript::Fixed(count);
    }

    /// Makes `update_order` fail for `id`. The call is still recorded.
    pub fn fail_update_for(&self, id: RuleId) {
        self.failing_ids.lock().insert(id);
    }

    /// Every `update_order` call, in call order.
    pub fn calls(&self) -> Vec<RuleOrderPair> {
        self.calls.lock().clone()
    }

    pub fn pushed_ids(&self) -> Vec<RuleId> {
        self.calls.lock().iter().map(|pair| pair.id).collect()
    }

    pub fn count_calls(&self) -> usize {
        *self.count_calls.lock()
    }

    pub fn reorders(&self) -> usize {
        *self.reorders.lock()
    }
}

#[async_trait]
impl OrderTarget for RecordingTarget {
    async fn rule_count(&self) -> OrderResult<usize> {
        *self.count_calls.lock() += 1;
        let script = self.count.lock().clone();
        match script {
            CountScript::Fixed(count) => Ok(count),
            CountScript::Fail(message) => Err(OrderError::remote("get_all", message)),
        }
    }

    async fn update_order(&self, id: RuleId, order: OrderRule) -> OrderResult<()> {
        self.calls.lock().push(RuleOrderPair::new(id, order));
        if self.failing_ids.lock().contains(&id) {
            return Err(OrderError::remote("update", format!("rule {id} rejected")));
        }
        Ok(())
    }

    fn before_reorder(&self) {
        *self.reorders.lock() += 1;
    }
}
