//! Lazily read order at which new rules are first created.

use tokio::sync::OnceCell;
use tracing::info;

use crate::api::{Rule, RuleApi};
use crate::error::{RuleError, RuleResult};

/// Order one past the highest existing order, or 1 for an empty list.
pub fn next_order_after(rules: &[Rule]) -> i32 {
    rules
        .iter()
        .map(|r| r.order)
        .max()
        .filter(|max| *max > 0)
        .map_or(1, |max| max + 1)
}

/// Starting order, read from the remote engine on first use and then fixed
/// for the lifetime of the provider.
#[derive(Debug, Default)]
pub struct StartingOrder {
    cell: OnceCell<i32>,
}

impl StartingOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the starting order, listing the remote rules on first call.
    ///
    /// Concurrent first callers share one listing. A failed listing is
    /// returned to the caller and the next call tries again.
    pub async fn get_or_init<A: RuleApi + ?Sized>(&self, api: &A) -> RuleResult<i32> {
        self.cell
            .get_or_try_init(|| async {
                let rules = api
                    .get_all()
                    .await
                    .map_err(|source| RuleError::StartingOrder { source })?;
                let order = next_order_after(&rules);
                info!(existing = rules.len(), starting_order = order, "Initialized starting order");
                Ok::<_, RuleError>(order)
            })
            .await
            .copied()
    }

    pub fn get(&self) -> Option<i32> {
        self.cell.get().copied()
    }
}
