//! The remote side of a reorder.

use async_trait::async_trait;

use crate::error::OrderResult;
use crate::types::{OrderRule, RuleId};

/// Remote operations the settle loop needs to push corrections.
///
/// One implementation exists per rule family; the coordinator itself never
/// talks to the remote API directly.
///
/// # Example
///
/// ```ignore
/// use ztx_order_common::{OrderRule, OrderResult, OrderTarget, RuleId};
///
/// struct DnsRules { client: Client }
///
/// #[async_trait]
/// impl OrderTarget for DnsRules {
///     async fn rule_count(&self) -> OrderResult<usize> {
///         Ok(self.client.list_dns_rules().await?.len())
///     }
///
///     async fn update_order(&self, id: RuleId, order: OrderRule) -> OrderResult<()> {
///         self.client.move_dns_rule(id, order.order, order.rank).await
///     }
/// }
/// ```
#[async_trait]
pub trait OrderTarget: Send + Sync {
    /// Returns the current total number of remote rules.
    ///
    /// Used to bound which placements can be pushed.
    async fn rule_count(&self) -> OrderResult<usize>;

    /// Moves a single remote rule to `order`.
    async fn update_order(&self, id: RuleId, order: OrderRule) -> OrderResult<()>;

    /// Called once, immediately before the sorted push sequence is issued.
    fn before_reorder(&self) {
        // Default: no-op
    }
}
