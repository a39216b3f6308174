//! Test fixtures for rule ordering scenarios
//!
//! Provides reusable rules, remote errors and settle configurations

use std::time::Duration;

use ztx_order_common::{RuleId, SettleConfig, DEFAULT_TICK_INTERVAL};
use ztx_rules::{ApiError, Rule, RuleFamily, PROVISIONAL_RANK};

/// Intended orders of the five-rule batch scenario.
pub const BATCH_ORDERS: [i32; 5] = [5, 3, 1, 4, 2];

/// One settle tick at the default interval.
pub fn tick() -> Duration {
    DEFAULT_TICK_INTERVAL
}

/// Settle configuration for tests that run on the real clock.
pub fn fast_settle(tick: Duration) -> SettleConfig {
    SettleConfig::default().with_tick_interval(tick)
}

/// The family's predefined rules at orders `1..=n`, rank 7.
pub fn predefined_rules(family: RuleFamily) -> Vec<Rule> {
    family
        .predefined_rules()
        .iter()
        .enumerate()
        .map(|(index, name)| Rule::new(*name, index as i32 + 1, PROVISIONAL_RANK))
        .collect()
}

/// Rules named `{prefix}{order}` with the given intended orders.
pub fn batch(prefix: &str, orders: &[i32], rank: i32) -> Vec<Rule> {
    orders
        .iter()
        .map(|order| Rule::new(format!("{prefix}{order}"), *order, rank))
        .collect()
}

/// Common forwarding rule attributes
pub mod forwarding_fixtures {
    use super::*;
    use serde_json::json;

    /// Direct forwarding for a source address.
    pub fn direct_rule(name: &str, order: i32, rank: i32) -> Rule {
        Rule::new(name, order, rank)
            .with_description("direct to internet")
            .with_attribute("type", json!("EC_RDR"))
            .with_attribute("forwardMethod", json!("DIRECT"))
            .with_attribute("srcIps", json!(["10.0.0.0/24"]))
    }

    /// Forwarding through a ZPA gateway.
    pub fn zpa_rule(name: &str, order: i32, rank: i32) -> Rule {
        Rule::new(name, order, rank)
            .with_attribute("type", json!("EC_RDR"))
            .with_attribute("forwardMethod", json!("ZPA"))
            .with_attribute("zpaGateway", json!({ "id": 1, "name": "gw" }))
    }
}

/// Common DNS forwarding rule attributes
pub mod dns_fixtures {
    use super::*;
    use serde_json::json;

    pub fn resolver_rule(name: &str, order: i32, rank: i32) -> Rule {
        Rule::new(name, order, rank)
            .with_attribute("type", json!("EC_DNS"))
            .with_attribute("action", json!("REDIR_REQ"))
            .with_attribute("applications", json!(["ANY"]))
    }
}

/// Engine refusal of a rank at an order.
pub fn conflict_error(rank: i32, order: i32) -> ApiError {
    ApiError::response(
        400,
        format!(
            r#"{{"code":"INVALID_INPUT_ARGUMENT","message":"Rule with rank {rank} is not allowed at order {order}"}}"#
        ),
    )
}

/// Structured error carrying `code`.
pub fn code_error(status: u16, code: &str) -> ApiError {
    ApiError::response(
        status,
        format!(r#"{{"code":"{code}","message":"request failed"}}"#),
    )
}

pub fn not_found_error(id: RuleId) -> ApiError {
    ApiError::response(
        404,
        format!(r#"{{"code":"RESOURCE_NOT_FOUND","message":"Rule {id} not found"}}"#),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_rules() {
        let rules = predefined_rules(RuleFamily::DnsForwarding);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].order, 2);
        assert!(rules.iter().all(|r| RuleFamily::DnsForwarding.is_predefined(&r.name)));
    }

    #[test]
    fn test_batch() {
        let rules = batch("tf-acc-test-", &BATCH_ORDERS, 7);
        assert_eq!(rules[0].name, "tf-acc-test-5");
        assert_eq!(rules[4].order, 2);
    }

    #[test]
    fn test_errors() {
        assert_eq!(code_error(409, "EDIT_LOCK_NOT_AVAILABLE").code().as_deref(), Some("EDIT_LOCK_NOT_AVAILABLE"));
        assert!(not_found_error(3).is_not_found());
        assert!(conflict_error(7, 2)
            .to_string()
            .contains("Rule with rank 7 is not allowed at order 2"));
    }
}
