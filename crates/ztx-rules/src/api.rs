//! Remote rule model and the API seam the placement layer drives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ztx_order_common::{OrderRule, RuleId};

use crate::error::ApiResult;

/// A policy rule as the remote engine returns it.
///
/// Only the fields the placement layer reads are typed. Everything else the
/// engine sends is kept in `attributes` and written back untouched on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub rank: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Rule {
    /// Creates a rule with no id and no extra attributes.
    pub fn new(name: impl Into<String>, order: i32, rank: i32) -> Self {
        Self {
            id: 0,
            name: name.into(),
            order,
            rank,
            description: None,
            attributes: Map::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds an engine attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Sets the id.
    pub fn with_id(mut self, id: RuleId) -> Self {
        self.id = id;
        self
    }

    /// Current placement.
    pub fn placement(&self) -> OrderRule {
        OrderRule::new(self.order, self.rank)
    }

    /// Replaces order and rank.
    pub fn with_placement(mut self, placement: OrderRule) -> Self {
        self.order = placement.order;
        self.rank = placement.rank;
        self
    }
}

/// CRUD operations on one family's remote rule list.
#[async_trait]
pub trait RuleApi: Send + Sync {
    /// Lists every rule of the family, predefined ones included.
    async fn get_all(&self) -> ApiResult<Vec<Rule>>;

    /// Reads one rule.
    async fn get(&self, id: RuleId) -> ApiResult<Rule>;

    /// Creates a rule and returns it with its assigned id.
    async fn create(&self, rule: &Rule) -> ApiResult<Rule>;

    /// Replaces a rule.
    async fn update(&self, id: RuleId, rule: &Rule) -> ApiResult<Rule>;

    /// Deletes a rule.
    async fn delete(&self, id: RuleId) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_rule_deserialize_keeps_unknown_attributes() {
        let rule: Rule = serde_json::from_value(json!({
            "id": 42,
            "name": "fwd-a",
            "order": 3,
            "rank": 7,
            "forwardMethod": "DIRECT",
            "srcIps": ["10.0.0.1"]
        }))
        .unwrap();

        assert_eq!(rule.id, 42);
        assert_eq!(rule.placement(), OrderRule::new(3, 7));
        assert_eq!(rule.description, None);
        assert_eq!(rule.attributes.get("forwardMethod"), Some(&json!("DIRECT")));

        let back = serde_json::to_value(&rule).unwrap();
        assert_eq!(back["srcIps"], json!(["10.0.0.1"]));
        assert!(back.get("description").is_none());
    }

    #[test]
    fn test_with_placement() {
        let rule = Rule::new("dns-a", 5, 1)
            .with_description("resolver")
            .with_placement(OrderRule::new(9, 7));
        assert_eq!(rule.order, 9);
        assert_eq!(rule.rank, 7);
        assert_eq!(rule.description.as_deref(), Some("resolver"));
    }
}
