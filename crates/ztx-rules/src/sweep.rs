//! Removal of rules left behind by interrupted acceptance runs.

use tracing::{error, info, warn};
use ztx_order_common::RuleId;

use crate::api::RuleApi;
use crate::error::{RuleError, RuleResult};
use crate::family::RuleFamily;

/// Name prefix of rules created by acceptance tests.
pub const TEST_RESOURCE_PREFIX: &str = "tf-acc-test-";

/// Name prefix acceptance tests rename rules to.
pub const UPDATED_RESOURCE_PREFIX: &str = "tf-updated-";

/// Prefixes swept when the configuration names none.
pub fn default_sweep_prefixes() -> Vec<String> {
    vec![
        TEST_RESOURCE_PREFIX.to_string(),
        UPDATED_RESOURCE_PREFIX.to_string(),
    ]
}

/// Deletes every non-predefined rule of `family` whose name starts with one
/// of `prefixes`, returning the deleted ids.
///
/// A failed delete is logged and the sweep moves on to the next rule.
pub async fn sweep<A: RuleApi + ?Sized>(
    api: &A,
    family: RuleFamily,
    prefixes: &[String],
) -> RuleResult<Vec<RuleId>> {
    let rules = api.get_all().await.map_err(RuleError::list)?;

    let mut deleted = Vec::new();
    for rule in rules.iter().filter(|r| {
        prefixes.iter().any(|p| r.name.starts_with(p.as_str())) && !family.is_predefined(&r.name)
    }) {
        warn!(
            resource_type = family.resource_type(),
            rule_id = rule.id,
            name = %rule.name,
            "Sweeper found dangling rule"
        );
        match api.delete(rule.id).await {
            Ok(()) => deleted.push(rule.id),
            Err(err) => error!(rule_id = rule.id, error = %err, "Sweeper failed to delete rule"),
        }
    }

    info!(
        resource_type = family.resource_type(),
        deleted = deleted.len(),
        "Sweep finished"
    );
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Rule;
    use crate::error::{ApiError, ApiResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    struct Listing {
        rules: Vec<Rule>,
        refuse: RuleId,
        deleted: Mutex<Vec<RuleId>>,
    }

    #[async_trait]
    impl RuleApi for Listing {
        async fn get_all(&self) -> ApiResult<Vec<Rule>> {
            Ok(self.rules.clone())
        }
        async fn get(&self, _id: RuleId) -> ApiResult<Rule> {
            unreachable!()
        }
        async fn create(&self, _rule: &Rule) -> ApiResult<Rule> {
            unreachable!()
        }
        async fn update(&self, _id: RuleId, _rule: &Rule) -> ApiResult<Rule> {
            unreachable!()
        }
        async fn delete(&self, id: RuleId) -> ApiResult<()> {
            if id == self.refuse {
                return Err(ApiError::response(409, r#"{"code":"EDIT_LOCK_NOT_AVAILABLE"}"#));
            }
            self.deleted.lock().push(id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sweep_deletes_prefixed_rules() {
        let api = Listing {
            rules: vec![
                Rule::new("ZPA Forwarding Rule", 1, 7).with_id(1),
                Rule::new("tf-acc-test-abc", 2, 7).with_id(2),
                Rule::new("production", 3, 7).with_id(3),
                Rule::new("tf-updated-xyz", 4, 7).with_id(4),
                Rule::new("tf-acc-test-locked", 5, 7).with_id(5),
            ],
            refuse: 5,
            deleted: Mutex::new(Vec::new()),
        };

        let deleted = sweep(&api, RuleFamily::ForwardingControl, &default_sweep_prefixes())
            .await
            .unwrap();

        assert_eq!(deleted, vec![2, 4]);
        assert_eq!(*api.deleted.lock(), vec![2, 4]);
    }

    #[tokio::test]
    async fn test_sweep_never_touches_predefined() {
        let api = Listing {
            rules: vec![Rule::new("ZPA Resolver", 1, 7).with_id(1)],
            refuse: 0,
            deleted: Mutex::new(Vec::new()),
        };

        let deleted = sweep(&api, RuleFamily::DnsForwarding, &["ZPA".to_string()])
            .await
            .unwrap();
        assert!(deleted.is_empty());
    }
}
