//! Ordered rule families and their tenant-provided rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::Rule;
use crate::error::{RuleError, RuleResult};

/// Rank sentinel used for provisional placements. Rules created below it are
/// bumped to it until the settle loop pushes their intended rank.
pub const PROVISIONAL_RANK: i32 = 7;

const FORWARDING_PREDEFINED: &[&str] = &[
    "ZPA Forwarding Rule",
    "Direct rule for Zscaler Cloud Endpoints",
    "Direct rule for WAN Destinations Group",
    "Direct rule for LAN Destinations Group",
    "Client Connector to ZPA",
    "ZPA Pool For Stray Traffic",
];

const RESOLVER_PREDEFINED: &[&str] = &[
    "ZPA Resolver",
    "Redirect Resolution of Zscaler Domains to WAN CTR",
];

/// A rule type whose members share one globally ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    ForwardingControl,
    DnsForwarding,
    TrafficLogForwarding,
}

impl RuleFamily {
    pub const ALL: [RuleFamily; 3] = [
        RuleFamily::ForwardingControl,
        RuleFamily::DnsForwarding,
        RuleFamily::TrafficLogForwarding,
    ];

    /// Partition key used with the coordinator.
    pub fn resource_type(&self) -> &'static str {
        match self {
            RuleFamily::ForwardingControl => "forwarding_control_rule",
            RuleFamily::DnsForwarding => "traffic_forwarding_dns_rule",
            RuleFamily::TrafficLogForwarding => "traffic_forwarding_log_rule",
        }
    }

    /// Rules that ship with every tenant and must never be deleted.
    pub fn predefined_rules(&self) -> &'static [&'static str] {
        match self {
            RuleFamily::ForwardingControl => FORWARDING_PREDEFINED,
            RuleFamily::DnsForwarding | RuleFamily::TrafficLogForwarding => RESOLVER_PREDEFINED,
        }
    }

    pub fn is_predefined(&self, name: &str) -> bool {
        self.predefined_rules().contains(&name)
    }

    /// Rejects deletion of a predefined rule.
    pub fn ensure_deletable(&self, rule: &Rule) -> RuleResult<()> {
        if self.is_predefined(&rule.name) {
            return Err(RuleError::PredefinedRule {
                name: rule.name.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RuleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}
