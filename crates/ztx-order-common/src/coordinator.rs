//! Registration/completion API and settle task management.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::SettleConfig;
use crate::error::{OrderError, OrderResult};
use crate::registry::{Registration, RuleRegistry};
use crate::settle::{SettleLoop, SettleReport};
use crate::target::OrderTarget;
use crate::types::{OrderRule, RegisteredRule, RuleId};

/// Handle to a running settle loop, held by the round's leader.
#[derive(Debug)]
pub struct SettleHandle {
    resource_type: String,
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<SettleReport>,
}

impl SettleHandle {
    /// Partition key of the round.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Round number.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Requests cancellation. The loop abandons its round and returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the loop has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop to finish.
    pub async fn join(self) -> OrderResult<SettleReport> {
        self.task
            .await
            .map_err(|e| OrderError::settle_task(self.resource_type, e.to_string()))
    }
}

/// Result of [`Coordinator::place_and_maybe_lead`].
#[derive(Debug)]
pub enum Placement {
    /// The caller opened the round and owns its settle loop.
    Leader(SettleHandle),
    /// Another rule leads the round.
    Follower {
        /// Round the caller joined.
        generation: u64,
    },
}

impl Placement {
    /// Returns true if the caller leads its round.
    pub fn is_leader(&self) -> bool {
        matches!(self, Placement::Leader(_))
    }

    /// Round the caller joined.
    pub fn generation(&self) -> u64 {
        match self {
            Placement::Leader(handle) => handle.generation,
            Placement::Follower { generation } => *generation,
        }
    }

    /// Returns the settle handle if the caller leads.
    pub fn into_handle(self) -> Option<SettleHandle> {
        match self {
            Placement::Leader(handle) => Some(handle),
            Placement::Follower { .. } => None,
        }
    }
}

struct Inner {
    registry: Arc<RuleRegistry>,
    config: SettleConfig,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Cross-resource rule ordering coordinator.
///
/// One instance exists per provider configuration and is shared (cheaply
/// cloned) by every resource apply. Each apply registers its intended
/// placement; the first registrant of a resource type leads the round and
/// runs its settle loop as a tracked background task.
///
/// # Example
///
/// ```ignore
/// let coordinator = Coordinator::new(SettleConfig::default());
///
/// let placement = coordinator.place_and_maybe_lead(
///     OrderRule::new(3, 7),
///     created.id,
///     "forwarding_control_rule",
///     target.clone(),
/// );
/// coordinator.mark_done(created.id, "forwarding_control_rule");
///
/// if let Some(handle) = placement.into_handle() {
///     let report = handle.join().await?;
/// }
/// ```
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Creates a coordinator with its own registry.
    pub fn new(config: SettleConfig) -> Self {
        Self::with_registry(config, Arc::new(RuleRegistry::new()))
    }

    /// Creates a coordinator over an existing registry.
    pub fn with_registry(config: SettleConfig, registry: Arc<RuleRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                config,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Returns the settle configuration.
    pub fn config(&self) -> &SettleConfig {
        &self.inner.config
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.inner.registry
    }

    /// Registers `id`'s intended placement and, if it opens a new round,
    /// spawns the round's settle loop against `target`.
    ///
    /// Must be called from within a tokio runtime. The caller is expected to
    /// call [`mark_done`](Self::mark_done) once its own remote create/update
    /// has returned, whether or not it leads.
    pub fn place_and_maybe_lead(
        &self,
        intended: OrderRule,
        id: RuleId,
        resource_type: &str,
        target: Arc<dyn OrderTarget>,
    ) -> Placement {
        let Registration {
            generation,
            is_leader,
        } = self.inner.registry.register(resource_type, id, intended);

        if !is_leader {
            return Placement::Follower { generation };
        }

        info!(
            resource_type,
            rule_id = id,
            generation,
            %intended,
            "Starting to reorder the rules, delegating to rule"
        );

        let cancel = self.inner.shutdown.child_token();
        let settle = SettleLoop {
            registry: Arc::clone(&self.inner.registry),
            resource_type: resource_type.to_string(),
            generation,
            config: self.inner.config.clone(),
            target,
            cancel: cancel.clone(),
        };
        let task = self.inner.tracker.spawn(settle.run());

        Placement::Leader(SettleHandle {
            resource_type: resource_type.to_string(),
            generation,
            cancel,
            task,
        })
    }

    /// Marks `id` as done in the active round for `resource_type`.
    pub fn mark_done(&self, id: RuleId, resource_type: &str) -> bool {
        self.inner.registry.mark_done(resource_type, id)
    }

    /// Returns a snapshot of the active round for `resource_type`.
    pub fn snapshot(&self, resource_type: &str) -> Vec<RegisteredRule> {
        self.inner.registry.snapshot(resource_type)
    }

    /// Returns the leader of the active round for `resource_type`.
    pub fn leader(&self, resource_type: &str) -> Option<RuleId> {
        self.inner.registry.leader(resource_type)
    }

    /// Returns the number of settle loops still running.
    pub fn active_rounds(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Cancels every running settle loop and waits for them to return.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.inner.config)
            .field("active_rounds", &self.inner.tracker.len())
            .finish()
    }
}
