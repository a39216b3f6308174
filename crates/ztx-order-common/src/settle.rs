//! Leader-side settle-and-reorder loop.
//!
//! The loop polls its round on a fixed tick, waits until the round stops
//! growing and every member is done, then pushes the sorted placements to the
//! remote system.
//!
//! ```text
//!   Polling --tick--> QuiescentCheck --stable & all done--> Pushing --> Terminated
//!      ^                    |
//!      +----not settled-----+
//! ```
//!
//! Cancellation and the optional tick budget abandon the round instead of
//! pushing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SettleConfig;
use crate::registry::RuleRegistry;
use crate::target::OrderTarget;
use crate::types::{sort_pairs, RegisteredRule, RuleOrderPair};

/// Phase of a settle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettleState {
    /// Waiting for the next tick.
    Polling,
    /// Inspecting a snapshot of the round.
    QuiescentCheck,
    /// Pushing corrections to the remote system.
    Pushing,
    /// Loop has returned.
    Terminated,
}

impl SettleState {
    /// Returns the state name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettleState::Polling => "polling",
            SettleState::QuiescentCheck => "quiescent_check",
            SettleState::Pushing => "pushing",
            SettleState::Terminated => "terminated",
        }
    }
}

/// How a settle loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettleOutcome {
    /// Quiescence was reached and the push phase ran.
    Reordered,
    /// The loop was cancelled before quiescence.
    Cancelled,
    /// `max_ticks` elapsed before quiescence.
    TimedOut,
}

/// Summary of one settle round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleReport {
    /// Partition key of the round.
    pub resource_type: String,
    /// Round number.
    pub generation: u64,
    /// Ticks observed before the loop ended.
    pub ticks: u64,
    /// How the loop ended.
    pub outcome: SettleOutcome,
    /// Remote rule count observed at push time, `None` if the query failed or
    /// no push phase ran.
    pub rule_count: Option<usize>,
    /// Placements pushed successfully, in push order.
    pub pushed: Vec<RuleOrderPair>,
    /// Placements not pushed because they exceed the remote rule count.
    pub skipped: Vec<RuleOrderPair>,
    /// Placements whose push failed.
    pub failed: Vec<RuleOrderPair>,
}

impl SettleReport {
    fn unsettled(resource_type: &str, generation: u64, ticks: u64, outcome: SettleOutcome) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            generation,
            ticks,
            outcome,
            rule_count: None,
            pushed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Returns true if the push phase ran.
    pub fn is_reordered(&self) -> bool {
        self.outcome == SettleOutcome::Reordered
    }
}

/// Tracks the round size over the last `capacity` ticks.
#[derive(Debug)]
struct StabilityWindow {
    samples: VecDeque<usize>,
    capacity: usize,
}

impl StabilityWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn observe(&mut self, size: usize) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(size);
    }

    fn is_stable(&self) -> bool {
        self.samples.len() == self.capacity
            && self.samples.iter().all(|&s| Some(&s) == self.samples.front())
    }
}

/// Settle loop for one round of one partition.
pub(crate) struct SettleLoop {
    pub(crate) registry: Arc<RuleRegistry>,
    pub(crate) resource_type: String,
    pub(crate) generation: u64,
    pub(crate) config: SettleConfig,
    pub(crate) target: Arc<dyn OrderTarget>,
    pub(crate) cancel: CancellationToken,
}

impl SettleLoop {
    /// Runs the loop to completion. Never fails; remote errors are logged and
    /// recorded in the report.
    pub(crate) async fn run(self) -> SettleReport {
        let tick: Duration = self.config.tick_interval;
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut window = StabilityWindow::new(self.config.stability_window);
        let mut ticks: u64 = 0;

        info!(
            resource_type = %self.resource_type,
            generation = self.generation,
            tick_ms = tick.as_millis() as u64,
            "Settle loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.registry.abandon(&self.resource_type, self.generation);
                    warn!(
                        resource_type = %self.resource_type,
                        generation = self.generation,
                        ticks,
                        "Settle loop cancelled before quiescence"
                    );
                    return SettleReport::unsettled(
                        &self.resource_type,
                        self.generation,
                        ticks,
                        SettleOutcome::Cancelled,
                    );
                }
                _ = ticker.tick() => {}
            }
            ticks += 1;

            let snapshot = self.registry.snapshot(&self.resource_type);
            let size = snapshot.len();
            let all_done = snapshot.iter().all(|r| r.done);
            window.observe(size);

            debug!(
                resource_type = %self.resource_type,
                generation = self.generation,
                state = SettleState::QuiescentCheck.as_str(),
                ticks,
                size,
                all_done,
                "Checked round for quiescence"
            );

            if all_done && window.is_stable() {
                if let Some(rules) = self.registry.retire(&self.resource_type, self.generation, size) {
                    return self.push(rules, ticks).await;
                }
            }

            if let Some(max_ticks) = self.config.max_ticks {
                if ticks >= max_ticks {
                    self.registry.abandon(&self.resource_type, self.generation);
                    warn!(
                        resource_type = %self.resource_type,
                        generation = self.generation,
                        ticks,
                        size,
                        "Round did not settle within the tick budget, abandoning"
                    );
                    return SettleReport::unsettled(
                        &self.resource_type,
                        self.generation,
                        ticks,
                        SettleOutcome::TimedOut,
                    );
                }
            }
        }
    }

    async fn push(&self, rules: Vec<RegisteredRule>, ticks: u64) -> SettleReport {
        let mut report = SettleReport::unsettled(
            &self.resource_type,
            self.generation,
            ticks,
            SettleOutcome::Reordered,
        );

        let count = match self.target.rule_count().await {
            Ok(count) => {
                report.rule_count = Some(count);
                Some(count)
            }
            Err(e) => {
                error!(
                    resource_type = %self.resource_type,
                    generation = self.generation,
                    error = %e,
                    "Couldn't count remote rules, no placement will be pushed this round"
                );
                None
            }
        };

        self.target.before_reorder();

        let sorted = sort_pairs(&rules);
        let push_order: Vec<String> = sorted.iter().map(ToString::to_string).collect();
        info!(
            resource_type = %self.resource_type,
            generation = self.generation,
            state = SettleState::Pushing.as_str(),
            count = ?count,
            sorted = ?push_order,
            "Sorted rules after tick"
        );

        match count {
            Some(count) => {
                for pair in sorted {
                    if !pair.order.fits_within(count) {
                        debug!(rule_id = pair.id, order = %pair.order, count, "Placement beyond rule count, skipped");
                        report.skipped.push(pair);
                        continue;
                    }
                    match self.target.update_order(pair.id, pair.order).await {
                        Ok(()) => report.pushed.push(pair),
                        Err(e) => {
                            error!(
                                resource_type = %self.resource_type,
                                rule_id = pair.id,
                                error = %e,
                                "Couldn't reorder the rule after tick, the order may not have taken place"
                            );
                            report.failed.push(pair);
                        }
                    }
                }
            }
            None => report.skipped = sorted,
        }

        info!(
            resource_type = %self.resource_type,
            generation = self.generation,
            state = SettleState::Terminated.as_str(),
            pushed = report.pushed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Settle round finished"
        );
        report
    }
}
