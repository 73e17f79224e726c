//! Autonomous Behavior Engine
//!
//! Consumes triggers, asks the registry which behaviors apply, enforces
//! the global automation budget, and executes behaviors sequentially in
//! priority order. One behavior's failure never aborts the others.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::behavior::traits::{
    AutonomousBehavior, BehaviorContext, BehaviorResult, BehaviorTrigger, TriggerType,
};
use crate::config::ConfigHandle;
use crate::metrics::BehaviorHealthMonitor;
use crate::webhook::issue_from_payload;

/// Global sliding-window execution budget.
///
/// Every behavior execution counts against both windows, regardless of
/// which behavior produced it.
struct RateWindows {
    executions: Vec<DateTime<Utc>>,
}

impl RateWindows {
    fn new() -> Self {
        Self { executions: Vec::new() }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - ChronoDuration::hours(1);
        self.executions.retain(|t| *t > cutoff);
    }

    /// True when another execution fits in both windows
    fn check(&self, now: DateTime<Utc>, per_minute: u32, per_hour: u32) -> bool {
        let minute_cutoff = now - ChronoDuration::minutes(1);
        let in_minute = self.executions.iter().filter(|t| **t > minute_cutoff).count();
        if in_minute >= per_minute as usize {
            return false;
        }
        self.executions.len() < per_hour as usize
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.executions.push(now);
    }
}

struct RegisteredBehavior {
    behavior: Arc<dyn AutonomousBehavior>,
    /// Registration order; preserves stable ordering for priority ties
    seq: u64,
}

/// Registry plus trigger processor for autonomous behaviors
pub struct BehaviorEngine {
    config: ConfigHandle,
    behaviors: RwLock<HashMap<String, RegisteredBehavior>>,
    windows: Mutex<RateWindows>,
    health: Arc<BehaviorHealthMonitor>,
    next_seq: Mutex<u64>,
}

impl BehaviorEngine {
    pub fn new(config: ConfigHandle, health: Arc<BehaviorHealthMonitor>) -> Self {
        Self {
            config,
            behaviors: RwLock::new(HashMap::new()),
            windows: Mutex::new(RateWindows::new()),
            health,
            next_seq: Mutex::new(0),
        }
    }

    /// Register a behavior. Re-registering an existing id replaces the
    /// implementation (hot reload), keeping its ordering slot.
    pub async fn register_behavior(&self, behavior: Arc<dyn AutonomousBehavior>) {
        let id = behavior.id().to_string();
        let mut behaviors = self.behaviors.write().await;

        let seq = if let Some(existing) = behaviors.get(&id) {
            warn!("Behavior {} re-registered, replacing implementation", id);
            existing.seq
        } else {
            let mut counter = self.next_seq.lock().await;
            *counter += 1;
            info!("Behavior {} registered (priority {})", id, behavior.priority());
            *counter
        };

        behaviors.insert(id, RegisteredBehavior { behavior, seq });
    }

    /// Remove a behavior from the registry
    pub async fn unregister_behavior(&self, id: &str) -> bool {
        let removed = self.behaviors.write().await.remove(id).is_some();
        if removed {
            info!("Behavior {} unregistered", id);
        }
        removed
    }

    pub async fn behavior_count(&self) -> usize {
        self.behaviors.read().await.len()
    }

    /// Process one trigger through all applicable behaviors.
    ///
    /// Fail-closed on budget: if either sliding window is exhausted the
    /// whole trigger is dropped with no executions and no metric updates.
    pub async fn process_trigger(&self, trigger: BehaviorTrigger) -> Vec<BehaviorResult> {
        let config = self.config.snapshot();
        let now = Utc::now();

        {
            let mut windows = self.windows.lock().await;
            windows.prune(now);
            if !windows.check(
                now,
                config.automation.max_executions_per_minute,
                config.automation.max_executions_per_hour,
            ) {
                warn!(
                    "Automation budget exhausted, dropping {} trigger {}",
                    trigger.trigger_type, trigger.id
                );
                return Vec::new();
            }
        }

        let issue = issue_from_payload(&trigger.payload);
        let trigger_type = trigger.trigger_type;
        let context = BehaviorContext { trigger, issue, config: config.clone() };

        let mut applicable: Vec<(u64, Arc<dyn AutonomousBehavior>)> = {
            let behaviors = self.behaviors.read().await;
            behaviors
                .values()
                .filter(|r| {
                    r.behavior.enabled()
                        && !config.automation.disabled_behaviors.contains(r.behavior.id())
                        && applies_to(trigger_type, r.behavior.id())
                })
                .map(|r| (r.seq, Arc::clone(&r.behavior)))
                .collect()
        };
        // Descending priority, registration order for ties
        applicable.sort_by(|(seq_a, a), (seq_b, b)| {
            b.priority().cmp(&a.priority()).then(seq_a.cmp(seq_b))
        });

        debug!(
            "{} behavior(s) applicable to {} trigger {}",
            applicable.len(),
            trigger_type,
            context.trigger.id
        );

        let mut results = Vec::with_capacity(applicable.len());
        for (_, behavior) in applicable {
            if !behavior.should_trigger(&context).await {
                debug!("Behavior {} declined trigger", behavior.id());
                self.health.record_noop(behavior.id());
                results.push(BehaviorResult::noop(behavior.id()));
                continue;
            }

            let started = Instant::now();
            let mut result = match behavior.execute(&context).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Behavior {} failed: {}", behavior.id(), e);
                    BehaviorResult::failed(behavior.id(), e.to_string())
                }
            };
            result.execution_time = started.elapsed();

            self.windows.lock().await.record(Utc::now());
            self.health.record_execution(
                behavior.id(),
                result.success,
                result.execution_time,
                result.error.as_deref(),
            );
            results.push(result);
        }
        results
    }
}

/// Trigger-type applicability, keyed off id markers: webhooks and manual
/// invocations apply broadly; schedules only to periodic/monitoring
/// behaviors; command completions only to monitoring/detection behaviors
fn applies_to(trigger_type: TriggerType, behavior_id: &str) -> bool {
    match trigger_type {
        TriggerType::Webhook | TriggerType::Manual => true,
        TriggerType::Schedule => {
            behavior_id.contains("monitor") || behavior_id.contains("reporter")
        }
        TriggerType::CommandCompletion => {
            behavior_id.contains("monitor") || behavior_id.contains("detector")
        }
    }
}
