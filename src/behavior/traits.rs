//! Behavior Contract Definitions
//!
//! Universal interface for proactive automation units. Each behavior
//! carries its own identity and applicability check; the engine owns
//! ordering, budgets, and bookkeeping.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::tracker::{IssueContext, WorkItemState};

/// Event kinds that may cause behaviors to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    Webhook,
    Schedule,
    CommandCompletion,
    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Webhook => "webhook",
            TriggerType::Schedule => "schedule",
            TriggerType::CommandCompletion => "command_completion",
            TriggerType::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One inbound event; short-lived, consumed by a single `process_trigger`
#[derive(Debug, Clone)]
pub struct BehaviorTrigger {
    pub id: String,
    pub trigger_type: TriggerType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl BehaviorTrigger {
    pub fn new(trigger_type: TriggerType, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trigger_type,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Everything a behavior may read while deciding and executing
#[derive(Clone)]
pub struct BehaviorContext {
    pub trigger: BehaviorTrigger,
    /// Snapshot of the work item the trigger is about, when one applies
    pub issue: Option<IssueContext>,
    /// Consistent config snapshot for the whole trigger
    pub config: Arc<AgentConfig>,
}

/// Side effect requested by a behavior. Actions are data; the embedding
/// application applies them through the tracker client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BehaviorAction {
    PostComment { issue_id: String, body: String },
    AddLabel { issue_id: String, label: String },
    LinkDependency { issue_id: String, depends_on: String },
    RequestTransition { issue_id: String, to_state: WorkItemState },
    Notify { message: String },
}

/// Outcome of one behavior execution; consumed immediately by the caller
#[derive(Debug, Clone)]
pub struct BehaviorResult {
    pub behavior_id: String,
    pub success: bool,
    pub actions: Vec<BehaviorAction>,
    pub error: Option<String>,
    pub execution_time: Duration,
    pub should_notify: bool,
}

impl BehaviorResult {
    /// Successful no-op: the behavior declined to trigger
    pub fn noop(behavior_id: &str) -> Self {
        Self {
            behavior_id: behavior_id.to_string(),
            success: true,
            actions: Vec::new(),
            error: None,
            execution_time: Duration::ZERO,
            should_notify: false,
        }
    }

    /// Successful execution with requested actions
    pub fn with_actions(behavior_id: &str, actions: Vec<BehaviorAction>, notify: bool) -> Self {
        Self {
            behavior_id: behavior_id.to_string(),
            success: true,
            actions,
            error: None,
            execution_time: Duration::ZERO,
            should_notify: notify,
        }
    }

    /// Failed execution; the failure is isolated to this behavior
    pub fn failed(behavior_id: &str, error: impl Into<String>) -> Self {
        Self {
            behavior_id: behavior_id.to_string(),
            success: false,
            actions: Vec::new(),
            error: Some(error.into()),
            execution_time: Duration::ZERO,
            should_notify: false,
        }
    }
}

/// Autonomous behavior - implement for each proactive capability.
///
/// `should_trigger` is a cheap applicability pre-check; `execute` does
/// the real work. A behavior that declines still produces a no-op result
/// so metrics stay complete.
#[async_trait]
pub trait AutonomousBehavior: Send + Sync {
    /// Stable identifier; schedule/command-completion applicability is
    /// keyed off markers in this id (`monitor`, `detector`, `reporter`)
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Static priority; higher runs first within a trigger
    fn priority(&self) -> u32;

    /// Built-in switch; configuration can additionally disable by id
    fn enabled(&self) -> bool {
        true
    }

    /// Cheap applicability check before the full execution
    async fn should_trigger(&self, context: &BehaviorContext) -> bool;

    /// Run the behavior and return requested actions
    async fn execute(&self, context: &BehaviorContext) -> Result<BehaviorResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_ids_are_unique() {
        let a = BehaviorTrigger::new(TriggerType::Webhook, serde_json::json!({}));
        let b = BehaviorTrigger::new(TriggerType::Webhook, serde_json::json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_result_constructors() {
        let noop = BehaviorResult::noop("b1");
        assert!(noop.success);
        assert!(noop.actions.is_empty());

        let failed = BehaviorResult::failed("b1", "boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
