//! Automation Behaviors
//!
//! Event-driven workflow helpers:
//! - Dependency detector (mines issue text for dependency references)
//! - Workflow automator (small state hygiene rules on updates)
//! - Periodic reporter (scheduled progress summaries)

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::behavior::traits::{
    AutonomousBehavior, BehaviorAction, BehaviorContext, BehaviorResult, TriggerType,
};
use crate::progress::{self, WorkItem};
use crate::tracker::WorkItemState;

static DEPENDENCY_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:depends\s+on|blocked\s+by|waiting\s+(?:on|for))\s+([A-Za-z]{2,6}-\d+)")
        .expect("dependency reference pattern")
});

/// Mines issue descriptions for textual dependency references
pub struct DependencyDetector;

impl DependencyDetector {
    fn description(payload: &Value) -> Option<&str> {
        payload.get("data").and_then(|d| d.get("description")).and_then(Value::as_str)
    }
}

#[async_trait]
impl AutonomousBehavior for DependencyDetector {
    fn id(&self) -> &str {
        "dependency-detector"
    }

    fn name(&self) -> &str {
        "Dependency Detector"
    }

    fn priority(&self) -> u32 {
        60
    }

    async fn should_trigger(&self, context: &BehaviorContext) -> bool {
        context.issue.is_some()
            && Self::description(&context.trigger.payload)
                .map(|d| DEPENDENCY_REF.is_match(d))
                .unwrap_or(false)
    }

    async fn execute(&self, context: &BehaviorContext) -> Result<BehaviorResult> {
        let issue = context
            .issue
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("dependency detector requires an issue snapshot"))?;
        let description = Self::description(&context.trigger.payload).unwrap_or_default();

        let mut actions: Vec<BehaviorAction> = DEPENDENCY_REF
            .captures_iter(description)
            .map(|c| BehaviorAction::LinkDependency {
                issue_id: issue.issue_id.clone(),
                depends_on: c[1].to_uppercase(),
            })
            .collect();

        let found = actions.len();
        if found > 0 {
            actions.push(BehaviorAction::AddLabel {
                issue_id: issue.issue_id.clone(),
                label: "has-dependencies".to_string(),
            });
        }
        Ok(BehaviorResult::with_actions(self.id(), actions, found > 0))
    }
}

/// Small state-hygiene rules applied to issue updates
pub struct WorkflowAutomator;

#[async_trait]
impl AutonomousBehavior for WorkflowAutomator {
    fn id(&self) -> &str {
        "workflow-automator"
    }

    fn name(&self) -> &str {
        "Workflow Automator"
    }

    fn priority(&self) -> u32 {
        50
    }

    async fn should_trigger(&self, context: &BehaviorContext) -> bool {
        context.trigger.trigger_type == TriggerType::Webhook && context.issue.is_some()
    }

    async fn execute(&self, context: &BehaviorContext) -> Result<BehaviorResult> {
        let issue = context
            .issue
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workflow automator requires an issue snapshot"))?;
        let mut actions = Vec::new();

        // Review without a reviewer stalls silently
        if issue.state == Some(WorkItemState::InReview) && issue.assignee.is_none() {
            actions.push(BehaviorAction::PostComment {
                issue_id: issue.issue_id.clone(),
                body: "This item entered review without an assignee. Please assign a reviewer."
                    .to_string(),
            });
        }

        // Urgent items should not sit in the backlog
        let urgent = issue.labels.iter().any(|l| l.eq_ignore_ascii_case("urgent"));
        if urgent && issue.state == Some(WorkItemState::Backlog) {
            actions.push(BehaviorAction::RequestTransition {
                issue_id: issue.issue_id.clone(),
                to_state: WorkItemState::Todo,
            });
        }

        let notify = !actions.is_empty();
        Ok(BehaviorResult::with_actions(self.id(), actions, notify))
    }
}

/// Scheduled progress summaries over the items in the trigger payload
pub struct PeriodicReporter;

impl PeriodicReporter {
    fn items_from(payload: &Value) -> Vec<WorkItem> {
        payload
            .get("data")
            .and_then(|d| d.get("items"))
            .cloned()
            .and_then(|items| serde_json::from_value(items).ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AutonomousBehavior for PeriodicReporter {
    fn id(&self) -> &str {
        "periodic-reporter"
    }

    fn name(&self) -> &str {
        "Periodic Reporter"
    }

    fn priority(&self) -> u32 {
        30
    }

    async fn should_trigger(&self, context: &BehaviorContext) -> bool {
        context.trigger.trigger_type == TriggerType::Schedule
    }

    async fn execute(&self, context: &BehaviorContext) -> Result<BehaviorResult> {
        let items = Self::items_from(&context.trigger.payload);
        let report = progress::calculate_with_config(&items, &context.config);

        let done = items.iter().filter(|i| i.state == WorkItemState::Done).count();
        let active = items.iter().filter(|i| i.state.is_active()).count();

        let actions = vec![BehaviorAction::Notify {
            message: format!(
                "Progress report: {:.0}% complete ({:.1} of {:.1} points), {} done / {} \
                 in flight / {} total, readiness {}",
                report.percentage,
                report.completed_points,
                report.total_points,
                done,
                active,
                items.len(),
                report.readiness.as_str()
            ),
        }];
        Ok(BehaviorResult::with_actions(self.id(), actions, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::traits::BehaviorTrigger;
    use crate::config::AgentConfig;
    use crate::webhook::issue_from_payload;
    use std::sync::Arc;

    fn context_for(payload: Value, trigger_type: TriggerType) -> BehaviorContext {
        let trigger = BehaviorTrigger::new(trigger_type, payload);
        let issue = issue_from_payload(&trigger.payload);
        BehaviorContext { trigger, issue, config: Arc::new(AgentConfig::default()) }
    }

    #[tokio::test]
    async fn test_dependency_detector_links_references() {
        let context = context_for(
            serde_json::json!({
                "data": {
                    "identifier": "PLAT-10",
                    "description": "Depends on PLAT-7 and blocked by app-3 for rollout."
                }
            }),
            TriggerType::Webhook,
        );

        let detector = DependencyDetector;
        assert!(detector.should_trigger(&context).await);

        let result = detector.execute(&context).await.unwrap();
        assert_eq!(result.actions.len(), 3);
        assert!(matches!(
            &result.actions[0],
            BehaviorAction::LinkDependency { depends_on, .. } if depends_on == "PLAT-7"
        ));
        assert!(matches!(
            &result.actions[1],
            BehaviorAction::LinkDependency { depends_on, .. } if depends_on == "APP-3"
        ));
        assert!(matches!(
            &result.actions[2],
            BehaviorAction::AddLabel { label, .. } if label == "has-dependencies"
        ));
    }

    #[tokio::test]
    async fn test_dependency_detector_declines_plain_text() {
        let context = context_for(
            serde_json::json!({
                "data": {
                    "identifier": "PLAT-11",
                    "description": "Just a normal description."
                }
            }),
            TriggerType::Webhook,
        );
        assert!(!DependencyDetector.should_trigger(&context).await);
    }

    #[tokio::test]
    async fn test_workflow_automator_review_without_assignee() {
        let context = context_for(
            serde_json::json!({
                "data": {
                    "identifier": "PLAT-12",
                    "state": { "name": "In Review" }
                }
            }),
            TriggerType::Webhook,
        );

        let result = WorkflowAutomator.execute(&context).await.unwrap();
        assert_eq!(result.actions.len(), 1);
        assert!(matches!(&result.actions[0], BehaviorAction::PostComment { .. }));
    }

    #[tokio::test]
    async fn test_workflow_automator_promotes_urgent_backlog_items() {
        let context = context_for(
            serde_json::json!({
                "data": {
                    "identifier": "PLAT-13",
                    "state": { "name": "Backlog" },
                    "labels": ["urgent"]
                }
            }),
            TriggerType::Webhook,
        );

        let result = WorkflowAutomator.execute(&context).await.unwrap();
        assert!(matches!(
            &result.actions[0],
            BehaviorAction::RequestTransition { to_state: WorkItemState::Todo, .. }
        ));
    }

    #[tokio::test]
    async fn test_periodic_reporter_summarizes() {
        let context = context_for(
            serde_json::json!({
                "data": { "items": [
                    { "id": "a", "storyPoints": 3.0, "state": "Done", "type": "Story" },
                    { "id": "b", "storyPoints": 5.0, "state": "InProgress", "type": "Story" }
                ]}
            }),
            TriggerType::Schedule,
        );

        let reporter = PeriodicReporter;
        assert!(reporter.should_trigger(&context).await);

        let result = reporter.execute(&context).await.unwrap();
        assert!(result.should_notify);
        assert!(matches!(
            &result.actions[0],
            BehaviorAction::Notify { message } if message.contains("1 done")
        ));
    }
}
