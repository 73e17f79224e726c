//! Monitoring Behaviors
//!
//! Proactive watchers over the workspace:
//! - Story size monitor (oversized stories get a decomposition nudge)
//! - ART health monitor (periodic readiness check over the active scope)
//! - Anomaly detector (reopened and iteration-churned items)

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::behavior::traits::{
    AutonomousBehavior, BehaviorAction, BehaviorContext, BehaviorResult, TriggerType,
};
use crate::progress::{self, ReadinessLevel, WorkItem};
use crate::tracker::WorkItemState;

/// Flags stories whose estimate exceeds the configured ceiling
pub struct StorySizeMonitor;

#[async_trait]
impl AutonomousBehavior for StorySizeMonitor {
    fn id(&self) -> &str {
        "story-size-monitor"
    }

    fn name(&self) -> &str {
        "Story Size Monitor"
    }

    fn priority(&self) -> u32 {
        80
    }

    async fn should_trigger(&self, context: &BehaviorContext) -> bool {
        context
            .issue
            .as_ref()
            .and_then(|issue| issue.estimate)
            .map(|points| points > context.config.automation.max_story_points)
            .unwrap_or(false)
    }

    async fn execute(&self, context: &BehaviorContext) -> Result<BehaviorResult> {
        let issue = context
            .issue
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("story size monitor requires an issue snapshot"))?;
        let points = issue.estimate.unwrap_or_default();
        let ceiling = context.config.automation.max_story_points;

        let actions = vec![
            BehaviorAction::PostComment {
                issue_id: issue.issue_id.clone(),
                body: format!(
                    "This story is estimated at {points} points, above the {ceiling} point \
                     ceiling. Consider decomposing it into smaller, independently \
                     deliverable stories."
                ),
            },
            BehaviorAction::AddLabel {
                issue_id: issue.issue_id.clone(),
                label: "needs-decomposition".to_string(),
            },
        ];
        Ok(BehaviorResult::with_actions(self.id(), actions, true))
    }
}

/// Periodic readiness check over the items carried in the trigger payload
pub struct ArtHealthMonitor;

impl ArtHealthMonitor {
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
impl AutonomousBehavior for ArtHealthMonitor {
    fn id(&self) -> &str {
        "art-health-monitor"
    }

    fn name(&self) -> &str {
        "ART Health Monitor"
    }

    fn priority(&self) -> u32 {
        70
    }

    async fn should_trigger(&self, context: &BehaviorContext) -> bool {
        context.trigger.trigger_type == TriggerType::Schedule
            || !Self::items_from(&context.trigger.payload).is_empty()
    }

    async fn execute(&self, context: &BehaviorContext) -> Result<BehaviorResult> {
        let items = Self::items_from(&context.trigger.payload);
        if items.is_empty() {
            return Ok(BehaviorResult::with_actions(self.id(), Vec::new(), false));
        }

        let report = progress::calculate_with_config(&items, &context.config);
        let unhealthy = matches!(
            report.readiness,
            ReadinessLevel::Critical | ReadinessLevel::Warning
        );
        if !unhealthy {
            return Ok(BehaviorResult::with_actions(self.id(), Vec::new(), false));
        }

        let actions = vec![BehaviorAction::Notify {
            message: format!(
                "ART health is {}: {:.0}% complete across {} items, {} alert(s) raised",
                report.readiness.as_str(),
                report.percentage,
                report.item_count,
                report.alerts.len()
            ),
        }];
        Ok(BehaviorResult::with_actions(self.id(), actions, true))
    }
}

/// Flags reopened items and items churning between iterations
pub struct AnomalyDetector;

impl AnomalyDetector {
    fn previous_state(payload: &Value) -> Option<WorkItemState> {
        payload
            .get("data")
            .and_then(|d| d.get("previousState"))
            .and_then(Value::as_str)
            .and_then(WorkItemState::parse)
    }

    fn moved_from_iteration(payload: &Value) -> bool {
        payload
            .get("data")
            .and_then(|d| d.get("movedFromIteration"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[async_trait]
impl AutonomousBehavior for AnomalyDetector {
    fn id(&self) -> &str {
        "anomaly-detector"
    }

    fn name(&self) -> &str {
        "Anomaly Detector"
    }

    fn priority(&self) -> u32 {
        40
    }

    async fn should_trigger(&self, context: &BehaviorContext) -> bool {
        let payload = &context.trigger.payload;
        let reopened = Self::previous_state(payload) == Some(WorkItemState::Done)
            && context
                .issue
                .as_ref()
                .and_then(|i| i.state)
                .map(|s| s != WorkItemState::Done)
                .unwrap_or(false);
        reopened || Self::moved_from_iteration(payload)
    }

    async fn execute(&self, context: &BehaviorContext) -> Result<BehaviorResult> {
        let issue = context
            .issue
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("anomaly detector requires an issue snapshot"))?;
        let mut actions = Vec::new();

        if Self::previous_state(&context.trigger.payload) == Some(WorkItemState::Done) {
            actions.push(BehaviorAction::Notify {
                message: format!("{} was reopened after completion", issue.issue_id),
            });
        }
        if Self::moved_from_iteration(&context.trigger.payload) {
            actions.push(BehaviorAction::Notify {
                message: format!(
                    "{} moved between iterations; recurring churn may hide a scoping problem",
                    issue.issue_id
                ),
            });
        }

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
    async fn test_story_size_monitor_flags_oversized() {
        let context = context_for(
            serde_json::json!({
                "data": { "identifier": "PLAT-1", "estimate": 13.0 }
            }),
            TriggerType::Webhook,
        );

        let monitor = StorySizeMonitor;
        assert!(monitor.should_trigger(&context).await);

        let result = monitor.execute(&context).await.unwrap();
        assert!(result.success);
        assert!(result.should_notify);
        assert_eq!(result.actions.len(), 2);
        assert!(matches!(
            &result.actions[1],
            BehaviorAction::AddLabel { label, .. } if label == "needs-decomposition"
        ));
    }

    #[tokio::test]
    async fn test_story_size_monitor_ignores_small_stories() {
        let context = context_for(
            serde_json::json!({
                "data": { "identifier": "PLAT-2", "estimate": 3.0 }
            }),
            TriggerType::Webhook,
        );
        assert!(!StorySizeMonitor.should_trigger(&context).await);
    }

    #[tokio::test]
    async fn test_art_health_monitor_notifies_on_poor_readiness() {
        let context = context_for(
            serde_json::json!({
                "data": { "items": [
                    { "id": "a", "storyPoints": 5.0, "state": "Todo", "type": "Story" },
                    { "id": "b", "storyPoints": 5.0, "state": "Todo", "type": "Story" }
                ]}
            }),
            TriggerType::Schedule,
        );

        let monitor = ArtHealthMonitor;
        assert!(monitor.should_trigger(&context).await);

        let result = monitor.execute(&context).await.unwrap();
        assert!(result.should_notify);
        assert!(matches!(
            &result.actions[0],
            BehaviorAction::Notify { message } if message.contains("critical")
        ));
    }

    #[tokio::test]
    async fn test_art_health_monitor_quiet_when_healthy() {
        let context = context_for(
            serde_json::json!({
                "data": { "items": [
                    { "id": "a", "storyPoints": 5.0, "state": "Done", "type": "Story" }
                ]}
            }),
            TriggerType::Schedule,
        );

        let result = ArtHealthMonitor.execute(&context).await.unwrap();
        assert!(result.actions.is_empty());
        assert!(!result.should_notify);
    }

    #[tokio::test]
    async fn test_anomaly_detector_flags_reopen() {
        let context = context_for(
            serde_json::json!({
                "data": {
                    "identifier": "PLAT-3",
                    "state": { "name": "In Review" },
                    "previousState": "Done"
                }
            }),
            TriggerType::Webhook,
        );

        let detector = AnomalyDetector;
        assert!(detector.should_trigger(&context).await);

        let result = detector.execute(&context).await.unwrap();
        assert!(matches!(
            &result.actions[0],
            BehaviorAction::Notify { message } if message.contains("reopened")
        ));
    }

    #[tokio::test]
    async fn test_anomaly_detector_ignores_normal_updates() {
        let context = context_for(
            serde_json::json!({
                "data": {
                    "identifier": "PLAT-4",
                    "state": { "name": "In Progress" },
                    "previousState": "Todo"
                }
            }),
            TriggerType::Webhook,
        );
        assert!(!AnomalyDetector.should_trigger(&context).await);
    }
}
