//! Agent Flow Integration Tests
//!
//! End-to-end paths: mention -> intent -> dispatch, and
//! webhook payload -> trigger -> behavior engine.

use std::sync::Arc;

use async_trait::async_trait;
use planbot_core::behavior::{
    AnomalyDetector, ArtHealthMonitor, DependencyDetector, PeriodicReporter, StorySizeMonitor,
    WorkflowAutomator,
};
use planbot_core::{
    AgentConfig, BehaviorAction, BehaviorEngine, BehaviorHealthMonitor, BehaviorTrigger,
    CommandDispatcher, CommandExecutor, CommandIntent, CommandInterpreter, CommandResponse,
    ConfigHandle, ParameterExtractor, ParsedIntent, Team, TriggerType, WebhookPayload,
};

struct EchoExecutor;

#[async_trait]
impl CommandExecutor for EchoExecutor {
    async fn execute(&self, intent: &ParsedIntent) -> anyhow::Result<CommandResponse> {
        Ok(CommandResponse::ok(format!(
            "executing {} with {} parameter(s)",
            intent.intent.as_str(),
            intent.parameters.len()
        )))
    }
}

fn teams() -> Vec<Team> {
    vec![Team { id: "t1".into(), key: "PLAT".into(), name: "Platform".into() }]
}

async fn engine_with_builtins() -> (BehaviorEngine, Arc<BehaviorHealthMonitor>) {
    let health = Arc::new(BehaviorHealthMonitor::new());
    let engine = BehaviorEngine::new(ConfigHandle::default(), Arc::clone(&health));
    engine.register_behavior(Arc::new(StorySizeMonitor)).await;
    engine.register_behavior(Arc::new(ArtHealthMonitor)).await;
    engine.register_behavior(Arc::new(DependencyDetector)).await;
    engine.register_behavior(Arc::new(WorkflowAutomator)).await;
    engine.register_behavior(Arc::new(AnomalyDetector)).await;
    engine.register_behavior(Arc::new(PeriodicReporter)).await;
    (engine, health)
}

#[tokio::test]
async fn test_mention_to_response_path() {
    let config = ConfigHandle::default();
    let interpreter = CommandInterpreter::new(config.clone());
    let dispatcher = CommandDispatcher::new(config, Arc::new(EchoExecutor));

    let mut intent = interpreter.parse("@planbot plan art for next PI for team platform", None);
    assert_eq!(intent.intent, CommandIntent::PlanArt);
    assert!(intent.confidence > 0.8);

    let issues = ParameterExtractor::enrich(&mut intent, &teams());
    assert!(issues.is_empty(), "unexpected parameter issues: {:?}", issues);
    assert_eq!(intent.parameters.get("team_id").map(String::as_str), Some("t1"));
    assert_eq!(intent.parameters.get("horizon").map(String::as_str), Some("1"));

    let response = dispatcher.dispatch(&intent).await;
    assert!(response.success);
    assert!(response.text.contains("plan_art"));
}

#[tokio::test]
async fn test_unrecognized_mention_still_gets_a_reply() {
    let config = ConfigHandle::default();
    let interpreter = CommandInterpreter::new(config.clone());
    let dispatcher = CommandDispatcher::new(config, Arc::new(EchoExecutor));

    let intent = interpreter.parse("@planbot do the flibbertigibbet", None);
    assert_eq!(intent.intent, CommandIntent::Unknown);

    let response = dispatcher.dispatch(&intent).await;
    assert!(!response.success);
    assert!(!response.text.is_empty());
}

#[tokio::test]
async fn test_oversized_story_webhook_drives_monitors() {
    let (engine, health) = engine_with_builtins().await;

    let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
        "type": "Issue",
        "action": "update",
        "data": {
            "identifier": "PLAT-99",
            "estimate": 21.0,
            "state": { "name": "Todo" },
            "description": "Large migration. Depends on PLAT-7."
        },
        "createdAt": "2026-03-01T09:00:00Z"
    }))
    .unwrap();
    assert!(payload.is_actionable());

    let results = engine.process_trigger(payload.into_trigger()).await;

    // All six behaviors report; declined ones as successful no-ops
    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.success));

    let size_result = results
        .iter()
        .find(|r| r.behavior_id == "story-size-monitor")
        .expect("story size monitor result");
    assert!(size_result.actions.iter().any(|a| matches!(
        a,
        BehaviorAction::AddLabel { label, .. } if label == "needs-decomposition"
    )));

    let dep_result = results
        .iter()
        .find(|r| r.behavior_id == "dependency-detector")
        .expect("dependency detector result");
    assert!(dep_result.actions.iter().any(|a| matches!(
        a,
        BehaviorAction::LinkDependency { depends_on, .. } if depends_on == "PLAT-7"
    )));

    // Behaviors ran in descending priority order
    let positions: Vec<&str> = results.iter().map(|r| r.behavior_id.as_str()).collect();
    let size_pos = positions.iter().position(|id| *id == "story-size-monitor").unwrap();
    let reporter_pos = positions.iter().position(|id| *id == "periodic-reporter").unwrap();
    assert!(size_pos < reporter_pos);

    // Health sink saw every behavior
    assert_eq!(health.all_health().len(), 6);
}

#[tokio::test]
async fn test_schedule_trigger_reaches_only_periodic_behaviors() {
    let (engine, _) = engine_with_builtins().await;

    let trigger = BehaviorTrigger::new(
        TriggerType::Schedule,
        serde_json::json!({
            "data": { "items": [
                { "id": "a", "storyPoints": 5.0, "state": "Done", "type": "Story" },
                { "id": "b", "storyPoints": 3.0, "state": "Todo", "type": "Story" }
            ]}
        }),
    );

    let results = engine.process_trigger(trigger).await;
    let ids: Vec<&str> = results.iter().map(|r| r.behavior_id.as_str()).collect();

    // Only id-marked periodic/monitoring behaviors apply to schedules
    assert!(ids.contains(&"art-health-monitor"));
    assert!(ids.contains(&"periodic-reporter"));
    assert!(ids.contains(&"story-size-monitor"));
    assert!(!ids.contains(&"workflow-automator"));

    let report = results
        .iter()
        .find(|r| r.behavior_id == "periodic-reporter")
        .expect("reporter result");
    assert!(report.should_notify);
    assert!(report
        .actions
        .iter()
        .any(|a| matches!(a, BehaviorAction::Notify { message } if message.contains("Progress report"))));
}

#[tokio::test]
async fn test_exhausted_budget_drops_webhook_triggers() {
    let mut config = AgentConfig::default();
    config.automation.max_executions_per_hour = 1;
    config.automation.max_executions_per_minute = 10;

    let health = Arc::new(BehaviorHealthMonitor::new());
    let engine = BehaviorEngine::new(ConfigHandle::new(config).unwrap(), Arc::clone(&health));
    engine.register_behavior(Arc::new(PeriodicReporter)).await;

    let schedule = || BehaviorTrigger::new(TriggerType::Schedule, serde_json::json!({}));

    assert_eq!(engine.process_trigger(schedule()).await.len(), 1);
    // Budget exhausted: the whole next trigger is dropped
    assert!(engine.process_trigger(schedule()).await.is_empty());
    assert_eq!(health.totals().0, 1);
}
