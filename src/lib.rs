//! Planbot Agent Core
//!
//! Conversational automation core for a project-tracking workspace.
//!
//! # Features
//!
//! - **Command Interpreter**: free-text mentions to confidence-scored intents
//! - **Autonomous Behaviors**: trigger-driven automation with global budgets
//! - **Transition Validation**: workflow rules, cascades, and real rollback
//! - **Progress Engine**: weighted completion, edge-case rules, and alerts
//! - **Integration Recovery**: error classification, retry, concurrency control
//!
//! # Architecture
//!
//! ```text
//! Mention ──► Interpreter ──► Dispatcher ──► Planning executors
//! Webhook ──► Trigger ──► Behavior Engine ──► Actions
//!                              │
//!                              ├── Transition Validator (rules + cascades)
//!                              ├── Progress Engine (metrics + alerts)
//!                              └── Recovery (retry + concurrency control)
//!                                        │
//!                                  Tracker client
//! ```
//!
//! The core is a library: webhook transport, chat delivery, and response
//! rendering live with the embedding application.

pub mod behavior;
pub mod config;
pub mod dispatch;
pub mod intent;
pub mod metrics;
pub mod progress;
pub mod recovery;
pub mod tracker;
pub mod transitions;
pub mod webhook;

pub use behavior::{
    AutonomousBehavior, BehaviorAction, BehaviorContext, BehaviorEngine, BehaviorResult,
    BehaviorTrigger, TriggerType,
};
pub use config::{AgentConfig, ConfigError, ConfigHandle, ProgressStrategy};
pub use dispatch::{CommandDispatcher, CommandExecutor, CommandResponse};
pub use intent::{CommandIntent, CommandInterpreter, ParameterExtractor, ParsedIntent};
pub use metrics::{BehaviorHealth, BehaviorHealthMonitor};
pub use progress::{ProgressEngine, ProgressResult, ReadinessLevel, WorkItem};
pub use recovery::{
    ConcurrencyPolicy, IntegrationError, IntegrationErrorHandler, IntegrationErrorKind,
    RetryResult,
};
pub use tracker::{
    IssueContext, IssueRelation, RelationFilter, Team, TrackerClient, TrackerError,
    WorkItemState, WorkItemType,
};
pub use transitions::{
    BusinessRuleViolation, CascadedUpdate, TransitionContext, TransitionResult,
    TransitionValidator, TransitionWorkItem, ViolationSeverity, WorkItemGraph,
};
pub use webhook::WebhookPayload;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging for an embedding binary. Level comes from
/// `RUST_LOG`, defaulting to info.
pub fn init_tracing() -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
