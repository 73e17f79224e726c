//! Autonomous Behavior System
//!
//! Proactive automation over workspace events:
//! - Behavior contract (applicability check + action logic per unit)
//! - Engine (trigger routing, global budgets, priority ordering)
//! - Monitoring behaviors (story size, ART health, anomalies)
//! - Automation behaviors (dependencies, workflow hygiene, reporting)
//!
//! Behaviors run sequentially in priority order within one trigger, so a
//! later behavior can observe the actions of an earlier one.

pub mod automation;
pub mod engine;
pub mod monitors;
pub mod traits;

pub use automation::{DependencyDetector, PeriodicReporter, WorkflowAutomator};
pub use engine::BehaviorEngine;
pub use monitors::{AnomalyDetector, ArtHealthMonitor, StorySizeMonitor};
pub use traits::{
    AutonomousBehavior, BehaviorAction, BehaviorContext, BehaviorResult, BehaviorTrigger,
    TriggerType,
};
