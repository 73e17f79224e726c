//! State Transition Enforcement
//!
//! State machine, business-rule validation, cascading parent updates,
//! and compensating rollback for work-item state changes.

pub mod state_machine;
pub mod validator;

pub use state_machine::{allowed_targets, is_legal_edge};
pub use validator::{
    BusinessRuleViolation, CascadedUpdate, TransitionContext, TransitionResult,
    TransitionValidator, TransitionWorkItem, ViolationSeverity, WorkItemGraph,
};
