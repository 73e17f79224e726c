//! State Transition Validation
//!
//! Enforces workflow business rules when a work item changes state,
//! applies cascading parent updates, and rolls the whole operation back
//! when a write fails mid-cascade. Every applied write is recorded with
//! its inverse, so rollback actually reverses cascaded updates instead
//! of only the primary write.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ConfigHandle;
use crate::recovery::IntegrationErrorHandler;
use crate::tracker::{TrackerClient, WorkItemState, WorkItemType};
use crate::transitions::state_machine::is_legal_edge;

/// State-relevant facets of one work item, supplied fresh per request.
/// The tracking system stays the source of truth; this is a projection.
#[derive(Debug, Clone)]
pub struct TransitionWorkItem {
    pub id: String,
    pub state: WorkItemState,
    pub item_type: WorkItemType,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    pub dependency_ids: Vec<String>,
    pub blocked_by_ids: Vec<String>,
    pub subtask_ids: Vec<String>,
}

impl TransitionWorkItem {
    pub fn new(id: &str, state: WorkItemState, item_type: WorkItemType) -> Self {
        Self {
            id: id.to_string(),
            state,
            item_type,
            parent_id: None,
            child_ids: Vec::new(),
            dependency_ids: Vec::new(),
            blocked_by_ids: Vec::new(),
            subtask_ids: Vec::new(),
        }
    }
}

/// Relationship graph snapshot for one transition request
pub struct WorkItemGraph {
    items: HashMap<String, TransitionWorkItem>,
}

impl WorkItemGraph {
    pub fn new(items: Vec<TransitionWorkItem>) -> Self {
        Self { items: items.into_iter().map(|i| (i.id.clone(), i)).collect() }
    }

    pub fn get(&self, id: &str) -> Option<&TransitionWorkItem> {
        self.items.get(id)
    }

    pub fn state_of(&self, id: &str) -> Option<WorkItemState> {
        self.items.get(id).map(|i| i.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationSeverity {
    Warning,
    Error,
}

/// Structured reason a proposed change is disallowed or risky
#[derive(Debug, Clone)]
pub struct BusinessRuleViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    /// Whether `force` may bypass this violation
    pub overridable: bool,
}

impl BusinessRuleViolation {
    fn error(rule: &str, message: impl Into<String>, overridable: bool) -> Self {
        Self {
            rule: rule.to_string(),
            severity: ViolationSeverity::Error,
            message: message.into(),
            overridable,
        }
    }

    fn warning(rule: &str, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            severity: ViolationSeverity::Warning,
            message: message.into(),
            overridable: true,
        }
    }

    /// Whether this violation blocks the transition under the given force flag
    pub fn blocks(&self, force: bool) -> bool {
        self.severity == ViolationSeverity::Error && !(force && self.overridable)
    }
}

/// A parent update automatically derived from its children's states
#[derive(Debug, Clone)]
pub struct CascadedUpdate {
    pub item_id: String,
    pub from_state: WorkItemState,
    pub to_state: WorkItemState,
    pub reason: String,
}

/// Applied write with its inverse, for compensating rollback
#[derive(Debug, Clone)]
struct AppliedUpdate {
    item_id: String,
    previous_state: WorkItemState,
    new_state: WorkItemState,
}

/// Outcome of one transition request
#[derive(Debug)]
pub struct TransitionResult {
    pub success: bool,
    pub item_id: String,
    pub from_state: WorkItemState,
    pub to_state: WorkItemState,
    pub cascaded_updates: Vec<CascadedUpdate>,
    pub violations: Vec<BusinessRuleViolation>,
    pub rollback_performed: bool,
}

/// Per-request options
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionContext {
    /// Bypass overridable violations; never bypasses the state machine
    pub force: bool,
}

/// Validates and applies state transitions with cascades and rollback
pub struct TransitionValidator {
    config: ConfigHandle,
    client: Arc<dyn TrackerClient>,
    handler: IntegrationErrorHandler,
}

impl TransitionValidator {
    pub fn new(config: ConfigHandle, client: Arc<dyn TrackerClient>) -> Self {
        let handler = IntegrationErrorHandler::new(config.clone());
        Self { config, client, handler }
    }

    /// Validate and apply `item -> new_state`.
    ///
    /// Rule violations come back structurally in the result; only a
    /// failed primary commit propagates as an error. A failure after the
    /// primary write rolls back every applied update and reports
    /// `rollback_performed`.
    pub async fn handle_state_transition(
        &self,
        item_id: &str,
        new_state: WorkItemState,
        graph: &WorkItemGraph,
        context: &TransitionContext,
    ) -> Result<TransitionResult> {
        let config = self.config.snapshot();
        let item = graph
            .get(item_id)
            .ok_or_else(|| anyhow!("work item {item_id} not in the supplied graph"))?;
        let from_state = item.state;
        let txn = Uuid::new_v4();

        // Structural check first; force never bypasses the state machine
        if !is_legal_edge(from_state, new_state) {
            debug!(
                "txn {}: illegal edge {} -> {} for {}",
                txn, from_state, new_state, item_id
            );
            return Ok(TransitionResult {
                success: false,
                item_id: item_id.to_string(),
                from_state,
                to_state: new_state,
                cascaded_updates: Vec::new(),
                violations: vec![BusinessRuleViolation::error(
                    "illegal_transition",
                    format!("{} -> {} is not a legal workflow edge", from_state, new_state),
                    false,
                )],
                rollback_performed: false,
            });
        }

        let violations = validate_rules(item, new_state, graph, &config.transitions);
        if violations.iter().any(|v| v.blocks(context.force)) {
            debug!(
                "txn {}: {} blocked by {} violation(s)",
                txn,
                item_id,
                violations.len()
            );
            return Ok(TransitionResult {
                success: false,
                item_id: item_id.to_string(),
                from_state,
                to_state: new_state,
                cascaded_updates: Vec::new(),
                violations,
                rollback_performed: false,
            });
        }

        // Primary write; its failure is transaction-fatal
        let write = self
            .handler
            .execute_with_retry(&format!("update {item_id} to {new_state}"), || {
                self.client.update_issue_state(item_id, new_state)
            })
            .await;
        if let Some(err) = write.error {
            return Err(anyhow!("txn {txn}: primary write for {item_id} failed: {err}"));
        }

        info!("txn {}: {} {} -> {}", txn, item_id, from_state, new_state);

        let mut applied = vec![AppliedUpdate {
            item_id: item_id.to_string(),
            previous_state: from_state,
            new_state,
        }];
        let mut cascaded: Vec<CascadedUpdate> = Vec::new();
        // Pending states so sibling checks see updates from this chain
        let mut overrides: HashMap<String, WorkItemState> = HashMap::new();
        overrides.insert(item_id.to_string(), new_state);

        // Walk upward; each applied parent update may trigger the next
        let mut current_id = item_id.to_string();
        let mut current_state = new_state;
        while let Some((parent_id, parent_from, parent_to, reason)) =
            plan_parent_update(graph, &overrides, &current_id, current_state)
        {
            let write = self
                .handler
                .execute_with_retry(&format!("cascade {parent_id} to {parent_to}"), || {
                    self.client.update_issue_state(&parent_id, parent_to)
                })
                .await;

            if let Some(err) = write.error {
                warn!(
                    "txn {}: cascade to {} failed ({}), rolling back {} update(s)",
                    txn,
                    parent_id,
                    err,
                    applied.len()
                );
                let rollback_clean = self.rollback(&txn, &applied).await;
                let mut violations = violations.clone();
                violations.push(BusinessRuleViolation::error(
                    "cascade_failed",
                    format!("cascading update of {parent_id} failed: {err}"),
                    false,
                ));
                if !rollback_clean {
                    violations.push(BusinessRuleViolation::error(
                        "rollback_incomplete",
                        "one or more compensating writes failed; manual repair needed",
                        false,
                    ));
                }
                return Ok(TransitionResult {
                    success: false,
                    item_id: item_id.to_string(),
                    from_state,
                    to_state: new_state,
                    cascaded_updates: Vec::new(),
                    violations,
                    rollback_performed: true,
                });
            }

            info!("txn {}: cascaded {} {} -> {} ({})", txn, parent_id, parent_from, parent_to, reason);
            applied.push(AppliedUpdate {
                item_id: parent_id.clone(),
                previous_state: parent_from,
                new_state: parent_to,
            });
            overrides.insert(parent_id.clone(), parent_to);
            cascaded.push(CascadedUpdate {
                item_id: parent_id.clone(),
                from_state: parent_from,
                to_state: parent_to,
                reason,
            });
            current_id = parent_id;
            current_state = parent_to;
        }

        Ok(TransitionResult {
            success: true,
            item_id: item_id.to_string(),
            from_state,
            to_state: new_state,
            cascaded_updates: cascaded,
            violations,
            rollback_performed: false,
        })
    }

    /// Replay inverses in reverse order; returns whether every
    /// compensating write succeeded
    async fn rollback(&self, txn: &Uuid, applied: &[AppliedUpdate]) -> bool {
        let mut clean = true;
        for update in applied.iter().rev() {
            let write = self
                .handler
                .execute_with_retry(
                    &format!("rollback {} to {}", update.item_id, update.previous_state),
                    || self.client.update_issue_state(&update.item_id, update.previous_state),
                )
                .await;
            if let Some(err) = write.error {
                error!(
                    "txn {}: compensating write for {} failed: {}",
                    txn, update.item_id, err
                );
                clean = false;
            }
        }
        clean
    }
}

/// Business-rule validation for one proposed transition
fn validate_rules(
    item: &TransitionWorkItem,
    new_state: WorkItemState,
    graph: &WorkItemGraph,
    policy: &crate::config::TransitionPolicy,
) -> Vec<BusinessRuleViolation> {
    let mut violations = Vec::new();

    if new_state == WorkItemState::Done && policy.require_dependency_completion {
        let open: Vec<&str> = item
            .dependency_ids
            .iter()
            .filter(|id| {
                graph.state_of(id).map(|s| !s.is_terminal()).unwrap_or(false)
            })
            .map(String::as_str)
            .collect();
        if !open.is_empty() {
            violations.push(BusinessRuleViolation::error(
                "incomplete_dependencies",
                format!("dependencies not complete: {}", open.join(", ")),
                false,
            ));
        }
    }

    if new_state == WorkItemState::InProgress {
        let active: Vec<&str> = item
            .blocked_by_ids
            .iter()
            .filter(|id| {
                graph.state_of(id).map(|s| !s.is_terminal()).unwrap_or(false)
            })
            .map(String::as_str)
            .collect();
        if !active.is_empty() {
            violations.push(BusinessRuleViolation::warning(
                "active_blockers",
                format!("starting work while blocked by: {}", active.join(", ")),
            ));
        }
    }

    if new_state == WorkItemState::Done
        && item.item_type == WorkItemType::Epic
        && !policy.allow_partial_epic_completion
    {
        let incomplete: Vec<&str> = item
            .child_ids
            .iter()
            .filter(|id| {
                graph.state_of(id).map(|s| !s.is_terminal()).unwrap_or(false)
            })
            .map(String::as_str)
            .collect();
        if !incomplete.is_empty() {
            violations.push(BusinessRuleViolation::error(
                "partial_epic_completion",
                format!("epic has incomplete children: {}", incomplete.join(", ")),
                false,
            ));
        }
    }

    if new_state == WorkItemState::Done && !policy.allow_incomplete_subtasks {
        let open: Vec<&str> = item
            .subtask_ids
            .iter()
            .filter(|id| {
                graph.state_of(id).map(|s| !s.is_terminal()).unwrap_or(false)
            })
            .map(String::as_str)
            .collect();
        if !open.is_empty() {
            violations.push(BusinessRuleViolation::error(
                "incomplete_subtasks",
                format!("subtasks not complete: {}", open.join(", ")),
                true,
            ));
        }
    }

    violations
}

/// Derive the next upward cascade, if any, given the pending states of
/// this transaction
fn plan_parent_update(
    graph: &WorkItemGraph,
    overrides: &HashMap<String, WorkItemState>,
    child_id: &str,
    child_state: WorkItemState,
) -> Option<(String, WorkItemState, WorkItemState, String)> {
    let child = graph.get(child_id)?;
    let parent_id = child.parent_id.as_ref()?;
    let parent = graph.get(parent_id)?;
    let parent_state = overrides.get(parent_id).copied().unwrap_or(parent.state);

    let effective = |id: &String| overrides.get(id).copied().or_else(|| graph.state_of(id));

    match child_state {
        WorkItemState::Done => {
            let all_terminal = parent
                .child_ids
                .iter()
                .all(|id| effective(id).map(|s| s.is_terminal()).unwrap_or(true));
            if !parent_state.is_terminal() && all_terminal {
                return Some((
                    parent_id.clone(),
                    parent_state,
                    WorkItemState::Done,
                    format!("all children of {parent_id} are complete or canceled"),
                ));
            }
        }
        WorkItemState::InProgress => {
            if matches!(parent_state, WorkItemState::Backlog | WorkItemState::Todo) {
                return Some((
                    parent_id.clone(),
                    parent_state,
                    WorkItemState::InProgress,
                    format!("child {child_id} started work"),
                ));
            }
        }
        WorkItemState::Canceled => {
            let all_canceled = parent
                .child_ids
                .iter()
                .all(|id| effective(id).map(|s| s == WorkItemState::Canceled).unwrap_or(true));
            if !parent_state.is_terminal() && all_canceled {
                return Some((
                    parent_id.clone(),
                    parent_state,
                    WorkItemState::Canceled,
                    format!("all children of {parent_id} are canceled"),
                ));
            }
        }
        _ => {}
    }
    None
}
