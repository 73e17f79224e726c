//! Progress Calculation Engine
//!
//! Computes weighted completion metrics for a snapshot of work items
//! under configurable edge-case rules, and raises threshold-based
//! alerts. Pure with respect to its inputs: the same items and config
//! always produce the same result, and every rule that fires is logged
//! into the result for auditability.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AgentConfig, ConfigHandle, ProgressStrategy};
use crate::tracker::{WorkItemState, WorkItemType};

/// Flat penalty applied per epic completed over incomplete children
const EPIC_VIOLATION_PENALTY: f64 = 5.0;

/// Cap applied while any completed item still has an open dependency
const PROVISIONAL_COMPLETION_CAP: f64 = 90.0;

/// Transient projection of a work item for aggregate calculation.
///
/// Maps to the same external entity as a transition item but is a
/// separate snapshot owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    #[serde(default)]
    pub story_points: f64,
    pub state: WorkItemState,
    #[serde(rename = "type")]
    pub item_type: WorkItemType,
    #[serde(default)]
    pub parent_epic_id: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub moved_from_iteration: bool,
}

/// Coarse classification of aggregate planning completeness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessLevel {
    Critical,
    Warning,
    Good,
    Excellent,
}

impl ReadinessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessLevel::Critical => "critical",
            ReadinessLevel::Warning => "warning",
            ReadinessLevel::Good => "good",
            ReadinessLevel::Excellent => "excellent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

/// Typed alert carrying the breached threshold and a remediation hint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressAlert {
    pub severity: AlertSeverity,
    pub kind: String,
    pub message: String,
    pub threshold: f64,
    pub actual: f64,
    pub recommendation: String,
}

/// Result of one progress calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResult {
    /// Always the simple completed/total ratio, in [0, 100]
    pub percentage: f64,
    /// Strategy-dependent ratio; allowed to diverge from `percentage`
    pub weighted_percentage: f64,
    pub total_points: f64,
    pub completed_points: f64,
    pub in_progress_points: f64,
    pub item_count: usize,
    pub readiness: ReadinessLevel,
    pub alerts: Vec<ProgressAlert>,
    /// Edge cases and business rules that fired, for auditability
    pub applied_rules: Vec<String>,
}

/// Progress calculation engine reading through the shared config handle
pub struct ProgressEngine {
    config: ConfigHandle,
}

impl ProgressEngine {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }

    /// Calculate progress for a snapshot of items under the current config
    pub fn calculate_progress_with_edge_cases(&self, items: &[WorkItem]) -> ProgressResult {
        let config = self.config.snapshot();
        calculate_with_config(items, &config)
    }
}

/// Pure calculation against an explicit config snapshot
pub fn calculate_with_config(items: &[WorkItem], config: &AgentConfig) -> ProgressResult {
    let progress = &config.progress;
    let mut rules: Vec<String> = Vec::new();

    if items.is_empty() {
        rules.push("empty_item_set".to_string());
        return ProgressResult {
            percentage: 0.0,
            weighted_percentage: 0.0,
            total_points: 0.0,
            completed_points: 0.0,
            in_progress_points: 0.0,
            item_count: 0,
            readiness: ReadinessLevel::Critical,
            alerts: vec![ProgressAlert {
                severity: AlertSeverity::Info,
                kind: "empty_scope".to_string(),
                message: "No work items in scope".to_string(),
                threshold: 0.0,
                actual: 0.0,
                recommendation: "Add items to the iteration before tracking progress".to_string(),
            }],
            applied_rules: rules,
        };
    }

    // Per-item weights with edge-case handling. Excluded items keep a
    // zero weight rather than being dropped, so reporting stays complete.
    let weights: Vec<f64> = items
        .iter()
        .map(|item| {
            if item.moved_from_iteration && !progress.include_moved_items {
                push_once(&mut rules, "moved_item_excluded");
                return 0.0;
            }
            let mut weight = item.story_points;
            if weight == 0.0 && item.item_type == WorkItemType::Story {
                push_once(&mut rules, "zero_point_story_reweighted");
                weight = progress.zero_point_story_weight;
            }
            if item.item_type == WorkItemType::Enabler {
                push_once(&mut rules, "enabler_multiplier_applied");
                weight *= progress.enabler_story_multiplier;
            }
            weight
        })
        .collect();

    let total_points: f64 = weights.iter().sum();
    let completed_points: f64 = zip_weights(items, &weights)
        .filter(|(item, _)| item.state == WorkItemState::Done)
        .map(|(_, w)| w)
        .sum();
    let in_progress_points: f64 = zip_weights(items, &weights)
        .filter(|(item, _)| item.state.is_active())
        .map(|(_, w)| w)
        .sum();

    let mut percentage = if total_points > 0.0 {
        completed_points / total_points * 100.0
    } else {
        push_once(&mut rules, "zero_total_weight");
        0.0
    };

    let mut weighted_percentage = match progress.strategy {
        ProgressStrategy::Simple => percentage,
        ProgressStrategy::Weighted => {
            push_once(&mut rules, "weighted_strategy");
            let squared_total: f64 = weights.iter().map(|w| w * w).sum();
            let squared_done: f64 = zip_weights(items, &weights)
                .filter(|(item, _)| item.state == WorkItemState::Done)
                .map(|(_, w)| w * w)
                .sum();
            if squared_total > 0.0 {
                squared_done / squared_total * 100.0
            } else {
                0.0
            }
        }
        ProgressStrategy::Milestone => {
            push_once(&mut rules, "milestone_strategy");
            let milestones: Vec<&WorkItem> =
                items.iter().filter(|i| i.item_type.is_container()).collect();
            if milestones.is_empty() {
                push_once(&mut rules, "no_milestones_in_scope");
                0.0
            } else {
                let done =
                    milestones.iter().filter(|i| i.state == WorkItemState::Done).count();
                done as f64 / milestones.len() as f64 * 100.0
            }
        }
    };

    // Completed items with open dependencies make "done" provisional
    if has_completed_with_open_dependency(items) {
        push_once(&mut rules, "provisional_completion_cap");
        percentage = percentage.min(PROVISIONAL_COMPLETION_CAP);
        weighted_percentage = weighted_percentage.min(PROVISIONAL_COMPLETION_CAP);
    }

    // Epics completed over incomplete children take a flat penalty each
    if !config.transitions.allow_partial_epic_completion {
        let violating = violating_epics(items);
        if violating > 0 {
            push_once(&mut rules, "partial_epic_penalty");
            let penalty = violating as f64 * EPIC_VIOLATION_PENALTY;
            percentage = (percentage - penalty).max(0.0);
            weighted_percentage = (weighted_percentage - penalty).max(0.0);
        }
    }

    percentage = percentage.clamp(0.0, 100.0);
    weighted_percentage = weighted_percentage.clamp(0.0, 100.0);

    let thresholds = &progress.thresholds;
    let mut alerts = Vec::new();

    if percentage < thresholds.progress_critical {
        alerts.push(ProgressAlert {
            severity: AlertSeverity::Critical,
            kind: "progress_below_critical".to_string(),
            message: format!("Completion {:.1}% is below the critical threshold", percentage),
            threshold: thresholds.progress_critical,
            actual: percentage,
            recommendation: "Rescope the iteration or escalate blockers".to_string(),
        });
    } else if percentage < thresholds.progress_warning {
        alerts.push(ProgressAlert {
            severity: AlertSeverity::Warning,
            kind: "progress_below_warning".to_string(),
            message: format!("Completion {:.1}% is below the warning threshold", percentage),
            threshold: thresholds.progress_warning,
            actual: percentage,
            recommendation: "Review remaining work and confirm the plan is achievable"
                .to_string(),
        });
    }

    let active_points: f64 = zip_weights(items, &weights)
        .filter(|(item, _)| item.state != WorkItemState::Canceled)
        .map(|(_, w)| w)
        .sum();
    if active_points > 0.0 {
        let utilization = in_progress_points / active_points;
        if utilization < thresholds.utilization_min {
            alerts.push(ProgressAlert {
                severity: AlertSeverity::Warning,
                kind: "capacity_under_utilized".to_string(),
                message: format!("Capacity utilization {:.0}% is below minimum", utilization * 100.0),
                threshold: thresholds.utilization_min,
                actual: utilization,
                recommendation: "Pull ready work into progress".to_string(),
            });
        } else if utilization > thresholds.utilization_max {
            alerts.push(ProgressAlert {
                severity: AlertSeverity::Warning,
                kind: "capacity_over_utilized".to_string(),
                message: format!("Capacity utilization {:.0}% exceeds maximum", utilization * 100.0),
                threshold: thresholds.utilization_max,
                actual: utilization,
                recommendation: "Finish in-flight items before starting new work".to_string(),
            });
        }
    }

    let variance = (percentage - weighted_percentage).abs();
    if variance > thresholds.variance_threshold {
        alerts.push(ProgressAlert {
            severity: AlertSeverity::Info,
            kind: "percentage_variance".to_string(),
            message: format!(
                "Plain ({:.1}%) and weighted ({:.1}%) completion diverge",
                percentage, weighted_percentage
            ),
            threshold: thresholds.variance_threshold,
            actual: variance,
            recommendation: "Large items dominate the remaining work; check their status"
                .to_string(),
        });
    }

    let readiness = readiness_for(percentage, thresholds.progress_warning, thresholds.progress_critical);

    debug!(
        "Progress: {:.1}% ({:.1} of {:.1} points), readiness {}",
        percentage,
        completed_points,
        total_points,
        readiness.as_str()
    );

    ProgressResult {
        percentage,
        weighted_percentage,
        total_points,
        completed_points,
        in_progress_points,
        item_count: items.len(),
        readiness,
        alerts,
        applied_rules: rules,
    }
}

/// Readiness is a pure function of the final percentage; >= 95 is always
/// excellent regardless of configured thresholds
fn readiness_for(percentage: f64, warning: f64, critical: f64) -> ReadinessLevel {
    if percentage >= 95.0 {
        ReadinessLevel::Excellent
    } else if percentage >= warning {
        ReadinessLevel::Good
    } else if percentage >= critical {
        ReadinessLevel::Warning
    } else {
        ReadinessLevel::Critical
    }
}

fn zip_weights<'a>(
    items: &'a [WorkItem],
    weights: &'a [f64],
) -> impl Iterator<Item = (&'a WorkItem, f64)> {
    items.iter().zip(weights.iter().copied())
}

fn has_completed_with_open_dependency(items: &[WorkItem]) -> bool {
    items
        .iter()
        .filter(|item| item.state == WorkItemState::Done)
        .any(|item| {
            item.dependencies.iter().any(|dep_id| {
                items
                    .iter()
                    .find(|other| other.id == *dep_id)
                    .map(|dep| !dep.state.is_terminal())
                    .unwrap_or(false)
            })
        })
}

fn violating_epics(items: &[WorkItem]) -> usize {
    items
        .iter()
        .filter(|item| {
            item.item_type == WorkItemType::Epic && item.state == WorkItemState::Done
        })
        .filter(|epic| {
            items.iter().any(|child| {
                child.parent_epic_id.as_deref() == Some(epic.id.as_str())
                    && !child.state.is_terminal()
            })
        })
        .count()
}

fn push_once(rules: &mut Vec<String>, rule: &str) {
    if !rules.iter().any(|r| r == rule) {
        rules.push(rule.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, points: f64, state: WorkItemState) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            story_points: points,
            state,
            item_type: WorkItemType::Story,
            parent_epic_id: None,
            dependencies: Vec::new(),
            moved_from_iteration: false,
        }
    }

    fn engine() -> ProgressEngine {
        ProgressEngine::new(ConfigHandle::default())
    }

    #[test]
    fn test_empty_input_short_circuits() {
        let result = engine().calculate_progress_with_edge_cases(&[]);
        assert_eq!(result.percentage, 0.0);
        assert_eq!(result.readiness, ReadinessLevel::Critical);
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].severity, AlertSeverity::Info);
        assert!(result.applied_rules.contains(&"empty_item_set".to_string()));
    }

    #[test]
    fn test_zero_point_and_enabler_weighting_scenario() {
        // With defaults (zero-point weight 1, enabler multiplier 1.2):
        // total = 1 + 3.6 + 8 = 12.6, completed = 1 + 3.6 = 4.6
        let items = vec![
            story("a", 0.0, WorkItemState::Done),
            WorkItem {
                item_type: WorkItemType::Enabler,
                ..story("b", 3.0, WorkItemState::Done)
            },
            story("c", 8.0, WorkItemState::InProgress),
        ];

        let result = engine().calculate_progress_with_edge_cases(&items);
        assert!((result.total_points - 12.6).abs() < 1e-9);
        assert!((result.completed_points - 4.6).abs() < 1e-9);
        assert_eq!(result.percentage.round(), 37.0);
        assert!(result.applied_rules.contains(&"zero_point_story_reweighted".to_string()));
        assert!(result.applied_rules.contains(&"enabler_multiplier_applied".to_string()));
    }

    #[test]
    fn test_pure_function_property() {
        let items = vec![
            story("a", 3.0, WorkItemState::Done),
            story("b", 5.0, WorkItemState::InProgress),
            story("c", 2.0, WorkItemState::Todo),
        ];
        let engine = engine();
        let first = engine.calculate_progress_with_edge_cases(&items);
        let second = engine.calculate_progress_with_edge_cases(&items);
        assert_eq!(first, second);
    }

    #[test]
    fn test_moved_items_keep_zero_weight_but_stay_listed() {
        let mut config = AgentConfig::default();
        config.progress.include_moved_items = false;
        let engine = ProgressEngine::new(ConfigHandle::new(config).unwrap());

        let mut moved = story("m", 5.0, WorkItemState::Done);
        moved.moved_from_iteration = true;
        let items = vec![moved, story("a", 5.0, WorkItemState::Done)];

        let result = engine.calculate_progress_with_edge_cases(&items);
        assert_eq!(result.item_count, 2);
        assert!((result.total_points - 5.0).abs() < 1e-9);
        assert!(result.applied_rules.contains(&"moved_item_excluded".to_string()));
    }

    #[test]
    fn test_provisional_completion_cap() {
        let mut done_with_dep = story("a", 8.0, WorkItemState::Done);
        done_with_dep.dependencies = vec!["b".to_string()];
        let items = vec![done_with_dep, story("b", 1.0, WorkItemState::InProgress)];

        // 8/9 would be ~89% without the cap; make it 100% by completing b's
        // weight share: instead verify the cap against a high raw ratio.
        let mut items_high = items.clone();
        items_high[1].story_points = 0.0;
        items_high[1].item_type = WorkItemType::Enabler; // zero weight, stays open

        let result = engine().calculate_progress_with_edge_cases(&items_high);
        assert!(result.percentage <= 90.0);
        assert!(result.applied_rules.contains(&"provisional_completion_cap".to_string()));
    }

    #[test]
    fn test_partial_epic_penalty() {
        let epic = WorkItem {
            id: "epic-1".to_string(),
            story_points: 0.0,
            state: WorkItemState::Done,
            item_type: WorkItemType::Epic,
            parent_epic_id: None,
            dependencies: Vec::new(),
            moved_from_iteration: false,
        };
        let mut child = story("s1", 5.0, WorkItemState::Done);
        child.parent_epic_id = Some("epic-1".to_string());
        let mut open_child = story("s2", 5.0, WorkItemState::InProgress);
        open_child.parent_epic_id = Some("epic-1".to_string());

        let items = vec![epic, child, open_child];
        let result = engine().calculate_progress_with_edge_cases(&items);

        // 5/10 = 50% minus the flat per-epic penalty
        assert!((result.percentage - 45.0).abs() < 1e-9);
        assert!(result.applied_rules.contains(&"partial_epic_penalty".to_string()));
    }

    #[test]
    fn test_milestone_strategy_ignores_points() {
        let mut config = AgentConfig::default();
        config.progress.strategy = ProgressStrategy::Milestone;
        let engine = ProgressEngine::new(ConfigHandle::new(config).unwrap());

        let done_feature = WorkItem {
            item_type: WorkItemType::Feature,
            ..story("f1", 1.0, WorkItemState::Done)
        };
        let open_epic = WorkItem {
            item_type: WorkItemType::Epic,
            ..story("e1", 40.0, WorkItemState::InProgress)
        };
        let items = vec![done_feature, open_epic, story("s1", 3.0, WorkItemState::Done)];

        let result = engine.calculate_progress_with_edge_cases(&items);
        assert!((result.weighted_percentage - 50.0).abs() < 1e-9);
        assert!(result.applied_rules.contains(&"milestone_strategy".to_string()));
    }

    #[test]
    fn test_weighted_strategy_biases_toward_large_items() {
        let mut config = AgentConfig::default();
        config.progress.strategy = ProgressStrategy::Weighted;
        let engine = ProgressEngine::new(ConfigHandle::new(config).unwrap());

        // Small item done, large item open: weighted lags simple
        let items = vec![
            story("small", 1.0, WorkItemState::Done),
            story("large", 8.0, WorkItemState::InProgress),
        ];
        let result = engine.calculate_progress_with_edge_cases(&items);
        assert!(result.weighted_percentage < result.percentage);
    }

    #[test]
    fn test_readiness_bands() {
        assert_eq!(readiness_for(96.0, 70.0, 50.0), ReadinessLevel::Excellent);
        assert_eq!(readiness_for(80.0, 70.0, 50.0), ReadinessLevel::Good);
        assert_eq!(readiness_for(60.0, 70.0, 50.0), ReadinessLevel::Warning);
        assert_eq!(readiness_for(10.0, 70.0, 50.0), ReadinessLevel::Critical);
        // The excellent band is fixed even under exotic thresholds
        assert_eq!(readiness_for(95.0, 99.0, 98.0), ReadinessLevel::Excellent);
    }

    #[test]
    fn test_percentage_always_in_range() {
        let items = vec![story("a", 5.0, WorkItemState::Done)];
        let result = engine().calculate_progress_with_edge_cases(&items);
        assert!(result.percentage >= 0.0 && result.percentage <= 100.0);
        assert!(result.weighted_percentage >= 0.0 && result.weighted_percentage <= 100.0);
    }
}
