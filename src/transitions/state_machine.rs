//! Workflow State Machine
//!
//! Legal edges between the six workspace states. The edge check is
//! structural: `force` never bypasses it.

use crate::tracker::WorkItemState;

/// States reachable from `from` in a single transition
pub fn allowed_targets(from: WorkItemState) -> &'static [WorkItemState] {
    use WorkItemState::*;
    match from {
        Backlog => &[Todo, Canceled],
        Todo => &[InProgress, Backlog, Canceled],
        InProgress => &[InReview, Todo, Canceled],
        // Reopening from Done goes back through review
        InReview => &[Done, InProgress, Canceled],
        Done => &[InReview],
        // Uncanceling restores planning states only
        Canceled => &[Backlog, Todo],
    }
}

/// Whether `from -> to` is a legal edge
pub fn is_legal_edge(from: WorkItemState, to: WorkItemState) -> bool {
    allowed_targets(from).contains(&to)
}
