//! Tracking-System Client Interface
//!
//! Universal interface to the external project-tracking workspace.
//! The agent core never talks HTTP itself; a transport adapter implements
//! [`TrackerClient`] and surfaces failures as [`TrackerError`] so the
//! recovery layer can classify them.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error types for tracking-system operations
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Tracker error: {0}")]
    Other(String),
}

impl TrackerError {
    /// HTTP-ish status code, when one applies
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::RateLimited { .. } => Some(429),
            TrackerError::Unauthorized(_) => Some(401),
            TrackerError::InvalidRequest(_) => Some(400),
            TrackerError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided retry-after hint in seconds
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            TrackerError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Work item states in the tracking workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkItemState {
    Backlog,
    Todo,
    #[serde(alias = "In Progress")]
    InProgress,
    #[serde(alias = "In Review")]
    InReview,
    Done,
    Canceled,
}

impl WorkItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemState::Backlog => "Backlog",
            WorkItemState::Todo => "Todo",
            WorkItemState::InProgress => "In Progress",
            WorkItemState::InReview => "In Review",
            WorkItemState::Done => "Done",
            WorkItemState::Canceled => "Canceled",
        }
    }

    /// Parse a workspace state name (case-insensitive, tolerant of spacing)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace([' ', '_', '-'], "").as_str() {
            "backlog" => Some(WorkItemState::Backlog),
            "todo" => Some(WorkItemState::Todo),
            "inprogress" | "started" => Some(WorkItemState::InProgress),
            "inreview" | "review" => Some(WorkItemState::InReview),
            "done" | "completed" => Some(WorkItemState::Done),
            "canceled" | "cancelled" => Some(WorkItemState::Canceled),
            _ => None,
        }
    }

    /// Terminal states count as finished for dependency and sibling checks
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkItemState::Done | WorkItemState::Canceled)
    }

    /// States that represent in-flight work
    pub fn is_active(&self) -> bool {
        matches!(self, WorkItemState::InProgress | WorkItemState::InReview)
    }
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Work item kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkItemType {
    Story,
    Enabler,
    Epic,
    Feature,
}

impl WorkItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemType::Story => "Story",
            WorkItemType::Enabler => "Enabler",
            WorkItemType::Epic => "Epic",
            WorkItemType::Feature => "Feature",
        }
    }

    /// Container items aggregate children rather than carry points themselves
    pub fn is_container(&self) -> bool {
        matches!(self, WorkItemType::Epic | WorkItemType::Feature)
    }
}

/// Read-only snapshot of the work item a request is about.
///
/// Owned by the caller for the lifetime of one request; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueContext {
    pub issue_id: String,
    pub team_id: Option<String>,
    pub title: Option<String>,
    pub labels: Vec<String>,
    pub estimate: Option<f64>,
    pub assignee: Option<String>,
    pub state: Option<WorkItemState>,
}

impl IssueContext {
    /// Minimal context carrying only the item id
    pub fn for_issue(issue_id: &str) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            team_id: None,
            title: None,
            labels: Vec::new(),
            estimate: None,
            assignee: None,
            state: None,
        }
    }
}

/// A team in the tracking workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub key: String,
    pub name: String,
}

/// Relation kinds between work items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    Parent,
    Child,
    DependsOn,
    BlockedBy,
    Subtask,
}

/// An edge in the work-item relationship graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRelation {
    pub from_id: String,
    pub to_id: String,
    pub kind: RelationKind,
}

/// Filter for relation queries
#[derive(Debug, Clone, Default)]
pub struct RelationFilter {
    pub issue_id: Option<String>,
    pub kind: Option<RelationKind>,
}

/// Tracking-system client - implement for each workspace backend
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Fetch a single issue snapshot
    async fn get_issue(&self, id: &str) -> Result<IssueContext, TrackerError>;

    /// List teams in the workspace
    async fn get_teams(&self) -> Result<Vec<Team>, TrackerError>;

    /// Query the relationship graph
    async fn get_issue_relations(
        &self,
        filter: &RelationFilter,
    ) -> Result<Vec<IssueRelation>, TrackerError>;

    /// Post a new comment on an issue, returning the comment id
    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<String, TrackerError>;

    /// Replace the body of an existing comment
    async fn update_comment(&self, comment_id: &str, body: &str) -> Result<(), TrackerError>;

    /// Move an issue to a new workflow state
    async fn update_issue_state(
        &self,
        issue_id: &str,
        state: WorkItemState,
    ) -> Result<(), TrackerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse() {
        assert_eq!(WorkItemState::parse("In Progress"), Some(WorkItemState::InProgress));
        assert_eq!(WorkItemState::parse("in_progress"), Some(WorkItemState::InProgress));
        assert_eq!(WorkItemState::parse("DONE"), Some(WorkItemState::Done));
        assert_eq!(WorkItemState::parse("cancelled"), Some(WorkItemState::Canceled));
        assert_eq!(WorkItemState::parse("shipped"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkItemState::Done.is_terminal());
        assert!(WorkItemState::Canceled.is_terminal());
        assert!(!WorkItemState::InReview.is_terminal());
    }

    #[test]
    fn test_error_status_codes() {
        let err = TrackerError::RateLimited { retry_after_secs: 5 };
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.retry_after_secs(), Some(5));

        let err = TrackerError::Server { status: 502, message: "bad gateway".into() };
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.retry_after_secs(), None);
    }
}
