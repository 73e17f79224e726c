//! Webhook Payload Handling
//!
//! The transport delivers `{type, action, data, createdAt}` payloads;
//! this module's job ends at constructing a [`BehaviorTrigger`] and an
//! optional issue snapshot from them. HTTP status mapping stays with the
//! transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::behavior::traits::{BehaviorTrigger, TriggerType};
use crate::tracker::{IssueContext, WorkItemState};

/// Raw webhook payload as delivered by the transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub action: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl WebhookPayload {
    /// Actions the agent reacts to; anything else is dropped upstream
    pub fn is_actionable(&self) -> bool {
        matches!(self.action.as_str(), "create" | "update" | "remove")
    }

    /// Build the trigger handed to the behavior engine
    pub fn into_trigger(self) -> BehaviorTrigger {
        BehaviorTrigger::new(
            TriggerType::Webhook,
            serde_json::json!({
                "type": self.event_type,
                "action": self.action,
                "data": self.data,
            }),
        )
    }
}

/// Extract an issue snapshot from a trigger payload, when one is present
pub fn issue_from_payload(payload: &Value) -> Option<IssueContext> {
    let data = payload.get("data")?;
    let issue_id = data
        .get("identifier")
        .or_else(|| data.get("id"))
        .and_then(Value::as_str)?
        .to_string();

    let labels = data
        .get("labels")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|l| {
                    l.as_str()
                        .map(String::from)
                        .or_else(|| l.get("name").and_then(Value::as_str).map(String::from))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(IssueContext {
        issue_id,
        team_id: data
            .get("team")
            .and_then(|t| t.get("id"))
            .and_then(Value::as_str)
            .map(String::from),
        title: data.get("title").and_then(Value::as_str).map(String::from),
        labels,
        estimate: data.get("estimate").and_then(Value::as_f64),
        assignee: data
            .get("assignee")
            .and_then(|a| a.get("id").or_else(|| a.get("name")))
            .and_then(Value::as_str)
            .map(String::from),
        state: data
            .get("state")
            .and_then(|s| s.as_str().map(String::from).or_else(|| {
                s.get("name").and_then(Value::as_str).map(String::from)
            }))
            .and_then(|name| WorkItemState::parse(&name)),
    })
}
