//! Parameter Extraction & Validation
//!
//! Enriches a [`ParsedIntent`] with typed parameters pulled from the
//! normalized text, validated against domain data supplied by the
//! tracking system (teams, the triggering issue). Invalid parameters are
//! reported as structured findings, never thrown.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::intent::interpreter::ParsedIntent;
use crate::intent::patterns::CommandIntent;
use crate::tracker::Team;

static ISSUE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-z]{2,6}-\d+)\b").expect("issue ref pattern"));

static TEAM_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:for\s+)?team\s+([a-z0-9][a-z0-9 _-]*?)(?:\s+(?:in|for|on|by)\b|$)").expect("team ref pattern"));

static HORIZON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(next|current|this|\d+)\s+(pi|program increment|iteration|sprint)s?\b").expect("horizon pattern"));

static POINTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+(?:\.\d+)?)\s*(?:points?|pts)\b").expect("points pattern"));

/// A single parameter finding (missing, unknown, out of range)
#[derive(Debug, Clone)]
pub struct ParamIssue {
    pub field: String,
    pub message: String,
}

impl ParamIssue {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self { field: field.to_string(), message: message.into() }
    }
}

/// Extracts typed parameters and validates them against workspace data
pub struct ParameterExtractor;

impl ParameterExtractor {
    /// Fill `intent.parameters` from the normalized text and report any
    /// validation findings. The intent itself is never downgraded here.
    pub fn enrich(intent: &mut ParsedIntent, teams: &[Team]) -> Vec<ParamIssue> {
        let mut issues = Vec::new();
        let text = intent.normalized_text.clone();

        if let Some(m) = ISSUE_REF.captures(&text) {
            intent
                .parameters
                .insert("issue_ref".to_string(), m[1].to_uppercase());
        }

        if let Some(m) = TEAM_REF.captures(&text) {
            let name = m[1].trim().to_string();
            match resolve_team(&name, teams) {
                Some(team) => {
                    intent.parameters.insert("team_id".to_string(), team.id.clone());
                    intent.parameters.insert("team_key".to_string(), team.key.clone());
                }
                None => issues.push(ParamIssue::new(
                    "team",
                    format!("unknown team {:?}", name),
                )),
            }
        }

        if let Some(m) = HORIZON.captures(&text) {
            let count = match &m[1] {
                "next" => "1".to_string(),
                "current" | "this" => "0".to_string(),
                n => n.to_string(),
            };
            intent.parameters.insert("horizon".to_string(), count);
            intent.parameters.insert("horizon_unit".to_string(), m[2].to_string());
        }

        if let Some(m) = POINTS.captures(&text) {
            match m[1].parse::<f64>() {
                Ok(points) if points > 0.0 => {
                    intent.parameters.insert("points".to_string(), m[1].to_string());
                }
                _ => issues.push(ParamIssue::new("points", "point value must be positive")),
            }
        }

        // Intent-specific requirements
        match intent.intent {
            CommandIntent::DecomposeStory => {
                let has_target = intent.parameters.contains_key("issue_ref")
                    || intent.issue_context.is_some();
                if !has_target {
                    issues.push(ParamIssue::new(
                        "issue",
                        "no issue referenced and no triggering issue in context",
                    ));
                } else if !intent.parameters.contains_key("issue_ref") {
                    if let Some(ctx) = &intent.issue_context {
                        intent
                            .parameters
                            .insert("issue_ref".to_string(), ctx.issue_id.clone());
                    }
                }
            }
            CommandIntent::PlanArt => {
                if !intent.parameters.contains_key("team_id") {
                    if let Some(team_id) =
                        intent.issue_context.as_ref().and_then(|c| c.team_id.clone())
                    {
                        intent.parameters.insert("team_id".to_string(), team_id);
                    }
                }
            }
            _ => {}
        }

        if !issues.is_empty() {
            debug!(
                "Parameter validation found {} issue(s) for {}",
                issues.len(),
                intent.intent.as_str()
            );
        }
        issues
    }
}

/// Case-insensitive lookup by team key or name
fn resolve_team<'a>(name: &str, teams: &'a [Team]) -> Option<&'a Team> {
    let lower = name.to_lowercase();
    teams
        .iter()
        .find(|t| t.key.to_lowercase() == lower || t.name.to_lowercase() == lower)
}
