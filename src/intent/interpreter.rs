//! Command Interpreter
//!
//! Turns noisy free-text mentions into a confidence-scored
//! [`ParsedIntent`]. Parsing never fails the caller: anything the
//! interpreter cannot place above the configured confidence floor
//! degrades to [`CommandIntent::Unknown`] plus ranked suggestions.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{ConfigHandle, InterpreterConfig};
use crate::intent::patterns::{
    CommandIntent, PatternDefinition, DEFAULT_REGISTRY, GREETINGS,
};
use crate::tracker::IssueContext;

/// Confidence at which evaluation stops early; no better candidate is
/// assumed to exist past this point
pub const EARLY_EXIT_CONFIDENCE: f64 = 0.95;

const IMPERATIVE_VERBS: &[&str] = &[
    "plan", "decompose", "split", "break", "map", "show", "check", "analyze",
    "generate", "create", "run", "help", "report", "find", "list", "summarize",
];

const PLANNING_VOCAB: &[&str] = &[
    "story", "stories", "epic", "epics", "feature", "features", "art", "pi",
    "sprint", "iteration", "increment", "dependency", "dependencies",
    "blocker", "blockers", "backlog", "team", "points",
];

/// The four independent confidence factors, each in [0, 1].
///
/// Kept as a plain struct so the weighting can be tuned without touching
/// the matching logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFactors {
    pub pattern_match: f64,
    pub keyword_density: f64,
    pub command_structure: f64,
    pub context_relevance: f64,
}

impl ConfidenceFactors {
    /// Combine the factors via the configured linear weighting
    pub fn combine(&self, config: &InterpreterConfig) -> f64 {
        let score = self.pattern_match * config.pattern_weight
            + self.keyword_density * config.keyword_weight
            + self.command_structure * config.structure_weight
            + self.context_relevance * config.context_weight;
        score.clamp(0.0, 1.0)
    }
}

/// Ranked alternative offered when classification falls below threshold
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub intent: CommandIntent,
    pub example: String,
    pub score: f64,
}

/// One classified inbound text; immutable after construction
#[derive(Debug, Clone)]
pub struct ParsedIntent {
    pub intent: CommandIntent,
    pub confidence: f64,
    pub raw_text: String,
    pub normalized_text: String,
    /// Source regex of the winning match, if any
    pub matched_pattern: Option<String>,
    pub issue_context: Option<IssueContext>,
    pub timestamp: DateTime<Utc>,
    /// Typed parameters filled in by the parameter extractor
    pub parameters: HashMap<String, String>,
    /// Alternatives offered on an unknown command
    pub suggestions: Vec<Suggestion>,
    /// Factor breakdown of the winning match
    pub factors: Option<ConfidenceFactors>,
    /// Diagnostics: warnings, evaluation counts, fallback reasons
    pub metadata: HashMap<String, String>,
}

/// Natural-language command interpreter
pub struct CommandInterpreter {
    config: ConfigHandle,
    registry: &'static [PatternDefinition],
}

impl CommandInterpreter {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config, registry: &DEFAULT_REGISTRY }
    }

    /// Use a custom pattern registry (instrumentation and tests)
    pub fn with_registry(config: ConfigHandle, registry: &'static [PatternDefinition]) -> Self {
        Self { config, registry }
    }

    /// Classify text into an intent. Never fails: internal errors degrade
    /// to `Unknown` with confidence 0 and a warning in the metadata.
    pub fn parse(&self, text: &str, context: Option<IssueContext>) -> ParsedIntent {
        match self.classify(text, context.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Intent classification failed internally: {}", e);
                let mut metadata = HashMap::new();
                metadata.insert("warning".to_string(), e.to_string());
                ParsedIntent {
                    intent: CommandIntent::Unknown,
                    confidence: 0.0,
                    raw_text: text.to_string(),
                    normalized_text: String::new(),
                    matched_pattern: None,
                    issue_context: context,
                    timestamp: Utc::now(),
                    parameters: HashMap::new(),
                    suggestions: Vec::new(),
                    factors: None,
                    metadata,
                }
            }
        }
    }

    fn classify(&self, text: &str, context: Option<IssueContext>) -> Result<ParsedIntent> {
        let config = self.config.snapshot();
        let normalized = normalize(text, &config.interpreter.mention_token);

        let mut best: Option<(f64, &PatternDefinition, String, ConfidenceFactors)> = None;
        let mut evaluated = 0usize;

        'definitions: for definition in self.registry {
            evaluated += 1;
            for pattern in &definition.patterns {
                let Some(m) = pattern.find(&normalized) else { continue };

                let factors = ConfidenceFactors {
                    pattern_match: pattern_match_score(m.len(), &normalized),
                    keyword_density: keyword_density(definition.keywords, &normalized),
                    command_structure: command_structure_score(&normalized),
                    context_relevance: context_relevance(
                        definition.intent,
                        context.as_ref(),
                        config.automation.max_story_points,
                    ),
                };
                let confidence = factors.combine(&config.interpreter);

                debug!(
                    "Pattern {} scored {:.3} on {:?}",
                    definition.intent.as_str(),
                    confidence,
                    normalized
                );

                if best.as_ref().map(|(c, ..)| confidence > *c).unwrap_or(true) {
                    best = Some((confidence, definition, pattern.as_str().to_string(), factors));
                }

                if confidence >= EARLY_EXIT_CONFIDENCE {
                    break 'definitions;
                }
                // First regex match within a definition decides for it
                continue 'definitions;
            }
        }

        let mut metadata = HashMap::new();
        metadata.insert("definitions_evaluated".to_string(), evaluated.to_string());

        if let Some((confidence, definition, pattern, factors)) = best {
            let floor = definition.min_confidence.unwrap_or(config.interpreter.min_confidence);
            if confidence >= floor {
                return Ok(ParsedIntent {
                    intent: definition.intent,
                    confidence,
                    raw_text: text.to_string(),
                    normalized_text: normalized,
                    matched_pattern: Some(pattern),
                    issue_context: context,
                    timestamp: Utc::now(),
                    parameters: HashMap::new(),
                    suggestions: Vec::new(),
                    factors: Some(factors),
                    metadata,
                });
            }
            metadata.insert("best_candidate".to_string(), definition.intent.as_str().to_string());
            metadata.insert("best_confidence".to_string(), format!("{:.3}", confidence));
            metadata.insert("reason".to_string(), "below_min_confidence".to_string());
        } else {
            metadata.insert("reason".to_string(), "no_pattern_match".to_string());
        }

        Ok(self.unknown_fallback(text, normalized, context, metadata))
    }

    /// Unknown-command path: greeting special case, then ranked suggestions
    fn unknown_fallback(
        &self,
        raw: &str,
        normalized: String,
        context: Option<IssueContext>,
        mut metadata: HashMap<String, String>,
    ) -> ParsedIntent {
        let tokens: Vec<&str> = normalized.split_whitespace().collect();

        // A bare greeting resolves as low-confidence help, not a failure
        if tokens.len() == 1 && GREETINGS.contains(&tokens[0]) {
            metadata.insert("reason".to_string(), "greeting".to_string());
            return ParsedIntent {
                intent: CommandIntent::Help,
                confidence: 0.5,
                raw_text: raw.to_string(),
                normalized_text: normalized,
                matched_pattern: None,
                issue_context: context,
                timestamp: Utc::now(),
                parameters: HashMap::new(),
                suggestions: Vec::new(),
                factors: None,
                metadata,
            };
        }

        let suggestions = rank_suggestions(&normalized, self.registry);
        ParsedIntent {
            intent: CommandIntent::Unknown,
            confidence: 0.0,
            raw_text: raw.to_string(),
            normalized_text: normalized,
            matched_pattern: None,
            issue_context: context,
            timestamp: Utc::now(),
            parameters: HashMap::new(),
            suggestions,
            factors: None,
            metadata,
        }
    }
}

/// Normalize inbound text: lowercase, strip the agent's mention token,
/// collapse whitespace, trim edge punctuation while preserving quotes
pub fn normalize(text: &str, mention_token: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = lower.replace(&mention_token.to_lowercase(), " ");

    let collapsed: Vec<&str> = stripped.split_whitespace().collect();
    let joined = collapsed.join(" ");

    joined
        .trim_matches(|c: char| {
            (c.is_ascii_punctuation() && c != '"' && c != '\'') || c.is_whitespace()
        })
        .to_string()
}

/// Matched-substring coverage of the full text, with a flat bonus for an
/// exact full-string match
fn pattern_match_score(match_len: usize, text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let coverage = match_len as f64 / text.len() as f64;
    let bonus = if match_len == text.len() { 0.25 } else { 0.0 };
    (coverage + bonus).clamp(0.0, 1.0)
}

/// Fraction of declared keywords found as substrings of any token,
/// floored at 0.6 once at least one keyword is present
fn keyword_density(keywords: &[&str], text: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let found = keywords
        .iter()
        .filter(|kw| tokens.iter().any(|t| t.contains(*kw)))
        .count();
    if found == 0 {
        return 0.0;
    }
    (found as f64 / keywords.len() as f64).max(0.6)
}

/// Heuristic score for imperative command shape
fn command_structure_score(text: &str) -> f64 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut score = 0.0;

    if tokens.first().map(|t| IMPERATIVE_VERBS.contains(t)).unwrap_or(false) {
        score += 0.4;
    }
    if tokens.len() == 1 || (2..=10).contains(&tokens.len()) {
        score += 0.3;
    }
    if tokens.iter().any(|t| PLANNING_VOCAB.contains(t)) {
        score += 0.3;
    }
    score
}

/// Heuristic bonus from the triggering item, by intent type.
/// Neutral 0.5 without context.
fn context_relevance(
    intent: CommandIntent,
    context: Option<&IssueContext>,
    max_story_points: f64,
) -> f64 {
    let Some(ctx) = context else { return 0.5 };

    match intent {
        CommandIntent::DecomposeStory => match ctx.estimate {
            Some(points) if points > max_story_points => 1.0,
            Some(_) => 0.4,
            None => 0.5,
        },
        CommandIntent::MapDependencies => {
            let blocked = ctx.labels.iter().any(|l| l.to_lowercase().contains("blocked"));
            if blocked || ctx.state.map(|s| s.is_active()).unwrap_or(false) {
                0.8
            } else {
                0.6
            }
        }
        CommandIntent::PlanArt => {
            if ctx.team_id.is_some() {
                0.8
            } else {
                0.6
            }
        }
        CommandIntent::CheckProgress | CommandIntent::GenerateReport => {
            if ctx.state.is_some() {
                0.8
            } else {
                0.6
            }
        }
        _ => 0.5,
    }
}

/// Generate up to 3 ranked suggestions by keyword/example overlap
fn rank_suggestions(text: &str, registry: &[PatternDefinition]) -> Vec<Suggestion> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<Suggestion> = registry
        .iter()
        .filter_map(|d| {
            let kw_overlap = d
                .keywords
                .iter()
                .filter(|kw| tokens.iter().any(|t| t.contains(*kw)))
                .count() as f64
                / d.keywords.len() as f64;

            let example_overlap = d
                .examples
                .iter()
                .map(|ex| {
                    let ex_tokens: Vec<String> =
                        ex.to_lowercase().split_whitespace().map(String::from).collect();
                    if ex_tokens.is_empty() {
                        return 0.0;
                    }
                    let shared = ex_tokens
                        .iter()
                        .filter(|et| tokens.contains(&et.as_str()))
                        .count();
                    shared as f64 / ex_tokens.len() as f64
                })
                .fold(0.0, f64::max);

            let score = kw_overlap * 0.6 + example_overlap * 0.4;
            if score > 0.0 {
                Some(Suggestion {
                    intent: d.intent,
                    example: d.examples.first().map(|e| e.to_string()).unwrap_or_default(),
                    score,
                })
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(3);
    scored
}
