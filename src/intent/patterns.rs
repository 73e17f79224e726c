//! Intent Pattern Registry
//!
//! Static table of intent patterns, keywords, and examples. Loaded once
//! at process start; the interpreter walks definitions in descending
//! priority order.

use once_cell::sync::Lazy;
use regex::Regex;

/// Classified purpose of a user's natural-language command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandIntent {
    /// Run ART / PI planning
    PlanArt,
    /// Break a story or epic into smaller items
    DecomposeStory,
    /// Map dependencies and blockers across items
    MapDependencies,
    /// Report completion status for the current scope
    CheckProgress,
    /// Analyze flow through the value stream
    AnalyzeValueStream,
    /// Produce a planning summary report
    GenerateReport,
    /// Explain available commands
    Help,
    /// No confident classification
    Unknown,
}

impl CommandIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandIntent::PlanArt => "plan_art",
            CommandIntent::DecomposeStory => "decompose_story",
            CommandIntent::MapDependencies => "map_dependencies",
            CommandIntent::CheckProgress => "check_progress",
            CommandIntent::AnalyzeValueStream => "analyze_value_stream",
            CommandIntent::GenerateReport => "generate_report",
            CommandIntent::Help => "help",
            CommandIntent::Unknown => "unknown",
        }
    }
}

/// Static pattern definition for one intent
pub struct PatternDefinition {
    pub intent: CommandIntent,
    /// Evaluation order; higher wins ties between equal confidences
    pub priority: u32,
    /// Regexes tested in order; first match within a definition wins
    pub patterns: Vec<Regex>,
    /// Keywords for the density factor and for suggestion ranking
    pub keywords: &'static [&'static str],
    /// Canonical phrasings, shown as suggestions
    pub examples: &'static [&'static str],
    /// Per-definition confidence floor (falls back to the configured minimum)
    pub min_confidence: Option<f64>,
}

fn def(
    intent: CommandIntent,
    priority: u32,
    patterns: &[&str],
    keywords: &'static [&'static str],
    examples: &'static [&'static str],
) -> PatternDefinition {
    PatternDefinition {
        intent,
        priority,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(p).expect("static intent pattern must compile"))
            .collect(),
        keywords,
        examples,
        min_confidence: None,
    }
}

/// Default pattern registry, ordered by descending priority
pub static DEFAULT_REGISTRY: Lazy<Vec<PatternDefinition>> = Lazy::new(|| {
    let mut defs = vec![
        def(
            CommandIntent::PlanArt,
            100,
            &[
                r"(?i)\bplan\b.*\b(art|pi|program increment)\b.*",
                r"(?i)\b(pi|program increment)\s+planning\b.*",
                r"(?i)\bplan\s+(the\s+)?(next\s+)?(art|increment|iteration)s?\b.*",
            ],
            &["plan", "art", "pi", "increment", "iteration"],
            &["plan art for next PI", "run PI planning", "plan the next increment"],
        ),
        def(
            CommandIntent::DecomposeStory,
            90,
            &[
                r"(?i)\b(decompose|split|break\s*(down|up))\b.*\b(story|stories|epic|feature|issue|this|it)\b.*",
                r"(?i)\b(decompose|split)\s+\S+.*",
                r"(?i)\bbreak\s+(this|it)\s+(down|up)\b.*",
            ],
            &["decompose", "split", "break", "story", "smaller"],
            &["decompose this story", "split PROJ-123 into smaller stories"],
        ),
        def(
            CommandIntent::MapDependencies,
            85,
            &[
                r"(?i)\b(map|show|find|analyze|check)\b.*\b(dependenc|blocker)\w*.*",
                r"(?i)\bdependenc(y|ies)\s+(map|graph|analysis)\b.*",
                r"(?i)\bwhat\s+(is\s+)?block(s|ing)\b.*",
            ],
            &["dependencies", "dependency", "map", "blockers", "blocked"],
            &["map dependencies for this epic", "show blockers", "what is blocking PROJ-42"],
        ),
        def(
            CommandIntent::AnalyzeValueStream,
            80,
            &[
                r"(?i)\bvalue\s*stream\b.*",
                r"(?i)\b(analyze|show)\b.*\b(flow|cycle\s*time|lead\s*time)\b.*",
            ],
            &["value", "stream", "flow", "cycle", "lead"],
            &["analyze the value stream", "show cycle time for the team"],
        ),
        def(
            CommandIntent::CheckProgress,
            75,
            &[
                r"(?i)\b(check|show|what.?s|report)\b.*\b(progress|status|completion)\b.*",
                r"(?i)\bhow\s+(far|complete|done)\b.*",
                r"(?i)\b(progress|status)\s+(of|for|on)\b.*",
            ],
            &["progress", "status", "complete", "done", "percent"],
            &["check progress for this iteration", "how far along is the epic"],
        ),
        def(
            CommandIntent::GenerateReport,
            70,
            &[
                r"(?i)\b(generate|create|produce|write)\b.*\b(report|summary)\b.*",
                r"(?i)\bsummar(y|ize)\b.*",
            ],
            &["report", "summary", "summarize", "generate"],
            &["generate a planning report", "summarize the iteration"],
        ),
        def(
            CommandIntent::Help,
            60,
            &[
                r"(?i)^help$",
                r"(?i)\b(help|usage)\b.*",
                r"(?i)\bwhat\s+can\s+you\s+do\b.*",
                r"(?i)\b(list|show)\s+(your\s+)?commands\b",
            ],
            &["help", "commands", "usage"],
            &["help", "what can you do"],
        ),
    ];

    // Descending priority, stable for ties
    defs.sort_by(|a, b| b.priority.cmp(&a.priority));
    defs
});

/// Single-token inputs treated as greetings, resolved as low-confidence help
pub static GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "yo", "hallo", "moin", "servus", "howdy", "ola", "thanks", "thx",
];
