//! Configuration management
//!
//! One validated [`AgentConfig`] covers all four decision components:
//! interpreter scoring, automation budgets, transition policy, progress
//! calculation, and integration retry. Consumers read through a shared
//! [`ConfigHandle`] snapshot; updates replace the whole config after
//! validation so an in-flight calculation never sees a partial update.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("progress warning threshold ({warning}) must exceed critical threshold ({critical})")]
    ThresholdOrder { warning: f64, critical: f64 },

    #[error("max utilization ({max}) must exceed min utilization ({min})")]
    UtilizationOrder { min: f64, max: f64 },

    #[error("retry attempts must be at least 1")]
    NoAttempts,

    #[error("max backoff ({max_delay_ms}ms) must cover the webhook delay tolerance ({tolerance_ms}ms)")]
    BackoffTooShort { max_delay_ms: u64, tolerance_ms: u64 },

    #[error("scoring weights must be non-negative and sum to a positive value")]
    BadWeights,
}

/// Command interpreter tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Minimum confidence before a match is accepted as a real intent
    pub min_confidence: f64,
    /// Linear weights for the four confidence factors
    pub pattern_weight: f64,
    pub keyword_weight: f64,
    pub structure_weight: f64,
    pub context_weight: f64,
    /// Mention token stripped during normalization
    pub mention_token: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.8,
            pattern_weight: 0.4,
            keyword_weight: 0.3,
            structure_weight: 0.2,
            context_weight: 0.1,
            mention_token: "@planbot".to_string(),
        }
    }
}

/// Autonomous behavior budgets and per-behavior switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Global execution budget per sliding minute, across all behaviors
    pub max_executions_per_minute: u32,
    /// Global execution budget per sliding hour, across all behaviors
    pub max_executions_per_hour: u32,
    /// Behavior ids disabled by configuration (overrides `enabled()`)
    pub disabled_behaviors: HashSet<String>,
    /// Estimate above which a story is flagged for decomposition
    pub max_story_points: f64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_executions_per_minute: 10,
            max_executions_per_hour: 100,
            disabled_behaviors: HashSet::new(),
            max_story_points: 8.0,
        }
    }
}

/// Workflow business-rule switches for state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionPolicy {
    /// Moving to Done requires all dependencies Done/Canceled
    pub require_dependency_completion: bool,
    /// An Epic may complete while children are still open
    pub allow_partial_epic_completion: bool,
    /// An item may complete while subtasks are still open
    pub allow_incomplete_subtasks: bool,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            require_dependency_completion: true,
            allow_partial_epic_completion: false,
            allow_incomplete_subtasks: false,
        }
    }
}

/// Strategy for the weighted completion percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProgressStrategy {
    /// Completed points / total points
    #[default]
    Simple,
    /// Squared point weights bias the ratio toward larger items
    Weighted,
    /// Completed Epics+Features / total Epics+Features, points ignored
    Milestone,
}

/// Alert thresholds for progress monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Percentage below this raises a warning alert
    pub progress_warning: f64,
    /// Percentage below this raises a critical alert
    pub progress_critical: f64,
    /// Capacity utilization bounds (in-progress points / active points)
    pub utilization_min: f64,
    pub utilization_max: f64,
    /// Allowed divergence between plain and weighted percentage
    pub variance_threshold: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            progress_warning: 70.0,
            progress_critical: 50.0,
            utilization_min: 0.2,
            utilization_max: 0.8,
            variance_threshold: 15.0,
        }
    }
}

/// Progress calculation weights and edge-case switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Weight assigned to zero-point stories instead of excluding them
    pub zero_point_story_weight: f64,
    /// Multiplier applied to enabler-type items
    pub enabler_story_multiplier: f64,
    /// Include items moved in from another iteration; excluded items
    /// keep a zero weight so reporting stays complete
    pub include_moved_items: bool,
    /// Weighted-percentage strategy
    pub strategy: ProgressStrategy,
    pub thresholds: AlertThresholds,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            zero_point_story_weight: 1.0,
            enabler_story_multiplier: 1.2,
            include_moved_items: true,
            strategy: ProgressStrategy::Simple,
            thresholds: AlertThresholds::default(),
        }
    }
}

/// Integration retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt budget including the first try
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay_ms: u64,
    /// Cap applied to backoff and to server retry-after hints
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
    /// Delivery delay the webhook transport tolerates before redelivery
    pub webhook_delay_tolerance_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            webhook_delay_tolerance_ms: 5_000,
        }
    }
}

/// Process-wide agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub interpreter: InterpreterConfig,
    pub automation: AutomationConfig,
    pub transitions: TransitionPolicy,
    pub progress: ProgressConfig,
    pub retry: RetryConfig,
    /// Hard wall-clock timeout for command execution
    pub command_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interpreter: InterpreterConfig::default(),
            automation: AutomationConfig::default(),
            transitions: TransitionPolicy::default(),
            progress: ProgressConfig::default(),
            retry: RetryConfig::default(),
            command_timeout_secs: 60,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(v) = env_f64("PLANBOT_MIN_CONFIDENCE") {
            config.interpreter.min_confidence = v;
        }
        if let Ok(v) = std::env::var("PLANBOT_MENTION_TOKEN") {
            config.interpreter.mention_token = v;
        }
        if let Some(v) = env_u32("PLANBOT_MAX_EXECUTIONS_PER_MINUTE") {
            config.automation.max_executions_per_minute = v;
        }
        if let Some(v) = env_u32("PLANBOT_MAX_EXECUTIONS_PER_HOUR") {
            config.automation.max_executions_per_hour = v;
        }
        if let Ok(v) = std::env::var("PLANBOT_DISABLED_BEHAVIORS") {
            config.automation.disabled_behaviors =
                v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Some(v) = env_f64("PLANBOT_MAX_STORY_POINTS") {
            config.automation.max_story_points = v;
        }
        if let Some(v) = env_bool("PLANBOT_REQUIRE_DEPENDENCY_COMPLETION") {
            config.transitions.require_dependency_completion = v;
        }
        if let Some(v) = env_bool("PLANBOT_ALLOW_PARTIAL_EPIC_COMPLETION") {
            config.transitions.allow_partial_epic_completion = v;
        }
        if let Some(v) = env_bool("PLANBOT_ALLOW_INCOMPLETE_SUBTASKS") {
            config.transitions.allow_incomplete_subtasks = v;
        }
        if let Some(v) = env_f64("PLANBOT_PROGRESS_WARNING") {
            config.progress.thresholds.progress_warning = v;
        }
        if let Some(v) = env_f64("PLANBOT_PROGRESS_CRITICAL") {
            config.progress.thresholds.progress_critical = v;
        }
        if let Ok(v) = std::env::var("PLANBOT_PROGRESS_STRATEGY") {
            config.progress.strategy = match v.to_lowercase().as_str() {
                "weighted" => ProgressStrategy::Weighted,
                "milestone" => ProgressStrategy::Milestone,
                _ => ProgressStrategy::Simple,
            };
        }
        if let Some(v) = env_u32("PLANBOT_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = v;
        }
        if let Some(v) = env_u64("PLANBOT_RETRY_MAX_DELAY_MS") {
            config.retry.max_delay_ms = v;
        }
        if let Some(v) = env_u64("PLANBOT_COMMAND_TIMEOUT_SECS") {
            config.command_timeout_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency; an invalid config is rejected at the
    /// boundary, never absorbed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.progress.thresholds;
        if t.progress_warning <= t.progress_critical {
            return Err(ConfigError::ThresholdOrder {
                warning: t.progress_warning,
                critical: t.progress_critical,
            });
        }
        if t.utilization_max <= t.utilization_min {
            return Err(ConfigError::UtilizationOrder {
                min: t.utilization_min,
                max: t.utilization_max,
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.retry.max_delay_ms < self.retry.webhook_delay_tolerance_ms {
            return Err(ConfigError::BackoffTooShort {
                max_delay_ms: self.retry.max_delay_ms,
                tolerance_ms: self.retry.webhook_delay_tolerance_ms,
            });
        }
        let i = &self.interpreter;
        let weights = [i.pattern_weight, i.keyword_weight, i.structure_weight, i.context_weight];
        if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::BadWeights);
        }
        Ok(())
    }
}

/// Shared copy-on-write configuration handle.
///
/// `snapshot()` hands out an `Arc` to the current config; `replace()`
/// swaps the whole snapshot after validation. Readers mid-calculation
/// keep their consistent snapshot.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<AgentConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { inner: Arc::new(RwLock::new(Arc::new(config))) })
    }

    /// Current consistent snapshot
    pub fn snapshot(&self) -> Arc<AgentConfig> {
        self.inner.read().clone()
    }

    /// Replace the entire configuration; rejects invalid configs
    pub fn replace(&self, config: AgentConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.inner.write() = Arc::new(config);
        info!("Agent configuration replaced");
        Ok(())
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(AgentConfig::default()).expect("default config is valid")
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| v == "true" || v == "1")
}
