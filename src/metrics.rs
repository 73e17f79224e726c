//! Behavior Health Monitoring
//!
//! Per-behavior execution counters, success rates, and duration
//! aggregates. The behavior engine forwards every outcome here so the
//! record stays complete even for declined (no-op) runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// Aggregated health for one behavior
#[derive(Debug, Clone, Default, Serialize)]
pub struct BehaviorHealth {
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    /// Declined runs recorded as successful no-ops
    pub noops: u64,
    pub total_duration_ms: u64,
    pub last_execution: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl BehaviorHealth {
    /// Success rate over real executions (no-ops excluded), 0-100
    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            return 100.0;
        }
        self.successes as f64 / self.executions as f64 * 100.0
    }

    /// Mean execution duration in milliseconds
    pub fn avg_duration_ms(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.executions as f64
    }
}

/// Fast process-wide counters plus per-behavior aggregates
pub struct BehaviorHealthMonitor {
    per_behavior: RwLock<HashMap<String, BehaviorHealth>>,
    total_executions: AtomicU64,
    total_failures: AtomicU64,
}

impl BehaviorHealthMonitor {
    pub fn new() -> Self {
        Self {
            per_behavior: RwLock::new(HashMap::new()),
            total_executions: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    /// Record a real execution outcome
    pub fn record_execution(
        &self,
        behavior_id: &str,
        success: bool,
        duration: Duration,
        error: Option<&str>,
    ) {
        self.total_executions.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut map) = self.per_behavior.write() {
            let entry = map.entry(behavior_id.to_string()).or_default();
            entry.executions += 1;
            if success {
                entry.successes += 1;
            } else {
                entry.failures += 1;
                entry.last_error = error.map(String::from);
            }
            entry.total_duration_ms += duration.as_millis() as u64;
            entry.last_execution = Some(Utc::now());
        }

        debug!(
            "Behavior {} recorded: success={}, duration={}ms",
            behavior_id,
            success,
            duration.as_millis()
        );
    }

    /// Record a declined run so metrics stay complete
    pub fn record_noop(&self, behavior_id: &str) {
        if let Ok(mut map) = self.per_behavior.write() {
            let entry = map.entry(behavior_id.to_string()).or_default();
            entry.noops += 1;
        }
    }

    /// Health snapshot for one behavior
    pub fn health(&self, behavior_id: &str) -> Option<BehaviorHealth> {
        self.per_behavior.read().ok()?.get(behavior_id).cloned()
    }

    /// Health snapshots for all behaviors seen so far
    pub fn all_health(&self) -> HashMap<String, BehaviorHealth> {
        self.per_behavior.read().map(|m| m.clone()).unwrap_or_default()
    }

    /// Process-wide counters
    pub fn totals(&self) -> (u64, u64) {
        (
            self.total_executions.load(Ordering::Relaxed),
            self.total_failures.load(Ordering::Relaxed),
        )
    }
}

impl Default for BehaviorHealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}
