//! Integration Error Handling
//!
//! Wraps calls into the external tracking system with classification,
//! retry/backoff, and concurrency-control policy. Rate-limit errors
//! honor the server's retry-after hint; other retryable errors use
//! exponential backoff with jitter. `unauthorized` and `invalid-request`
//! are never retried.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::config::{ConfigHandle, RetryConfig};
use crate::tracker::TrackerError;

/// Classification of an integration failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationErrorKind {
    RateLimit,
    Network,
    Timeout,
    Unauthorized,
    InvalidRequest,
    ServerError,
    Unknown,
}

impl IntegrationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationErrorKind::RateLimit => "rate_limit",
            IntegrationErrorKind::Network => "network",
            IntegrationErrorKind::Timeout => "timeout",
            IntegrationErrorKind::Unauthorized => "unauthorized",
            IntegrationErrorKind::InvalidRequest => "invalid_request",
            IntegrationErrorKind::ServerError => "server_error",
            IntegrationErrorKind::Unknown => "unknown",
        }
    }

    /// Whether a retry can help
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            IntegrationErrorKind::Unauthorized | IntegrationErrorKind::InvalidRequest
        )
    }
}

/// Classified integration error
#[derive(Debug, Clone)]
pub struct IntegrationError {
    pub kind: IntegrationErrorKind,
    pub message: String,
    pub status: Option<u16>,
    /// Server-provided retry-after, when one was supplied
    pub retry_after: Option<Duration>,
}

impl IntegrationError {
    /// Classify from status codes, error codes, and message content
    pub fn classify(message: &str, status: Option<u16>) -> Self {
        let lower = message.to_lowercase();

        let kind = match status {
            Some(429) => IntegrationErrorKind::RateLimit,
            Some(401) | Some(403) => IntegrationErrorKind::Unauthorized,
            Some(s) if (400..500).contains(&s) => IntegrationErrorKind::InvalidRequest,
            Some(s) if s >= 500 => IntegrationErrorKind::ServerError,
            _ if lower.contains("rate limit") || lower.contains("too many requests") => {
                IntegrationErrorKind::RateLimit
            }
            _ if lower.contains("timeout") || lower.contains("timed out") => {
                IntegrationErrorKind::Timeout
            }
            _ if lower.contains("connection") || lower.contains("network") || lower.contains("dns") => {
                IntegrationErrorKind::Network
            }
            _ if lower.contains("unauthorized") || lower.contains("forbidden") => {
                IntegrationErrorKind::Unauthorized
            }
            _ if lower.contains("invalid") || lower.contains("bad request") => {
                IntegrationErrorKind::InvalidRequest
            }
            _ if lower.contains("internal") || lower.contains("server error") => {
                IntegrationErrorKind::ServerError
            }
            _ => IntegrationErrorKind::Unknown,
        };

        Self { kind, message: message.to_string(), status, retry_after: None }
    }

    fn conflict(key: &str) -> Self {
        Self {
            kind: IntegrationErrorKind::InvalidRequest,
            message: format!("operation for {key} already in flight"),
            status: Some(409),
            retry_after: None,
        }
    }
}

impl From<TrackerError> for IntegrationError {
    fn from(err: TrackerError) -> Self {
        let status = err.status();
        let retry_after = err.retry_after_secs().map(Duration::from_secs);
        let kind = match &err {
            TrackerError::RateLimited { .. } => IntegrationErrorKind::RateLimit,
            TrackerError::Network(_) => IntegrationErrorKind::Network,
            TrackerError::Timeout(_) => IntegrationErrorKind::Timeout,
            TrackerError::Unauthorized(_) => IntegrationErrorKind::Unauthorized,
            TrackerError::InvalidRequest(_) => IntegrationErrorKind::InvalidRequest,
            TrackerError::Server { .. } => IntegrationErrorKind::ServerError,
            TrackerError::Other(message) => {
                return Self { retry_after, ..Self::classify(message, status) };
            }
        };
        Self { kind, message: err.to_string(), status, retry_after }
    }
}

impl fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for IntegrationError {}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct RetryResult<T> {
    pub value: Option<T>,
    pub error: Option<IntegrationError>,
    /// Attempts actually made, including the first try
    pub attempts: u32,
    /// Cumulative time spent waiting between attempts
    pub total_delay: Duration,
}

impl<T> RetryResult<T> {
    pub fn success(&self) -> bool {
        self.value.is_some()
    }

    pub fn into_result(self) -> Result<T, IntegrationError> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(self.error.unwrap_or_else(|| {
                IntegrationError::classify("retry exhausted without error detail", None)
            })),
        }
    }
}

/// Concurrency policy for operations sharing a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// Wait for the in-flight operation, then re-run for fresh data
    Merge,
    /// Drop the in-flight operation's tracking; the new one proceeds
    Latest,
    /// Reject the new request while one is in flight
    Conflict,
}

struct InFlight {
    token: u64,
    done: std::sync::Arc<Notify>,
}

/// Retry and concurrency control around tracker calls
pub struct IntegrationErrorHandler {
    config: ConfigHandle,
    in_flight: Mutex<HashMap<String, InFlight>>,
    token_counter: AtomicU64,
}

impl IntegrationErrorHandler {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            in_flight: Mutex::new(HashMap::new()),
            token_counter: AtomicU64::new(0),
        }
    }

    /// Run an operation with classification-aware retries.
    ///
    /// `context` names the operation for logging only.
    pub async fn execute_with_retry<T, F, Fut>(&self, context: &str, mut op: F) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TrackerError>>,
    {
        let retry = self.config.snapshot().retry.clone();
        let mut attempts = 0u32;
        let mut total_delay = Duration::ZERO;

        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("{} succeeded on attempt {}", context, attempts);
                    }
                    return RetryResult { value: Some(value), error: None, attempts, total_delay };
                }
                Err(err) => {
                    let classified = IntegrationError::from(err);
                    if !classified.kind.is_retryable() || attempts >= retry.max_attempts {
                        warn!(
                            "{} failed terminally after {} attempt(s): {}",
                            context, attempts, classified
                        );
                        return RetryResult {
                            value: None,
                            error: Some(classified),
                            attempts,
                            total_delay,
                        };
                    }

                    let delay = delay_for(&classified, attempts, &retry);
                    warn!(
                        "{} attempt {} failed ({}), retrying in {}ms",
                        context,
                        attempts,
                        classified.kind.as_str(),
                        delay.as_millis()
                    );
                    total_delay += delay;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Serialize operations sharing a key under the given policy
    pub async fn execute_with_concurrency_control<T, F, Fut>(
        &self,
        key: &str,
        policy: ConcurrencyPolicy,
        op: F,
    ) -> Result<T, IntegrationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TrackerError>>,
    {
        let token = self.token_counter.fetch_add(1, Ordering::Relaxed) + 1;

        loop {
            let mut map = self.in_flight.lock().await;
            let in_flight = map.get(key).map(|e| std::sync::Arc::clone(&e.done));

            match (in_flight, policy) {
                (None, _) => {
                    map.insert(
                        key.to_string(),
                        InFlight { token, done: std::sync::Arc::new(Notify::new()) },
                    );
                    break;
                }
                (Some(_), ConcurrencyPolicy::Conflict) => {
                    debug!("Rejecting {} while an operation is in flight", key);
                    return Err(IntegrationError::conflict(key));
                }
                (Some(_), ConcurrencyPolicy::Latest) => {
                    debug!("Superseding in-flight tracking for {}", key);
                    let old = map.insert(
                        key.to_string(),
                        InFlight { token, done: std::sync::Arc::new(Notify::new()) },
                    );
                    if let Some(old) = old {
                        old.done.notify_waiters();
                    }
                    break;
                }
                (Some(done), ConcurrencyPolicy::Merge) => {
                    drop(map);
                    // Bounded wait; a missed wakeup only costs one interval
                    let _ = tokio::time::timeout(Duration::from_millis(100), done.notified()).await;
                    continue;
                }
            }
        }

        let result = op().await;

        let mut map = self.in_flight.lock().await;
        // Only clear the slot if it is still ours (Latest may have superseded it)
        if map.get(key).map(|e| e.token == token).unwrap_or(false) {
            if let Some(entry) = map.remove(key) {
                entry.done.notify_waiters();
            }
        }

        result.map_err(IntegrationError::from)
    }
}

/// Delay before the next attempt: rate limits honor the server hint;
/// everything else backs off exponentially with up to 10% jitter. Both
/// paths are capped at the configured maximum.
fn delay_for(error: &IntegrationError, attempt: u32, retry: &RetryConfig) -> Duration {
    let max = Duration::from_millis(retry.max_delay_ms);

    if error.kind == IntegrationErrorKind::RateLimit {
        if let Some(hint) = error.retry_after {
            return hint.min(max);
        }
    }

    let base = retry.base_delay_ms as f64 * retry.backoff_multiplier.powi(attempt as i32 - 1);
    let jitter = base * 0.1 * rand::random::<f64>();
    Duration::from_millis((base + jitter) as u64).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn handler() -> IntegrationErrorHandler {
        IntegrationErrorHandler::new(ConfigHandle::default())
    }

    #[test]
    fn test_classification_by_status() {
        assert_eq!(IntegrationError::classify("x", Some(429)).kind, IntegrationErrorKind::RateLimit);
        assert_eq!(
            IntegrationError::classify("x", Some(401)).kind,
            IntegrationErrorKind::Unauthorized
        );
        assert_eq!(
            IntegrationError::classify("x", Some(422)).kind,
            IntegrationErrorKind::InvalidRequest
        );
        assert_eq!(
            IntegrationError::classify("x", Some(503)).kind,
            IntegrationErrorKind::ServerError
        );
    }

    #[test]
    fn test_classification_by_message() {
        assert_eq!(
            IntegrationError::classify("request timed out", None).kind,
            IntegrationErrorKind::Timeout
        );
        assert_eq!(
            IntegrationError::classify("connection refused", None).kind,
            IntegrationErrorKind::Network
        );
        assert_eq!(
            IntegrationError::classify("something odd", None).kind,
            IntegrationErrorKind::Unknown
        );
    }

    #[test]
    fn test_non_retryable_kinds() {
        assert!(!IntegrationErrorKind::Unauthorized.is_retryable());
        assert!(!IntegrationErrorKind::InvalidRequest.is_retryable());
        assert!(IntegrationErrorKind::RateLimit.is_retryable());
        assert!(IntegrationErrorKind::Unknown.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honors_retry_after() {
        let handler = handler();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = Arc::clone(&calls);

        let result: RetryResult<()> = handler
            .execute_with_retry("rate limited op", move || {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TrackerError::RateLimited { retry_after_secs: 2 })
                }
            })
            .await;

        assert!(!result.success());
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two waits of exactly the server hint, not exponential backoff
        assert_eq!(result.total_delay, Duration::from_secs(4));
        assert_eq!(result.error.unwrap().kind, IntegrationErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_unauthorized_never_retries() {
        let handler = handler();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = Arc::clone(&calls);

        let result: RetryResult<()> = handler
            .execute_with_retry("unauthorized op", move || {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TrackerError::Unauthorized("bad token".into()))
                }
            })
            .await;

        assert!(!result.success());
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.total_delay, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let handler = handler();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = Arc::clone(&calls);

        let result = handler
            .execute_with_retry("flaky op", move || {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(TrackerError::Network("connection reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert!(result.success());
        assert_eq!(result.value, Some(42));
        assert_eq!(result.attempts, 2);
        assert!(result.total_delay >= Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delay_is_capped() {
        let mut config = AgentConfig::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 12_000;
        config.retry.backoff_multiplier = 10.0;
        config.retry.webhook_delay_tolerance_ms = 5_000;
        config.retry.max_attempts = 3;
        let handler = IntegrationErrorHandler::new(ConfigHandle::new(config).unwrap());

        let result: RetryResult<()> = handler
            .execute_with_retry("slow op", || async {
                Err(TrackerError::Server { status: 500, message: "boom".into() })
            })
            .await;

        assert_eq!(result.attempts, 3);
        // Two waits, each capped at 12s
        assert!(result.total_delay <= Duration::from_secs(24));
    }

    #[tokio::test]
    async fn test_conflict_policy_rejects_second_caller() {
        let handler = Arc::new(handler());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler
                    .execute_with_concurrency_control("issue-1", ConcurrencyPolicy::Conflict, || async {
                        release_rx.await.ok();
                        Ok::<_, TrackerError>(1)
                    })
                    .await
            })
        };

        // Give the first operation time to claim the slot
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = handler
            .execute_with_concurrency_control("issue-1", ConcurrencyPolicy::Conflict, || async {
                Ok::<_, TrackerError>(2)
            })
            .await;
        assert!(second.is_err());
        assert_eq!(second.unwrap_err().kind, IntegrationErrorKind::InvalidRequest);

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_merge_policy_waits_then_reruns() {
        let handler = Arc::new(handler());
        let runs = Arc::new(AtomicU32::new(0));

        let first = {
            let handler = Arc::clone(&handler);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                handler
                    .execute_with_concurrency_control("issue-2", ConcurrencyPolicy::Merge, || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, TrackerError>("first")
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;

        // Merge waits for the in-flight run, then runs again for fresh data
        let runs_second = Arc::clone(&runs);
        let second = handler
            .execute_with_concurrency_control("issue-2", ConcurrencyPolicy::Merge, || async move {
                runs_second.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TrackerError>("second")
            })
            .await;

        assert_eq!(second.unwrap(), "second");
        assert_eq!(first.await.unwrap().unwrap(), "first");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_latest_policy_proceeds_immediately() {
        let handler = Arc::new(handler());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler
                    .execute_with_concurrency_control("issue-3", ConcurrencyPolicy::Latest, || async {
                        release_rx.await.ok();
                        Ok::<_, TrackerError>("stale")
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = handler
            .execute_with_concurrency_control("issue-3", ConcurrencyPolicy::Latest, || async {
                Ok::<_, TrackerError>("fresh")
            })
            .await;
        assert_eq!(second.unwrap(), "fresh");

        release_tx.send(()).unwrap();
        // The superseded operation still completes; only its tracking was dropped
        assert_eq!(first.await.unwrap().unwrap(), "stale");
    }
}
