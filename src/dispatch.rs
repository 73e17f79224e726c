//! Command Dispatch
//!
//! Boundary between intent classification and the planning executors.
//! Enforces a hard wall-clock timeout by racing the executor against a
//! timer; on timeout the executor's eventual result is discarded and a
//! timeout reply is surfaced. The agent always answers, even when the
//! executor itself fails.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::config::ConfigHandle;
use crate::intent::interpreter::ParsedIntent;
use crate::intent::patterns::CommandIntent;

/// Reply handed back to the user-facing surface
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub text: String,
    pub success: bool,
}

impl CommandResponse {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { text: text.into(), success: true }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self { text: text.into(), success: false }
    }
}

/// Executor seam: the planning modules behind a classified command
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, intent: &ParsedIntent) -> Result<CommandResponse>;
}

/// Dispatches classified intents to the executor under a hard timeout
pub struct CommandDispatcher {
    config: ConfigHandle,
    executor: Arc<dyn CommandExecutor>,
}

impl CommandDispatcher {
    pub fn new(config: ConfigHandle, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { config, executor }
    }

    /// Always returns a response; classification, executor failures, and
    /// timeouts all degrade to an explanatory reply
    pub async fn dispatch(&self, intent: &ParsedIntent) -> CommandResponse {
        if intent.intent == CommandIntent::Unknown {
            return unknown_response(intent);
        }

        let limit = Duration::from_secs(self.config.snapshot().command_timeout_secs);
        match timeout(limit, self.executor.execute(intent)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("Executor failed for {}: {}", intent.intent.as_str(), e);
                CommandResponse::failed(format!(
                    "I could not complete \"{}\": {}",
                    intent.intent.as_str(),
                    e
                ))
            }
            Err(_) => {
                warn!(
                    "Executor for {} exceeded the {}s timeout",
                    intent.intent.as_str(),
                    limit.as_secs()
                );
                CommandResponse::failed(format!(
                    "\"{}\" timed out after {}s; the operation was abandoned",
                    intent.intent.as_str(),
                    limit.as_secs()
                ))
            }
        }
    }
}

fn unknown_response(intent: &ParsedIntent) -> CommandResponse {
    if intent.suggestions.is_empty() {
        return CommandResponse::failed(
            "I did not recognize that command. Try \"help\" for what I can do.",
        );
    }
    let mut text = String::from("I did not recognize that command. Did you mean:\n");
    for suggestion in &intent.suggestions {
        text.push_str(&format!("  - {}\n", suggestion.example));
    }
    CommandResponse::failed(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::intent::interpreter::CommandInterpreter;

    struct StubExecutor {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl CommandExecutor for StubExecutor {
        async fn execute(&self, intent: &ParsedIntent) -> Result<CommandResponse> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("planner exploded");
            }
            Ok(CommandResponse::ok(format!("ran {}", intent.intent.as_str())))
        }
    }

    fn parse(text: &str) -> ParsedIntent {
        CommandInterpreter::new(ConfigHandle::default()).parse(text, None)
    }

    fn dispatcher(delay: Duration, fail: bool) -> CommandDispatcher {
        CommandDispatcher::new(
            ConfigHandle::default(),
            Arc::new(StubExecutor { delay, fail }),
        )
    }

    #[tokio::test]
    async fn test_successful_dispatch() {
        let response = dispatcher(Duration::ZERO, false)
            .dispatch(&parse("plan art for next PI"))
            .await;
        assert!(response.success);
        assert!(response.text.contains("plan_art"));
    }

    #[tokio::test]
    async fn test_executor_failure_still_answers() {
        let response = dispatcher(Duration::ZERO, true)
            .dispatch(&parse("plan art for next PI"))
            .await;
        assert!(!response.success);
        assert!(response.text.contains("planner exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_discards_result_and_answers() {
        // Default command timeout is 60s; the stub sleeps far past it
        let response = dispatcher(Duration::from_secs(3_600), false)
            .dispatch(&parse("plan art for next PI"))
            .await;
        assert!(!response.success);
        assert!(response.text.contains("timed out"));
    }

    #[tokio::test]
    async fn test_unknown_intent_offers_suggestions() {
        let response = dispatcher(Duration::ZERO, false)
            .dispatch(&parse("dependency stuff maybe"))
            .await;
        assert!(!response.success);
        assert!(response.text.contains("did not recognize"));
    }
}
