//! Whole-run retry with exponential backoff and jitter.
//!
//! A failed attempt is discarded wholesale: its partial transcript and token
//! usage never reach the caller, and every agent node is reset before the
//! next attempt starts from the entry node.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use drishti_core::config::RetryConfig;
use drishti_core::error::{DrishtiError, Result};
use drishti_core::traits::ReplySource;
use drishti_core::types::RunResult;

use crate::graph::GraphExecutor;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ms: 750,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_backoff_ms,
            max_delay_ms: config.max_backoff_ms,
            jitter_ms: config.max_jitter_ms,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt `attempt` (1-based):
    /// base doubled per attempt, capped, plus uniform jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let exponential = self.base_delay_ms.saturating_mul(1u64 << shift);
        let capped = exponential.min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Drives a `GraphExecutor` run to success or attempt exhaustion.
#[derive(Debug, Clone, Default)]
pub struct RetryRunner {
    policy: RetryPolicy,
}

impl RetryRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn run(
        &self,
        label: &str,
        executor: &GraphExecutor,
        task: &str,
        replies: &dyn ReplySource,
    ) -> Result<RunResult> {
        let mut attempt = 1u32;
        loop {
            match executor.run(task, replies).await {
                Ok(result) => {
                    // Leave agent memories clean for the next stage.
                    if let Err(e) = executor.graph().reset().await {
                        warn!(stage = %label, error = %e, "post-run agent reset failed");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    warn!(stage = %label, attempt, error = %e, "graph run attempt failed");
                    if let Err(reset_err) = executor.graph().reset().await {
                        warn!(stage = %label, error = %reset_err, "agent reset failed after failed attempt");
                    }
                    if attempt >= self.policy.max_attempts {
                        return Err(DrishtiError::ExhaustedRetries {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
