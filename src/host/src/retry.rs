//! Caller-level retry with exponential backoff
//!
//! The loader never retries on its own. The host decides which failures are
//! worth another attempt: only recoverable kinds (manifest and artifact
//! network failures, timeouts) are retried.

use crate::config::RetrySection;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetrySection::default())
    }
}

impl RetryPolicy {
    pub fn from_config(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            initial_backoff: Duration::from_millis(section.backoff_ms),
            max_backoff: Duration::from_millis(section.max_backoff_ms),
            backoff_multiplier: 2.0,
        }
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32))
            as u64;

        Duration::from_millis(backoff_ms.min(self.max_backoff.as_millis() as u64))
    }

    /// Run `op` until it succeeds, fails unrecoverably or attempts run out
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, module: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(%module, attempt, "load succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_recoverable() && attempt < self.max_attempts => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        %module,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "load failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
