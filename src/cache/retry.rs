//! Bounded retry with exponential backoff for reads.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Extra attempts after the first one
  pub retries: u32,
  /// Delay before the first retry; doubles for each later retry
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      retries: 2,
      base_delay: Duration::from_millis(250),
      max_delay: Duration::from_secs(5),
    }
  }
}

impl RetryPolicy {
  /// Policy that never retries.
  pub fn none() -> Self {
    Self {
      retries: 0,
      ..Self::default()
    }
  }

  /// Delay before retry number `attempt` (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  /// Run `op` until it succeeds, fails with a non-retryable error, or the
  /// retry budget is spent.
  pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let mut attempt = 0;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(e) if e.is_retryable() && attempt < self.retries => {
          attempt += 1;
          let delay = self.delay_for(attempt);
          warn!(
            "{} failed (attempt {}/{}), retrying in {:?}: {}",
            what,
            attempt,
            self.retries + 1,
            delay,
            e
          );
          tokio::time::sleep(delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }
}
