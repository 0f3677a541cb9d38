use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::notion::NotionError;

/// Bounded retry for low-level transport failures. HTTP error responses are
/// returned as-is; only [`NotionError::Transport`] is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, NotionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NotionError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(?err, attempt, delay_ms = self.delay.as_millis() as u64, "transport failure; retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
