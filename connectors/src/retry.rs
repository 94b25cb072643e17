use common::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_DELAY: Duration = Duration::from_secs(10);

/// Fixed delay retry of transient exchange errors.
///
/// By default a failing call is retried forever, every `delay`. A permanent
/// outage therefore looks like a call that never returns. Set `max_attempts`
/// to give up instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Total number of attempts before giving up, `None` for unbounded
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    pub fn from_env() -> Self {
        let delay = std::env::var("RETRY_DELAY_SECS")
            .ok()
            .and_then(|d| d.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DELAY);
        let max_attempts = std::env::var("RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|n| n.parse().ok())
            .filter(|n| *n > 0);

        Self {
            delay,
            max_attempts,
        }
    }

    /// Run `op` until it succeeds or fails with a non transient error.
    pub async fn run<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => self.backoff(name, &mut attempt, err).await?,
            }
        }
    }

    /// Decide what to do with a failed attempt. Returns `Ok(())` after
    /// waiting when the caller should try again, otherwise the error to
    /// hand back.
    pub async fn backoff(&self, name: &str, attempt: &mut u32, err: Error) -> Result<()> {
        if !err.is_transient() {
            return Err(err);
        }

        *attempt += 1;
        if let Some(max) = self.max_attempts {
            if *attempt >= max {
                warn!("{} failed {} times, giving up: {}", name, attempt, err);
                return Err(Error::RetriesExhausted {
                    attempts: *attempt,
                    last: Box::new(err),
                });
            }
        }

        debug!("{} returned an error, retrying.. ({})", name, err);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
