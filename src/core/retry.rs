//! Upload retry with exponential backoff
//!
//! Index uploads are the one step of a dispatch run worth retrying: the
//! twine invocation can fail on transient network conditions that clear
//! within seconds. Build failures and index-side rejections are never
//! retried.

use crate::core::error::DispatchError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Failure text the upload tooling emits for network-level problems
/// (requests/urllib3 wording) plus transient index-side HTTP statuses
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "connectionerror",
    "connecttimeout",
    "read timed out",
    "temporarily unavailable",
    "failed to establish a new connection",
    "name or service not known",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
];

/// Backoff settings for upload retries
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts in total, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Cap on the delay between attempts
    pub max_delay: Duration,
    /// Growth factor applied to the delay after each attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, capped at `max_delay`
    ///
    /// Attempts are counted from 1, so `delay_for(1)` is the wait after the
    /// first failure.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(self.initial_delay.as_secs_f64() * factor).min(self.max_delay)
    }

    /// Run an upload operation, retrying transient failures
    ///
    /// Non-transient errors are returned immediately. Errors classified by
    /// [`is_transient`] are retried up to `max_attempts` with exponential
    /// backoff between tries; the last error is returned when every attempt
    /// fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use release_dispatcher::core::{DispatchError, RetryPolicy};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), DispatchError> {
    ///     let policy = RetryPolicy::default();
    ///
    ///     let receipt = policy.run(|| async {
    ///         // twine invocation here
    ///         Ok::<_, DispatchError>("uploaded")
    ///     }).await?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, DispatchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DispatchError>>,
    {
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !is_transient(&error) || attempt >= self.max_attempts {
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    println!(
                        "   🔁 {} (attempt {}/{}, retrying in {:?})",
                        error.code(),
                        attempt,
                        self.max_attempts,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Whether a dispatch error is worth another upload attempt
///
/// Network and timeout errors always are. Upload failures are transient
/// only when the tool output carries network-level failure text; version
/// conflicts and authentication failures never are.
pub fn is_transient(error: &DispatchError) -> bool {
    match error {
        DispatchError::NetworkError { .. } | DispatchError::TimeoutError { .. } => true,
        DispatchError::UploadFailed { message, .. } => {
            let lowered = message.to_lowercase();
            TRANSIENT_PATTERNS
                .iter()
                .any(|pattern| lowered.contains(pattern))
        }
        _ => false,
    }
}
