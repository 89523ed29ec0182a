//! Fixed-delay retry around a fallible async operation.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PrompterError;

/// How many times to try, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    #[serde(with = "millis", rename = "delay_ms")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` tries (at least one) and a fixed delay.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Whether a failure on `attempt` (1-based) should be followed by another.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &PrompterError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Run `op` until it succeeds or the policy gives up, returning the last
    /// error. `op` receives the 1-based attempt number.
    ///
    /// # Errors
    /// The error of the final attempt.
    pub async fn run<T, Op, Fut>(&self, label: &str, mut op: Op) -> Result<T, PrompterError>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PrompterError>>,
    {
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(attempt, &error) => {
                    warn!(
                        prompt = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "prompt call failed, retrying in {:?}",
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
