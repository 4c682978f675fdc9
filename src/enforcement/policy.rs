//! Timeout and bounded retry for collaborator calls.

use crate::collaborators::CollaboratorError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How a collaborator call is bounded.
///
/// Every attempt is wrapped in a timeout; an elapsed timeout becomes
/// [`CollaboratorError::Timeout`]. Transient failures are retried up to
/// `max_attempts` total attempts with exponential backoff. Permanent
/// failures return immediately.
///
/// A timed-out call may still have taken effect. Calls that move money use
/// [`without_timeout_retries`](Self::without_timeout_retries) so a timeout
/// ends the call instead of repeating it.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_attempts: usize,
    pub backoff: Duration,
    pub retry_timeouts: bool,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            max_attempts: 3,
            backoff: Duration::from_millis(50),
            retry_timeouts: true,
        }
    }
}

impl CallPolicy {
    pub fn builder() -> CallPolicyBuilder {
        CallPolicyBuilder::new()
    }

    /// Delay before the given retry (1-based), doubling each time.
    pub fn backoff_for(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as u32;
        self.backoff.saturating_mul(2u32.saturating_pow(exponent))
    }

    /// The same policy, but a timeout is final.
    pub fn without_timeout_retries(&self) -> Self {
        Self {
            retry_timeouts: false,
            ..self.clone()
        }
    }

    /// Longest a single [`run`](Self::run) can take: every attempt timing
    /// out plus the backoff between them.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let waiting: Duration = (1..attempts).map(|retry| self.backoff_for(retry)).sum();
        self.timeout.saturating_mul(attempts as u32) + waiting
    }

    /// Run `call` under this policy.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, CollaboratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(CollaboratorError::Timeout { .. }) if !self.retry_timeouts => {
                    warn!(operation, attempt, "collaborator call timed out; not repeating");
                    return Err(CollaboratorError::Timeout {
                        operation: operation.to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
                Err(error) if error.is_transient() && attempt < attempts => {
                    let delay = self.backoff_for(attempt);
                    debug!(operation, attempt, ?delay, %error, "retrying collaborator call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(operation, attempt, %error, "collaborator call failed");
                    return Err(error);
                }
            }
        }
    }
}

/// Builder for a [`CallPolicy`]
pub struct CallPolicyBuilder {
    policy: CallPolicy,
}

impl CallPolicyBuilder {
    pub fn new() -> Self {
        Self {
            policy: CallPolicy::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = timeout;
        self
    }

    /// Total attempts including the first. Zero is treated as one.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.policy.backoff = backoff;
        self
    }

    pub fn retry_timeouts(mut self, retry: bool) -> Self {
        self.policy.retry_timeouts = retry;
        self
    }

    pub fn build(self) -> CallPolicy {
        self.policy
    }
}

impl Default for CallPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
