use std::time::Duration;

/// Bounded retry budget with exponential backoff.
///
/// `max_attempts` counts every attempt, the first one included. After a failed
/// attempt `n` (1-based) the caller waits `backoff_base^n` seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.backoff_base.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// What to do after an attempt failed
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    RetryAfter { next_attempt: u32, delay: Duration },
    GiveUp { attempts: u32, last_failure: String },
}

/// Attempt counter driving one retried operation from first attempt to a
/// terminal success or exhaustion.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    last_failure: Option<String>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_failure: None,
        }
    }

    /// Start the next attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Record the failure of the current attempt.
    pub fn record_failure(&mut self, failure: impl Into<String>) -> RetryDecision {
        let failure = failure.into();
        self.last_failure = Some(failure.clone());
        if self.attempt >= self.policy.max_attempts {
            RetryDecision::GiveUp {
                attempts: self.attempt,
                last_failure: failure,
            }
        } else {
            RetryDecision::RetryAfter {
                next_attempt: self.attempt + 1,
                delay: self.policy.delay_after(self.attempt),
            }
        }
    }
}
