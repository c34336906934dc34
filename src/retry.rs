//! Retry bound for transport failures.
//!
//! Only failures where the transport produced no response are retried. Each
//! retry repeats the whole build, authenticate and send sequence after a fixed
//! pause.

use std::time::Duration;

/// The default pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// How many times, and how far apart, a failed send is repeated.
///
/// # Examples
///
/// ```
/// use omniapi::RetryPolicy;
/// use std::time::Duration;
///
/// // No retries
/// let none = RetryPolicy::none();
/// assert_eq!(none.delay_for_attempt(0), None);
///
/// // Up to 3 retries, 250ms apart
/// let policy = RetryPolicy::new(3).with_backoff(Duration::from_millis(250));
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(250)));
/// assert_eq!(policy.delay_for_attempt(3), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: Duration,
}

impl RetryPolicy {
    /// Retries up to `max_retries` times with the default backoff.
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Sets the fixed pause between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// The maximum number of retries after the first attempt.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// The pause between attempts.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Returns the delay before retrying after `attempt` failed, or `None` if
    /// retries are exhausted.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt counter of the failed attempt (0-indexed, so 0 = first send)
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        if attempt < self.max_retries {
            Some(self.backoff)
        } else {
            None
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delays() {
        let policy = RetryPolicy::new(3).with_backoff(Duration::from_secs(1));

        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(3), None);
    }

    #[test]
    fn test_default_backoff() {
        let policy = RetryPolicy::new(1);
        assert_eq!(policy.delay_for_attempt(0), Some(DEFAULT_BACKOFF));
        assert_eq!(policy.max_retries(), 1);
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), None);
    }
}
