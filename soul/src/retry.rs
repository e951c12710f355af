//! Exponential-backoff retry policy, generalized from `graphweave`'s
//! `graph::retry::RetryPolicy` (`examples/hi-youichi-loom/graphweave/src/graph/retry.rs`)
//! with jitter added for the chat-provider retry described in spec §4.1.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn exponential(
        max_attempts: usize,
        initial_interval: Duration,
        max_interval: Duration,
        jitter: f64,
    ) -> Self {
        RetryPolicy {
            max_attempts,
            initial_interval,
            max_interval,
            jitter,
        }
    }

    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retrying `attempt` (0-indexed), with up to `jitter`
    /// fraction of random variance added so concurrent retries don't
    /// thunder-herd a struggling provider.
    pub fn delay(&self, attempt: usize) -> Duration {
        let base = self.initial_interval.as_secs_f64() * 2f64.powi(attempt as i32);
        let base = base.min(self.max_interval.as_secs_f64());
        let jittered = if self.jitter > 0.0 {
            let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            (base * factor).max(0.0)
        } else {
            base
        };
        Duration::from_secs_f64(jittered)
    }
}

impl Default for RetryPolicy {
    /// Matches the defaults named in spec §4.1: initial 0.3s, max 5s, jitter 0.5.
    fn default() -> Self {
        RetryPolicy::exponential(3, Duration::from_millis(300), Duration::from_secs(5), 0.5)
    }
}
