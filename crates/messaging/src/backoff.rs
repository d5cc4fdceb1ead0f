use std::time::Duration;

use rand::Rng;

/// Exponential backoff policy with jitter and a cap.
///
/// Delays double per attempt starting from `base_delay`, are clamped to
/// `max_delay`, and get a symmetric jitter of `jitter_factor` applied
/// so that racing consumers do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the second delivery attempt.
    pub base_delay: Duration,

    /// Upper bound on any computed delay.
    pub max_delay: Duration,

    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy without jitter, useful for deterministic tests.
    pub fn without_jitter(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_factor: 0.0,
        }
    }

    /// Returns the delay to wait after the given delivery attempt
    /// (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let uncapped = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        let capped = uncapped.min(self.max_delay);

        if self.jitter_factor <= 0.0 {
            return capped;
        }

        let jitter_span = capped.as_secs_f64() * self.jitter_factor;
        let offset = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
        let jittered = (capped.as_secs_f64() + offset).max(0.0);
        Duration::from_secs_f64(jittered)
    }
}
