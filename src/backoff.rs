//! Retry delay strategies.

use std::sync::Arc;
use std::time::Duration;

/// How long to wait before a retry attempt.
#[derive(Clone)]
pub enum Backoff {
    /// Fixed delay between retries.
    Constant { delay: Duration },
    /// Exponentially increasing delay, capped at `max`.
    Exponential { base: Duration, max: Duration },
    /// Caller-supplied function of the attempt number (1-indexed).
    Custom(Arc<dyn Fn(usize) -> Duration + Send + Sync>),
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backoff::Constant { delay } => {
                f.debug_struct("Constant").field("delay", delay).finish()
            }
            Backoff::Exponential { base, max } => {
                f.debug_struct("Exponential").field("base", base).field("max", max).finish()
            }
            Backoff::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl Default for Backoff {
    /// One second doubling per attempt, capped at thirty seconds.
    fn default() -> Self {
        Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Backoff::Constant { delay }
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential { base, max }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        Backoff::Custom(Arc::new(f))
    }

    /// Delay before the retry following `attempt` (1-indexed).
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            Backoff::Constant { delay } => *delay,
            Backoff::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
                let multiplier = 2u32.saturating_pow(exponent);
                base.checked_mul(multiplier).map_or(*max, |d| d.min(*max))
            }
            Backoff::Custom(f) => f(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_returns_same_delay() {
        let backoff = Backoff::constant(Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(100), Duration::from_secs(1));
    }

    #[test]
    fn exponential_doubles_each_attempt() {
        let backoff =
            Backoff::exponential(Duration::from_millis(100), Duration::from_secs(30));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn exponential_respects_cap() {
        let backoff = Backoff::exponential(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(backoff.delay(5), Duration::from_secs(16));
        assert_eq!(backoff.delay(6), Duration::from_secs(30));
        assert_eq!(backoff.delay(64), Duration::from_secs(30));
    }

    #[test]
    fn default_matches_documented_curve() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(6), Duration::from_secs(30), "capped at 30s");
    }

    #[test]
    fn custom_function_is_consulted() {
        let backoff = Backoff::custom(|attempt| Duration::from_millis(attempt as u64 * 7));
        assert_eq!(backoff.delay(3), Duration::from_millis(21));
    }
}
