//! Delay randomization to desynchronize retrying clients.

use rand::Rng;
use std::time::Duration;

/// Jitter strategy applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Use the exact backoff delay.
    None,
    /// Random between 0 and the delay.
    Full,
    /// Uniform perturbation of ±`fraction`, never below `floor`.
    Proportional { fraction: f64, floor: Duration },
}

impl Default for Jitter {
    /// ±10% with a 100 ms floor, preventing zero-delay tight loops.
    fn default() -> Self {
        Jitter::Proportional { fraction: 0.1, floor: Duration::from_millis(100) }
    }
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rand::thread_rng())
    }

    /// Apply jitter with a caller-supplied RNG (for deterministic tests).
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = delay.as_millis() as u64;
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.gen_range(0..=millis))
            }
            Jitter::Proportional { fraction, floor } => {
                let millis = delay.as_millis() as u64;
                let spread = (millis as f64 * fraction) as u64;
                let jittered = if spread == 0 {
                    millis
                } else {
                    rng.gen_range(millis.saturating_sub(spread)..=millis.saturating_add(spread))
                };
                Duration::from_millis(jittered).max(*floor)
            }
        }
    }
}
