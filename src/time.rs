//! Time as the client consumes it.
//!
//! Three components are time-driven and in two different ways: the cache
//! and breaker read a millisecond clock (expiry, recovery windows), and the
//! retry loop pauses between attempts. [`TimeSource`] bundles both so a
//! test can substitute virtual time for the whole client at one seam.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The client's time dependencies: a monotonic millisecond reading and a
/// pause between retry attempts.
#[async_trait]
pub trait TimeSource: Send + Sync + std::fmt::Debug {
    /// Milliseconds on an arbitrary monotonic scale. Only differences are
    /// meaningful; the zero point is the source's own.
    fn now_millis(&self) -> u64;

    /// Wait before the next retry attempt.
    async fn pause(&self, duration: Duration);
}

/// Runtime time: milliseconds elapsed since construction, pauses on the
/// tokio timer.
#[derive(Debug, Clone)]
pub struct TokioTime {
    epoch: Instant,
}

impl Default for TokioTime {
    fn default() -> Self {
        Self { epoch: Instant::now() }
    }
}

#[async_trait]
impl TimeSource for TokioTime {
    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Virtual time for tests. `pause` returns immediately, recording the
/// requested delay and advancing the clock by it; `advance` moves the
/// clock directly. Clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Every delay the retry loop asked for, in request order.
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait]
impl TimeSource for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(duration);
        self.now.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_millis(), 0);
        clock.advance(150);
        assert_eq!(clock.now_millis(), 150);
        clock.advance(50);
        assert_eq!(clock.now_millis(), 200);
    }

    #[test]
    fn manual_clock_clones_share_the_timeline() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(75);
        assert_eq!(other.now_millis(), 75);
    }

    #[tokio::test]
    async fn manual_pause_records_and_advances_without_waiting() {
        let clock = ManualClock::new();
        let start = std::time::Instant::now();
        clock.pause(Duration::from_secs(100)).await;
        clock.pause(Duration::from_millis(250)).await;

        assert!(start.elapsed() < Duration::from_millis(100), "no real waiting");
        assert_eq!(
            clock.pauses(),
            vec![Duration::from_secs(100), Duration::from_millis(250)]
        );
        assert_eq!(clock.now_millis(), 100_250, "pauses advance the timeline");
    }

    #[tokio::test]
    async fn tokio_time_pause_actually_waits() {
        let time = TokioTime::default();
        let before = time.now_millis();
        time.pause(Duration::from_millis(50)).await;
        assert!(time.now_millis() >= before + 45);
    }
}
