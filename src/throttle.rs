//! Courtesy delays between upstream requests.
//!
//! Each worker task pauses after a successful fetch to stay under upstream
//! rate limits. The pause only suspends the task that calls it; sibling
//! tasks keep running. The delay policy is a trait object so tests can
//! swap in [`NoDelay`] or a [`CountingThrottle`] and never sleep.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Throttle: Send + Sync {
    /// Called by a worker after a successful request.
    async fn pause(&self);
}

/// Sleeps a fixed duration on every call.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            tracing::trace!(delay = ?self.delay, "courtesy delay");
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Never waits.
#[derive(Debug, Clone, Default)]
pub struct NoDelay;

#[async_trait]
impl Throttle for NoDelay {
    async fn pause(&self) {}
}

/// Never waits, but remembers how often it was asked to.
#[derive(Debug, Clone, Default)]
pub struct CountingThrottle {
    calls: Arc<AtomicUsize>,
}

impl CountingThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Throttle for CountingThrottle {
    async fn pause(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_sleeps_without_blocking_siblings() {
        let throttle = Arc::new(FixedDelay::from_millis(500));
        let start = tokio::time::Instant::now();

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let t = Arc::clone(&throttle);
            set.spawn(async move { t.pause().await });
        }
        while set.join_next().await.is_some() {}

        // Four concurrent pauses overlap instead of adding up.
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_no_delay_returns_immediately() {
        let start = Instant::now();
        NoDelay.pause().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_counting_throttle_counts() {
        let throttle = CountingThrottle::new();
        let clone = throttle.clone();
        throttle.pause().await;
        clone.pause().await;
        assert_eq!(throttle.calls(), 2);
    }
}
