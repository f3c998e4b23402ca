//! Upload progress indicator
//!
//! While the object upload is in flight a ticker raises progress by 5 every
//! 300 ms, never past 95. The ticker stops when its guard is dropped.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const TICK_INTERVAL: Duration = Duration::from_millis(300);
pub const TICK_STEP: u8 = 5;
pub const TICK_CAP: u8 = 95;
pub const COMPLETE: u8 = 100;

/// Shared progress value in percent
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle(Arc<AtomicU8>);

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: u8) {
        self.0.store(value.min(COMPLETE), Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.set(0);
    }

    /// Add `step` without passing `cap`
    fn advance(&self, step: u8, cap: u8) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_add(step).min(cap).max(v))
            });
    }
}

/// Running ticker; aborted on drop
#[derive(Debug)]
pub struct ProgressTicker {
    task: JoinHandle<()>,
}

impl ProgressTicker {
    pub fn start(progress: ProgressHandle) -> Self {
        Self::with_timing(progress, TICK_INTERVAL, TICK_STEP, TICK_CAP)
    }

    pub fn with_timing(progress: ProgressHandle, interval: Duration, step: u8, cap: u8) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                progress.advance(step, cap);
            }
        });
        Self { task }
    }

    pub fn stop(self) {}
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticker_advances_and_caps() {
        let progress = ProgressHandle::new();
        let ticker =
            ProgressTicker::with_timing(progress.clone(), Duration::from_millis(2), 40, TICK_CAP);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(progress.get(), TICK_CAP);
        ticker.stop();
    }

    #[tokio::test]
    async fn test_ticker_stops_on_drop() {
        let progress = ProgressHandle::new();
        {
            let _ticker =
                ProgressTicker::with_timing(progress.clone(), Duration::from_millis(5), 1, TICK_CAP);
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stopped_at = progress.get();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(progress.get(), stopped_at);
    }

    #[test]
    fn test_advance_never_exceeds_cap() {
        let progress = ProgressHandle::new();
        progress.set(93);
        progress.advance(5, TICK_CAP);
        assert_eq!(progress.get(), 95);

        // Completion set by the workflow is not pulled back down
        progress.set(COMPLETE);
        progress.advance(5, TICK_CAP);
        assert_eq!(progress.get(), COMPLETE);
    }
}
