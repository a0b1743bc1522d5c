//! Readiness watches: wait for a source that has nothing to read to become readable.
//!
//! A driver whose worker reports nothing to read either parks on a readiness
//! watch or, when none is installed, polls again after the reopen interval.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Readability probe evaluated by a watch, usually the worker's `is_readable`
pub type ReadableProbe<'a> = &'a (dyn Fn() -> bool + Send + Sync);

/// Readiness event source driven on the worker thread's reactor
///
/// `readable` is polled only while the driver has armed the readiness watch
/// and is dropped as soon as another event wins, so it must be cancel-safe.
#[async_trait]
pub trait ReadinessWatch: Send {
    /// Called each time the driver arms the watch
    fn update_watches(&mut self) {}

    /// Called each time the driver disarms the watch
    fn stop_watches(&mut self) {}

    /// Resolve once the source is readable
    async fn readable(&mut self, probe: ReadableProbe<'_>);
}

/// Polls the probe at a fixed period
///
/// For backends that follow a growing file or journal and have no
/// notification mechanism of their own.
#[derive(Debug, Clone)]
pub struct FollowPoll {
    follow_freq: Duration,
}

impl FollowPoll {
    pub fn new(follow_freq: Duration) -> Self {
        Self { follow_freq }
    }

    pub fn follow_freq(&self) -> Duration {
        self.follow_freq
    }
}

#[async_trait]
impl ReadinessWatch for FollowPoll {
    async fn readable(&mut self, probe: ReadableProbe<'_>) {
        loop {
            tokio::time::sleep(self.follow_freq).await;
            if probe() {
                return;
            }
        }
    }
}

/// Readiness signalled from outside the driver thread
///
/// Each notification re-evaluates the probe; a notification sent while the
/// watch is not armed is remembered until the next time it is.
#[derive(Debug)]
pub struct NotifyWatch {
    notify: Arc<Notify>,
}

/// Sending half of a [`NotifyWatch`]
#[derive(Debug, Clone)]
pub struct ReadinessNotifier {
    notify: Arc<Notify>,
}

impl NotifyWatch {
    pub fn new() -> (Self, ReadinessNotifier) {
        let notify = Arc::new(Notify::new());
        let notifier = ReadinessNotifier {
            notify: Arc::clone(&notify),
        };
        (Self { notify }, notifier)
    }
}

impl ReadinessNotifier {
    /// Tell the driver that new data may be available
    pub fn notify(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl ReadinessWatch for NotifyWatch {
    async fn readable(&mut self, probe: ReadableProbe<'_>) {
        loop {
            self.notify.notified().await;
            if probe() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_follow_poll_waits_for_probe() {
        let mut watch = FollowPoll::new(Duration::from_millis(100));
        let calls = AtomicUsize::new(0);
        let probe = || calls.fetch_add(1, Ordering::SeqCst) >= 2;

        let started = Instant::now();
        watch.readable(&probe).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_poll_sleeps_before_first_probe() {
        let mut watch = FollowPoll::new(Duration::from_secs(1));
        let probe = || true;

        let started = Instant::now();
        watch.readable(&probe).await;
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_notify_watch_checks_probe_per_notification() {
        let (mut watch, notifier) = NotifyWatch::new();
        let ready = AtomicBool::new(false);
        let probe = || ready.load(Ordering::SeqCst);

        notifier.notify();
        let pending = tokio::time::timeout(Duration::from_millis(50), watch.readable(&probe)).await;
        assert!(pending.is_err());

        ready.store(true, Ordering::SeqCst);
        notifier.notify();
        tokio::time::timeout(Duration::from_secs(1), watch.readable(&probe))
            .await
            .expect("watch did not report readiness");
    }
}
