//! Live socket session tracking for graceful shutdown.

use std::time::Duration;

use tokio::sync::watch;

use crate::observability::metrics;

/// Counts upgraded sessions that are still running.
///
/// Uses a watch channel so shutdown can wait for the count to reach zero.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    active: watch::Sender<u64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self { active }
    }

    /// Record a new session. The returned guard ends it on drop.
    pub fn track(&self) -> SessionGuard {
        self.active.send_modify(|count| *count += 1);
        metrics::set_active_sessions(self.active_count());
        SessionGuard {
            active: self.active.clone(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until no session is open, at most `grace`.
    ///
    /// Returns `false` if sessions were still open when the grace period ran out.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let mut rx = self.active.subscribe();
        let idle = async move { rx.wait_for(|count| *count == 0).await.is_ok() };
        tokio::time::timeout(grace, idle).await.unwrap_or(false)
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a session's lifetime.
#[derive(Debug)]
pub struct SessionGuard {
    active: watch::Sender<u64>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active
            .send_modify(|count| *count = count.saturating_sub(1));
        metrics::set_active_sessions(*self.active.borrow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts() {
        let tracker = SessionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(first);
        assert_eq!(tracker.active_count(), 1);
        drop(second);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_when_sessions_end() {
        let tracker = SessionTracker::new();
        let guard = tracker.track();

        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.wait_idle(Duration::from_secs(5)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_idle_times_out() {
        let tracker = SessionTracker::new();
        let _guard = tracker.track();
        assert!(!tracker.wait_idle(Duration::from_millis(20)).await);
    }
}
