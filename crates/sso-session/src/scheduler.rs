//! Scheduled token refresh.
//!
//! One timer per session. Arming a timer for a session replaces (and aborts)
//! any timer already armed for it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;

/// Error returned by a [`RefreshHandler`].
pub type RefreshError = Box<dyn std::error::Error + Send + Sync>;

/// Refreshes the provider tokens of a session when its timer fires.
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    /// Refreshes `session_id`. On success the handler is expected to store
    /// the new tokens, which re-arms the timer.
    ///
    /// The timer only logs a returned error. A handler whose provider refused
    /// the refresh settles the session through
    /// [`SessionManager::expire_after_rejected_refresh`](crate::SessionManager::expire_after_rejected_refresh).
    async fn refresh_session(&self, session_id: &str) -> Result<(), RefreshError>;
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-session refresh timers.
pub struct RefreshScheduler {
    timers: Arc<DashMap<String, Timer>>,
    threshold: Duration,
    generation: AtomicU64,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("armed", &self.timers.len())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl RefreshScheduler {
    /// Creates a scheduler that fires `threshold` before expiry.
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            threshold,
            generation: AtomicU64::new(0),
        }
    }

    /// Delay from `now` until a session expiring at `expires_at` should be
    /// refreshed. Clamped at zero.
    #[must_use]
    pub fn delay_until_refresh(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let threshold = chrono::Duration::from_std(self.threshold).unwrap_or(chrono::Duration::zero());
        (expires_at - threshold - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Runs `task` for `session_id` after `delay`.
    ///
    /// The timer entry is dropped right before `task` starts, so the task
    /// itself may re-arm the session without aborting itself.
    pub fn schedule<F>(&self, session_id: &str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let id = session_id.to_string();

        // The entry guard is held until the new timer is recorded, so a
        // zero-delay task cannot clear its entry before it exists.
        match self.timers.entry(session_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let handle = tokio::spawn(fire(timers, id, generation, delay, task));
                let previous = entry.insert(Timer { generation, handle });
                previous.handle.abort();
            }
            Entry::Vacant(entry) => {
                let handle = tokio::spawn(fire(timers, id, generation, delay, task));
                entry.insert(Timer { generation, handle });
            }
        }
        tracing::debug!(session_id, delay_secs = delay.as_secs(), "refresh timer armed");
    }

    /// Cancels the timer of a session. Returns whether one was armed.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.timers.remove(session_id) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every timer. Returns how many were armed.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Returns whether a timer is armed for `session_id`.
    #[must_use]
    pub fn is_scheduled(&self, session_id: &str) -> bool {
        self.timers.contains_key(session_id)
    }

    /// Number of armed timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Returns whether no timer is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        for timer in self.timers.iter() {
            timer.handle.abort();
        }
    }
}

async fn fire<F>(
    timers: Arc<DashMap<String, Timer>>,
    session_id: String,
    generation: u64,
    delay: Duration,
    task: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::time::sleep(delay).await;
    timers.remove_if(&session_id, |_, timer| timer.generation == generation);
    task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delay_is_clamped_at_zero() {
        let scheduler = RefreshScheduler::new(Duration::from_secs(300));
        let now = Utc::now();
        assert_eq!(
            scheduler.delay_until_refresh(now + chrono::Duration::seconds(60), now),
            Duration::ZERO
        );
        assert_eq!(
            scheduler.delay_until_refresh(now + chrono::Duration::seconds(3600), now),
            Duration::from_secs(3300)
        );
    }

    #[tokio::test]
    async fn timer_fires_once_and_clears_itself() {
        let scheduler = RefreshScheduler::new(Duration::ZERO);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        scheduler.schedule("s1", Duration::from_millis(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_scheduled("s1"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("s1"));
    }

    #[tokio::test]
    async fn rearming_replaces_the_previous_timer() {
        let scheduler = RefreshScheduler::new(Duration::ZERO);
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&fired);
            scheduler.schedule("s1", Duration::from_millis(30), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let scheduler = RefreshScheduler::new(Duration::ZERO);
        let fired = Arc::new(AtomicUsize::new(0));
        for id in ["a", "b"] {
            let counter = Arc::clone(&fired);
            scheduler.schedule(id, Duration::from_millis(30), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(scheduler.cancel("a"));
        assert!(!scheduler.cancel("a"));
        assert_eq!(scheduler.cancel_all(), 1);
        assert!(scheduler.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
