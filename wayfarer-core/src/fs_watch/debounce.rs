//! Per-key quiescence timers.
//!
//! Each key moves through `Idle -> Pending{deadline}`; every further touch
//! pushes the deadline out by the window, and once the deadline elapses the
//! key is yielded exactly once by [`Debouncer::next_due`] and returns to
//! `Idle`. Cancelling a pending key drops its timer without firing.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use futures::StreamExt;
use tokio::time::{Duration, Instant};
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue;

/// Observable state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: Instant },
}

struct Pending {
    slot: delay_queue::Key,
    deadline: Instant,
}

/// Quiescence timers keyed by `K`.
pub struct Debouncer<K> {
    window: Duration,
    queue: DelayQueue<K>,
    pending: HashMap<K, Pending>,
}

impl<K> fmt::Debug for Debouncer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<K: Clone + Eq + Hash> Debouncer<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            queue: DelayQueue::new(),
            pending: HashMap::new(),
        }
    }

    /// Arm the timer for `key`, or push an armed timer's deadline out.
    pub fn touch(&mut self, key: &K) {
        let deadline = Instant::now() + self.window;
        match self.pending.get_mut(key) {
            Some(pending) => {
                self.queue.reset(&pending.slot, self.window);
                pending.deadline = deadline;
            }
            None => {
                let slot = self.queue.insert(key.clone(), self.window);
                self.pending.insert(key.clone(), Pending { slot, deadline });
            }
        }
    }

    /// Drop a pending timer. Returns whether one was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some(pending) => {
                self.queue.remove(&pending.slot);
                true
            }
            None => false,
        }
    }

    pub fn state(&self, key: &K) -> DebounceState {
        self.pending
            .get(key)
            .map(|pending| DebounceState::Pending {
                deadline: pending.deadline,
            })
            .unwrap_or(DebounceState::Idle)
    }

    /// Wait for the next key whose window elapsed.
    ///
    /// Resolves to `None` immediately when nothing is pending, so callers
    /// polling this from `select!` should guard on a pattern.
    pub async fn next_due(&mut self) -> Option<K> {
        let expired = self.queue.next().await?;
        let key = expired.into_inner();
        self.pending.remove(&key);
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_one_fire() {
        let mut debouncer = Debouncer::new(WINDOW);
        for _ in 0..5 {
            debouncer.touch(&"a");
            tokio::time::advance(Duration::from_millis(20)).await;
        }

        assert!(matches!(debouncer.state(&"a"), DebounceState::Pending { .. }));
        assert_eq!(debouncer.next_due().await, Some("a"));
        assert_eq!(debouncer.state(&"a"), DebounceState::Idle);
        assert_eq!(debouncer.next_due().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_pushes_deadline_out() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();
        debouncer.touch(&"a");
        tokio::time::advance(Duration::from_millis(60)).await;
        debouncer.touch(&"a");

        assert_eq!(
            debouncer.state(&"a"),
            DebounceState::Pending {
                deadline: start + Duration::from_millis(160)
            }
        );
        assert_eq!(debouncer.next_due().await, Some("a"));
        assert!(Instant::now() >= start + Duration::from_millis(160));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.touch(&"a");
        debouncer.touch(&"b");
        assert!(debouncer.cancel(&"a"));
        assert!(!debouncer.cancel(&"a"));

        assert_eq!(debouncer.next_due().await, Some("b"));
        assert_eq!(debouncer.next_due().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_fire_independently() {
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.touch(&"a");
        tokio::time::advance(Duration::from_millis(50)).await;
        debouncer.touch(&"b");

        assert_eq!(debouncer.next_due().await, Some("a"));
        assert_eq!(debouncer.next_due().await, Some("b"));
    }
}
