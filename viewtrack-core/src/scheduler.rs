//! Pending-view queue and debounce timer
//!
//! The queue is an ordered buffer drained all at once. The scheduler owns at
//! most one timer task; arming always cancels the previous one first, so the
//! flush fires `delay` after the *last* view rather than the first.
//!
//! Each arm bumps a generation counter. A timer that wakes up after it was
//! superseded sees a stale generation and does nothing.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::types::PageView;

/// Ordered buffer of views awaiting delivery
#[derive(Debug, Default)]
pub struct ViewQueue {
    views: Vec<PageView>,
}

impl ViewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, view: PageView) {
        self.views.push(view);
    }

    /// Take every queued view, leaving the queue empty
    pub fn drain(&mut self) -> Vec<PageView> {
        std::mem::take(&mut self.views)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// Single cancellable debounce timer
#[derive(Debug)]
pub struct Scheduler {
    delay: Duration,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl Scheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timer: None,
            generation: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel any armed timer and start a new one.
    ///
    /// `on_fire` receives the generation of this arm and builds the future run
    /// once the delay elapses. Returns `None`, leaving nothing armed, when
    /// called outside a tokio runtime.
    pub fn arm<F, Fut>(&mut self, on_fire: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime to arm the timer on");
            return None;
        };

        let generation = self.generation;
        let delay = self.delay;
        let fire = on_fire(generation);
        self.timer = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        }));

        tracing::trace!(generation, delay_ms = delay.as_millis() as u64, "Timer armed");
        Some(generation)
    }

    /// Forget the armed timer without aborting it. When it fires it sees no
    /// armed handle and does nothing.
    pub fn detach(&mut self) -> bool {
        self.timer.take().is_some()
    }

    /// Abort the armed timer. Returns true if one was armed.
    pub fn cancel(&mut self) -> bool {
        match self.timer.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Called by a firing timer: returns true (and forgets the handle) only
    /// when `generation` is still the current arm.
    pub fn take_fired(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.timer.is_none() {
            return false;
        }
        // The task is the caller; dropping the handle detaches rather than aborts.
        self.timer = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_queue_drains_in_order() {
        let mut queue = ViewQueue::new();
        queue.push(PageView::new("example.com", "/a", "/a", 1));
        queue.push(PageView::new("example.com", "/b", "/b", 2));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained[0].pathname, "/a");
        assert_eq!(drained[1].pathname, "/b");
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(Duration::from_millis(100));

        let counter = fired.clone();
        scheduler.arm(move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_resets_countdown() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(Duration::from_millis(100));

        let counter = fired.clone();
        let first = scheduler
            .arm(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        let counter = fired.clone();
        let second = scheduler
            .arm(move |_| async move {
                counter.fetch_add(10, Ordering::SeqCst);
            })
            .unwrap();
        assert_ne!(first, second);

        // The first timer would have fired at 100ms
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(Duration::from_millis(100));

        let counter = fired.clone();
        scheduler.arm(move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_take_fired_rejects_stale_generation() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let first = scheduler.arm(|_| async {}).unwrap();
        let second = scheduler.arm(|_| async {}).unwrap();

        assert!(!scheduler.take_fired(first));
        assert!(scheduler.take_fired(second));
        assert!(!scheduler.is_armed());
        assert!(!scheduler.take_fired(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_timer_fires_but_is_not_taken() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(Duration::from_millis(100));

        let counter = fired.clone();
        let generation = scheduler
            .arm(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(scheduler.detach());
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.take_fired(generation));
    }

    #[test]
    fn test_arm_outside_runtime() {
        let mut scheduler = Scheduler::new(Duration::from_millis(100));
        assert_eq!(scheduler.arm(|_| async {}), None);
        assert!(!scheduler.is_armed());
    }
}
