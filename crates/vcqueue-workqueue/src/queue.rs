//! De-duplicating, rate-limited work queue
//!
//! Items are handed to workers one at a time through [`WorkQueue::get`]. An
//! item that is already pending is not queued twice, and an item that is
//! re-added while a worker holds it is queued again only once the worker calls
//! [`WorkQueue::done`]. So no two workers ever process equal items at the
//! same time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, trace};

use crate::rate_limiter::RateLimiter;

struct State<T> {
    /// Items ready to be handed out, in FIFO order
    queue: VecDeque<T>,
    /// Items that need processing (queued, or re-added while in flight)
    dirty: HashSet<T>,
    /// Items currently held by a worker
    processing: HashSet<T>,
    shutting_down: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

impl<T> Shared<T>
where
    T: Clone + Eq + Hash,
{
    fn add(&self, item: T) {
        {
            let mut state = self.state.lock();
            if state.shutting_down || state.dirty.contains(&item) {
                return;
            }
            state.dirty.insert(item.clone());
            if state.processing.contains(&item) {
                return;
            }
            state.queue.push_back(item);
        }
        self.notify.notify_waiters();
    }
}

/// Rate-limited work queue shared between event handlers and worker tasks.
///
/// Constructing a queue spawns a background task that releases delayed items,
/// so it must happen inside a tokio runtime. The task stops when the queue is
/// shut down or dropped.
pub struct WorkQueue<T> {
    name: String,
    shared: Arc<Shared<T>>,
    rate_limiter: Box<dyn RateLimiter<T>>,
    waiting_tx: mpsc::UnboundedSender<(T, Duration)>,
    shutdown: CancellationToken,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Create a queue with the given rate limiter
    pub fn new(name: impl Into<String>, rate_limiter: impl RateLimiter<T> + 'static) -> Self {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        });
        let (waiting_tx, waiting_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(run_waiting_loop(
            name.clone(),
            shared.clone(),
            waiting_rx,
            shutdown.clone(),
        ));

        Self {
            name,
            shared,
            rate_limiter: Box::new(rate_limiter),
            waiting_tx,
            shutdown,
        }
    }

    /// Queue an item for processing. No-op if an equal item is already pending.
    pub fn add(&self, item: T) {
        trace!(queue = %self.name, ?item, "adding item");
        self.shared.add(item);
    }

    /// Queue an item once `delay` has elapsed.
    ///
    /// If the same item is already waiting, the earlier deadline wins.
    pub fn add_after(&self, item: T, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(item);
            return;
        }
        if self.waiting_tx.send((item, delay)).is_err() {
            debug!(queue = %self.name, "delay loop stopped, dropping delayed item");
        }
    }

    /// Queue an item after the rate limiter's backoff for it
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.rate_limiter.when(&item);
        trace!(queue = %self.name, ?item, delay_ms = delay.as_millis(), "requeue with backoff");
        self.add_after(item, delay);
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is shut down and has no ready items left.
    /// Every `Some` must be followed by exactly one [`WorkQueue::done`].
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark an item as no longer being processed.
    ///
    /// If the item was re-added while in flight it becomes ready again.
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut state = self.shared.state.lock();
            state.processing.remove(item);
            if state.dirty.contains(item) {
                state.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.shared.notify.notify_waiters();
        }
    }

    /// Reset the failure count for an item
    pub fn forget(&self, item: &T) {
        self.rate_limiter.forget(item);
    }

    /// Failures recorded for an item since it was last forgotten
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.rate_limiter.num_requeues(item)
    }

    /// Number of items ready to be handed out
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Whether no items are ready
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting items and wake all waiting workers.
    ///
    /// Workers keep receiving already-queued items; `get` returns `None` once
    /// those are drained.
    pub fn shut_down(&self) {
        self.shared.state.lock().shutting_down = true;
        self.shutdown.cancel();
        self.shared.notify.notify_waiters();
        debug!(queue = %self.name, "work queue shutting down");
    }

    /// Whether [`WorkQueue::shut_down`] has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shared.state.lock().shutting_down
    }
}

impl<T> Drop for WorkQueue<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Holds delayed items until their deadline and then adds them to the queue.
async fn run_waiting_loop<T>(
    name: String,
    shared: Arc<Shared<T>>,
    mut waiting_rx: mpsc::UnboundedReceiver<(T, Duration)>,
    shutdown: CancellationToken,
) where
    T: Clone + Eq + Hash + Send + 'static,
{
    let mut delayed: DelayQueue<T> = DelayQueue::new();
    let mut deadlines = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some((item, delay)) = waiting_rx.recv() => {
                let ready_at = Instant::now() + delay;
                match deadlines.get(&item).cloned() {
                    Some((_, existing)) if existing <= ready_at => {}
                    Some((key, _)) => {
                        delayed.reset_at(&key, ready_at);
                        deadlines.insert(item, (key, ready_at));
                    }
                    None => {
                        let key = delayed.insert_at(item.clone(), ready_at);
                        deadlines.insert(item, (key, ready_at));
                    }
                }
            }
            Some(expired) = delayed.next() => {
                let item = expired.into_inner();
                deadlines.remove(&item);
                shared.add(item);
            }
            else => break,
        }
    }

    debug!(queue = %name, pending = deadlines.len(), "delay loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::ItemExponentialFailureRateLimiter;

    fn queue() -> WorkQueue<&'static str> {
        WorkQueue::new("test", ItemExponentialFailureRateLimiter::default())
    }

    #[tokio::test]
    async fn duplicate_adds_are_collapsed() {
        let q = queue();
        q.add("a");
        q.add("a");
        q.add("b");
        assert_eq!(q.len(), 2);

        assert_eq!(q.get().await, Some("a"));
        assert_eq!(q.get().await, Some("b"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn item_readded_while_processing_is_queued_after_done() {
        let q = queue();
        q.add("a");
        let item = q.get().await.unwrap();

        q.add("a");
        assert_eq!(q.len(), 0, "in-flight item must not be handed out twice");

        q.done(&item);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some("a"));
    }

    #[tokio::test]
    async fn done_without_readd_does_not_requeue() {
        let q = queue();
        q.add("a");
        let item = q.get().await.unwrap();
        q.done(&item);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn get_waits_for_add() {
        let q = Arc::new(queue());
        let getter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.add("late");
        assert_eq!(getter.await.unwrap(), Some("late"));
    }

    #[tokio::test]
    async fn shutdown_wakes_waiting_getters() {
        let q = Arc::new(queue());
        let getter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.shut_down();
        assert_eq!(getter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn shutdown_drains_ready_items_then_stops() {
        let q = queue();
        q.add("a");
        q.shut_down();
        q.add("b");

        assert!(q.is_shutting_down());
        assert_eq!(q.get().await, Some("a"));
        assert_eq!(q.get().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn add_after_delays_item() {
        let q = queue();
        q.add_after("a", Duration::from_secs(10));
        tokio::task::yield_now().await;
        assert!(q.is_empty());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(q.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn add_after_keeps_earliest_deadline() {
        let q = queue();
        q.add_after("a", Duration::from_secs(30));
        q.add_after("a", Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some("a"));
        q.done(&"a");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(q.is_empty(), "later deadline must not fire a second time");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_adds_back_off_and_forget_resets() {
        let q = queue();
        q.add_rate_limited("a");
        q.add_rate_limited("b");
        q.add_rate_limited("b");
        assert_eq!(q.num_requeues(&"a"), 1);
        assert_eq!(q.num_requeues(&"b"), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(q.len(), 2);

        q.forget(&"b");
        assert_eq!(q.num_requeues(&"b"), 0);
    }

    #[tokio::test]
    async fn zero_delay_adds_immediately() {
        let q = queue();
        q.add_after("a", Duration::ZERO);
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_workers_never_share_an_item() {
        let q = Arc::new(WorkQueue::<u32>::new(
            "concurrent",
            ItemExponentialFailureRateLimiter::default(),
        ));
        for i in 0..100 {
            q.add(i);
        }
        q.shut_down();

        let mut workers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            workers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(item) = q.get().await {
                    seen.push(item);
                    q.done(&item);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for worker in workers {
            all.extend(worker.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
