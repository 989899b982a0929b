//! Priority request queue.
//!
//! Every request a session makes goes through one [`RequestQueue`]. The queue
//! hands out [`Permit`]s in priority order (FIFO within a priority), keeps at
//! most `max_concurrent` permits alive, spaces dispatches by `min_spacing`,
//! inserts an extra cooldown when the trailing window saw a burst, and evicts
//! items that waited longer than `max_queue_age`.
//!
//! All bookkeeping happens inside one short critical section per pump; grants
//! and evictions are delivered after the lock is released, so a permit that is
//! dropped on delivery can re-enter the queue safely.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tether_config::QueueConfig;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::QueueError;

/// Dispatch priority. Lower values dispatch first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u32);

impl Priority {
    /// Launches, follow-ups, stops: the user is waiting on these.
    pub const USER_ACTION: Self = Self(0);
    pub const STATUS: Self = Self(10);
    pub const CONVERSATION: Self = Self(20);
    /// Listings and prefetches nobody is blocked on.
    pub const BACKGROUND: Self = Self(30);
}

/// Resolved queue limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub max_concurrent: usize,
    pub min_spacing: Duration,
    pub burst_threshold: usize,
    pub burst_window: Duration,
    pub burst_cooldown: Duration,
    pub max_queue_age: Duration,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueueLimits {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            min_spacing: config.min_spacing(),
            burst_threshold: config.burst_threshold,
            burst_window: config.burst_window(),
            burst_cooldown: config.burst_cooldown(),
            max_queue_age: config.max_queue_age(),
        }
    }
}

/// Point-in-time counters, mostly for tests and `--verbose` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub in_flight: usize,
    pub pending: usize,
    pub peak_in_flight: usize,
    pub dispatched: u64,
    pub evicted: u64,
}

type Grant = oneshot::Sender<Result<Permit, QueueError>>;

struct Pending {
    priority: Priority,
    seq: u64,
    enqueued_at: Instant,
    grant: Grant,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // BinaryHeap is a max-heap: the lowest (priority, seq) must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Pending>,
    in_flight: usize,
    recent: VecDeque<Instant>,
    last_dispatch: Option<Instant>,
    next_seq: u64,
    wake_at: Option<Instant>,
    peak_in_flight: usize,
    dispatched: u64,
    evicted: u64,
}

impl QueueState {
    /// Earliest instant the next dispatch is allowed, ignoring concurrency.
    fn ready_at(&self, limits: &QueueLimits) -> Option<Instant> {
        let last = self.last_dispatch?;
        let mut ready = last + limits.min_spacing;
        if self.recent.len() > limits.burst_threshold {
            ready += limits.burst_cooldown;
        }
        Some(ready)
    }

    fn prune_recent(&mut self, now: Instant, window: Duration) {
        while let Some(&at) = self.recent.front() {
            if now.duration_since(at) >= window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    fn take_stale(&mut self, now: Instant, max_age: Duration) -> Vec<Pending> {
        let has_stale = self
            .heap
            .iter()
            .any(|item| now.duration_since(item.enqueued_at) >= max_age);
        if !has_stale {
            return Vec::new();
        }
        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .partition(|item| now.duration_since(item.enqueued_at) >= max_age);
        self.heap = fresh.into();
        self.evicted += stale.len() as u64;
        stale
    }

    fn oldest_enqueued(&self) -> Option<Instant> {
        self.heap.iter().map(|item| item.enqueued_at).min()
    }
}

struct Inner {
    limits: QueueLimits,
    state: Mutex<QueueState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.pump();
    }

    /// Evict, dispatch what is eligible, and schedule the next wake-up.
    fn pump(self: &Arc<Self>) {
        let now = Instant::now();
        let limits = self.limits;
        let mut grants: Vec<(Grant, Permit, Duration)> = Vec::new();
        let stale;
        let mut wake = None;

        {
            let mut state = self.lock();
            stale = state.take_stale(now, limits.max_queue_age);
            state.prune_recent(now, limits.burst_window);

            while state.in_flight < limits.max_concurrent {
                let Some(top) = state.heap.peek() else {
                    break;
                };
                if top.grant.is_closed() {
                    state.heap.pop();
                    continue;
                }
                if let Some(ready_at) = state.ready_at(&limits) {
                    if ready_at > now {
                        wake = Some(ready_at);
                        break;
                    }
                }
                let Some(item) = state.heap.pop() else {
                    break;
                };

                state.in_flight += 1;
                state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
                state.dispatched += 1;
                state.recent.push_back(now);
                state.last_dispatch = Some(now);

                let permit = Permit {
                    queue: Arc::clone(self),
                };
                grants.push((item.grant, permit, now.duration_since(item.enqueued_at)));
            }

            if let Some(oldest) = state.oldest_enqueued() {
                let expiry = oldest + limits.max_queue_age;
                wake = Some(wake.map_or(expiry, |at: Instant| at.min(expiry)));
            }

            if let Some(at) = wake {
                let already = state.wake_at.is_some_and(|w| w > now && w <= at);
                if already {
                    wake = None;
                } else {
                    state.wake_at = Some(at);
                }
            }
        }

        for item in stale {
            let waited = now.duration_since(item.enqueued_at);
            warn!(
                priority = item.priority.0,
                waited_ms = waited.as_millis() as u64,
                "evicting stale queue item"
            );
            let _ = item.grant.send(Err(QueueError::Expired { waited }));
        }

        for (grant, permit, waited) in grants {
            debug!(waited_ms = waited.as_millis() as u64, "dispatching queue item");
            // A caller that gave up returns the permit here; dropping it
            // releases the slot and pumps again.
            let _ = grant.send(Ok(permit));
        }

        if let Some(at) = wake {
            self.schedule_wake(at);
        }
    }

    fn schedule_wake(self: &Arc<Self>, at: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        handle.spawn(async move {
            tokio::time::sleep_until(at).await;
            if let Some(inner) = weak.upgrade() {
                {
                    let mut state = inner.lock();
                    if state.wake_at == Some(at) {
                        state.wake_at = None;
                    }
                }
                inner.pump();
            }
        });
    }
}

/// A dispatch slot. Dropping it frees the slot and dispatches the next item.
pub struct Permit {
    queue: Arc<Inner>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.queue.release();
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}

/// Concurrency- and rate-limited priority queue. Cheap to clone; clones share
/// the same slots and counters.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<Inner>,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(QueueLimits::default())
    }
}

impl RequestQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            inner: Arc::new(Inner {
                limits,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn limits(&self) -> QueueLimits {
        self.inner.limits
    }

    /// Wait for a dispatch slot at `priority`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Expired`] if the item waited longer than
    /// `max_queue_age`, or [`QueueError::Closed`] if the queue went away.
    pub async fn acquire(&self, priority: Priority) -> Result<Permit, QueueError> {
        let (grant, granted) = oneshot::channel();
        {
            let mut state = self.inner.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(Pending {
                priority,
                seq,
                enqueued_at: Instant::now(),
                grant,
            });
        }
        self.inner.pump();
        granted.await.unwrap_or(Err(QueueError::Closed))
    }

    /// Run `op` once a slot is granted, holding the slot until it completes.
    ///
    /// # Errors
    ///
    /// See [`Self::acquire`]; `op` itself is never started in that case.
    pub async fn run<F, Fut, T>(&self, priority: Priority, op: F) -> Result<T, QueueError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = self.acquire(priority).await?;
        let output = op().await;
        drop(permit);
        Ok(output)
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock();
        QueueStats {
            in_flight: state.in_flight,
            pending: state.heap.len(),
            peak_in_flight: state.peak_in_flight,
            dispatched: state.dispatched,
            evicted: state.evicted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> QueueLimits {
        QueueLimits {
            max_concurrent: 1,
            min_spacing: Duration::ZERO,
            burst_threshold: 100,
            burst_window: Duration::from_secs(2),
            burst_cooldown: Duration::from_secs(1),
            max_queue_age: Duration::from_secs(60),
        }
    }

    fn pending(priority: u32, seq: u64) -> Pending {
        let (grant, _) = oneshot::channel();
        Pending {
            priority: Priority(priority),
            seq,
            enqueued_at: Instant::now(),
            grant,
        }
    }

    #[tokio::test]
    async fn heap_pops_lowest_priority_then_oldest() {
        let mut heap = BinaryHeap::new();
        heap.push(pending(20, 0));
        heap.push(pending(0, 3));
        heap.push(pending(10, 1));
        heap.push(pending(0, 2));
        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|p| (p.priority.0, p.seq))
            .collect();
        assert_eq!(order, vec![(0, 2), (0, 3), (10, 1), (20, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_adds_cooldown_to_spacing() {
        let mut state = QueueState::default();
        let limits = QueueLimits {
            burst_threshold: 2,
            min_spacing: Duration::from_millis(100),
            ..limits()
        };
        let now = Instant::now();
        assert_eq!(state.ready_at(&limits), None);

        state.last_dispatch = Some(now);
        state.recent.extend([now, now]);
        assert_eq!(state.ready_at(&limits), Some(now + Duration::from_millis(100)));

        state.recent.push_back(now);
        assert_eq!(
            state.ready_at(&limits),
            Some(now + Duration::from_millis(1100))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn permit_drop_frees_slot() {
        let queue = RequestQueue::new(limits());
        let permit = queue.acquire(Priority::STATUS).await.unwrap();
        assert_eq!(queue.stats().in_flight, 1);
        drop(permit);
        assert_eq!(queue.stats().in_flight, 0);
        assert_eq!(queue.stats().dispatched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_waiter_is_skipped() {
        let queue = RequestQueue::new(limits());
        let held = queue.acquire(Priority::STATUS).await.unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            queue.acquire(Priority::USER_ACTION),
        )
        .await;
        assert!(abandoned.is_err());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.acquire(Priority::BACKGROUND).await.is_ok() })
        };
        tokio::task::yield_now().await;
        drop(held);
        assert!(waiter.await.unwrap());
        assert_eq!(queue.stats().dispatched, 2);
    }

    /// Submit jobs in order; each records its label and start time, then
    /// holds its slot for `hold`.
    async fn run_jobs(
        queue: &RequestQueue,
        jobs: Vec<(Priority, &'static str)>,
        hold: Duration,
    ) -> (Vec<&'static str>, Vec<Instant>) {
        let log = Arc::new(Mutex::new((Vec::new(), Vec::new())));
        let mut handles = Vec::new();
        for (priority, label) in jobs {
            let queue = queue.clone();
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                queue
                    .run(priority, || async {
                        {
                            let mut log = log.lock().unwrap();
                            log.0.push(label);
                            log.1.push(Instant::now());
                        }
                        tokio::time::sleep(hold).await;
                    })
                    .await
            }));
            // Enqueue in submission order.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let log = log.lock().unwrap();
        (log.0.clone(), log.1.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_concurrent() {
        let queue = RequestQueue::new(QueueLimits {
            max_concurrent: 3,
            ..limits()
        });
        let jobs = (0..20).map(|_| (Priority::STATUS, "job")).collect();
        let (started, _) = run_jobs(&queue, jobs, Duration::from_millis(100)).await;
        assert_eq!(started.len(), 20);
        let stats = queue.stats();
        assert_eq!(stats.peak_in_flight, 3);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.dispatched, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn lower_priority_value_dispatches_first_and_fifo_within() {
        let queue = RequestQueue::new(limits());
        // The first job occupies the only slot while the rest queue up.
        let jobs = vec![
            (Priority::STATUS, "first"),
            (Priority::BACKGROUND, "bg"),
            (Priority::CONVERSATION, "conv-1"),
            (Priority::USER_ACTION, "user"),
            (Priority::CONVERSATION, "conv-2"),
        ];
        let (started, _) = run_jobs(&queue, jobs, Duration::from_millis(50)).await;
        assert_eq!(started, vec!["first", "user", "conv-1", "conv-2", "bg"]);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_are_spaced() {
        let queue = RequestQueue::new(QueueLimits {
            max_concurrent: 4,
            min_spacing: Duration::from_millis(250),
            ..limits()
        });
        let jobs = (0..4).map(|_| (Priority::STATUS, "job")).collect();
        let (_, times) = run_jobs(&queue, jobs, Duration::ZERO).await;
        for pair in times.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_triggers_cooldown() {
        let queue = RequestQueue::new(QueueLimits {
            max_concurrent: 10,
            burst_threshold: 3,
            burst_window: Duration::from_secs(2),
            burst_cooldown: Duration::from_secs(1),
            ..limits()
        });
        let jobs = (0..5).map(|_| (Priority::STATUS, "job")).collect();
        let (_, times) = run_jobs(&queue, jobs, Duration::ZERO).await;
        let first = times[0];
        // Four dispatches pass the threshold; the fifth waits out the cooldown.
        assert!(times[3].duration_since(first) < Duration::from_secs(1));
        assert!(times[4].duration_since(times[3]) >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_items_are_evicted_without_running() {
        let queue = RequestQueue::new(QueueLimits {
            max_queue_age: Duration::from_secs(5),
            ..limits()
        });
        let held = queue.acquire(Priority::USER_ACTION).await.unwrap();

        let ran = Arc::new(Mutex::new(false));
        let waiter = {
            let queue = queue.clone();
            let ran = Arc::clone(&ran);
            tokio::spawn(async move {
                queue
                    .run(Priority::BACKGROUND, || async move {
                        *ran.lock().unwrap() = true;
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(6)).await;
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(QueueError::Expired { waited }) if waited >= Duration::from_secs(5)));
        assert!(!*ran.lock().unwrap());
        assert_eq!(queue.stats().evicted, 1);
        drop(held);
    }
}
