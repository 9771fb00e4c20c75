//! Bounded priority queue with per-entry deadlines
//!
//! ```text
//!   front                                         back
//!   ┌──────────┬──────────┬──────────┬──────────┬──────────┐
//!   │ -10 (t1) │ -10 (t4) │  0 (t2)  │  0 (t5)  │ 10 (t3)  │
//!   └──────────┴──────────┴──────────┴──────────┴──────────┘
//!     ascending priority, insertion order within a priority
//! ```
//!
//! Lower priority values are delivered first. Expired entries are skipped
//! and discarded lazily by the peek/pop operations, and eagerly by
//! [`PriorityQueue::prune`] when the queue grows past its cap.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Default capacity for a connection's queue
pub const DEFAULT_QUEUE_SIZE: usize = 2500;

/// A queued payload
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry<T> {
    pub priority: i32,
    pub deadline: Instant,
    pub payload: T,
}

impl<T> QueueEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline <= now
    }
}

#[derive(Debug)]
struct QueueInner<T> {
    entries: VecDeque<QueueEntry<T>>,
    closed: bool,
}

impl<T> QueueInner<T> {
    /// Drop expired entries from the front; true if a live entry remains there
    fn skip_expired(&mut self, now: Instant) -> bool {
        while let Some(front) = self.entries.front() {
            if !front.is_expired(now) {
                return true;
            }
            self.entries.pop_front();
        }
        false
    }

    /// Drop expired entries, then the oldest entries of the least urgent
    /// priority until within `max_size`
    fn prune(&mut self, now: Instant, max_size: usize) -> usize {
        self.entries.retain(|e| !e.is_expired(now));
        let mut dropped = 0;
        while self.entries.len() > max_size {
            let Some(last) = self.entries.back().map(|e| e.priority) else {
                break;
            };
            let group_start = self.entries.partition_point(|e| e.priority < last);
            let n = (self.entries.len() - max_size).min(self.entries.len() - group_start);
            self.entries.drain(group_start..group_start + n);
            dropped += n;
        }
        dropped
    }
}

/// Priority + TTL queue with a single-slot wake signal
#[derive(Debug)]
pub struct PriorityQueue<T> {
    inner: Mutex<QueueInner<T>>,
    wake: Notify,
    max_size: usize,
}

impl<T> PriorityQueue<T> {
    /// Create a queue holding at most `max_size` entries
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::new(),
                closed: false,
            }),
            wake: Notify::new(),
            max_size: max_size.max(1),
        }
    }

    /// Queue `payload`, valid for `ttl` from now
    ///
    /// Returns how many entries were dropped to stay within capacity.
    pub fn put(&self, priority: i32, ttl: Duration, payload: T) -> usize {
        self.put_at(priority, ttl, payload, Instant::now())
    }

    pub fn put_at(&self, priority: i32, ttl: Duration, payload: T, now: Instant) -> usize {
        let dropped = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return 0;
            }

            let entry = QueueEntry {
                priority,
                deadline: now + ttl,
                payload,
            };
            // First slot whose priority is strictly greater keeps equal
            // priorities in insertion order
            let idx = inner.entries.partition_point(|e| e.priority <= priority);
            inner.entries.insert(idx, entry);

            if inner.entries.len() > self.max_size {
                inner.prune(now, self.max_size)
            } else {
                0
            }
        };

        if dropped > 0 {
            tracing::debug!(dropped = dropped, max_size = self.max_size, "Queue overflow, dropped oldest entries");
        }
        self.wake.notify_one();
        dropped
    }

    /// First live entry without removing it
    pub fn peek_first(&self) -> Option<QueueEntry<T>>
    where
        T: Clone,
    {
        self.peek_first_at(Instant::now())
    }

    pub fn peek_first_at(&self, now: Instant) -> Option<QueueEntry<T>>
    where
        T: Clone,
    {
        let mut inner = self.inner.lock();
        if inner.skip_expired(now) {
            inner.entries.front().cloned()
        } else {
            None
        }
    }

    /// Remove and return the first live entry
    pub fn pop_first(&self) -> Option<QueueEntry<T>> {
        self.pop_first_at(Instant::now())
    }

    pub fn pop_first_at(&self, now: Instant) -> Option<QueueEntry<T>> {
        let mut inner = self.inner.lock();
        if inner.skip_expired(now) {
            inner.entries.pop_front()
        } else {
            None
        }
    }

    /// Drop expired entries, then the oldest entries of the least urgent
    /// priority until within capacity. Returns how many live entries were
    /// dropped for capacity.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        self.inner.lock().prune(now, self.max_size)
    }

    /// Close the queue, discarding its contents and waking any waiter.
    /// Later puts are ignored.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.entries.clear();
        }
        self.wake.notify_waiters();
        self.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Signal the consumer. A wake that nobody has consumed yet is not
    /// duplicated.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Wait for the next wake signal
    pub async fn wait(&self) {
        self.wake.notified().await;
    }

    /// Number of entries, including any not yet discovered to be expired
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_SIZE)
    }
}
