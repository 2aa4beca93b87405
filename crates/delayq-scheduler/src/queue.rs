//! Thread-safe deadline queue plus the single-waiter wait protocol.
//!
//! All state (heap, generation counter, shutdown cutoff, counters) lives
//! behind one `Mutex` paired with one `Condvar`. Inserts and shutdown requests
//! modify that state and notify under the same discipline the waiter uses to
//! check-and-sleep, so a wakeup can never be lost between the two.

use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info};

use crate::{
    clock,
    error::{Result, SchedulerError},
    types::{JobId, JobOutcome, ScheduledItem, SchedulerStats},
};

struct QueueState {
    heap: BinaryHeap<ScheduledItem>,
    next_seq: u64,
    /// Bumped on every insert; the waiter compares it to notice new heads.
    generation: u64,
    /// Set once by `request_shutdown`. Jobs due by this instant still run.
    drain_cutoff: Option<Instant>,
    /// Set when the worker thread died without a shutdown request.
    worker_lost: bool,
    max_pending: Option<usize>,
    stats: SchedulerStats,
}

/// Min-ordered queue of [`ScheduledItem`]s keyed by wake time.
pub struct DeadlineQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl DeadlineQueue {
    /// Create an empty queue. `max_pending` bounds how many jobs may wait.
    pub fn new(max_pending: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                generation: 0,
                drain_cutoff: None,
                worker_lost: false,
                max_pending,
                stats: SchedulerStats::default(),
            }),
            changed: Condvar::new(),
        }
    }

    // Job bodies never run under this lock, so a poisoned mutex can only come
    // from a panic in our own bookkeeping. The state is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `item` and wake the waiter so it can re-evaluate the head.
    ///
    /// Fails with `Stopped` once shutdown was requested and with
    /// `LimitExceeded` when the queue is at `max_pending`.
    pub fn insert(&self, mut item: ScheduledItem) -> Result<JobId> {
        let id = item.id;
        {
            let mut state = self.lock();
            if state.worker_lost {
                return Err(SchedulerError::WorkerPanicked);
            }
            if state.drain_cutoff.is_some() {
                return Err(SchedulerError::Stopped);
            }
            if let Some(max) = state.max_pending {
                if state.heap.len() >= max {
                    return Err(SchedulerError::LimitExceeded { max });
                }
            }

            item.seq = state.next_seq;
            state.next_seq += 1;
            state.generation = state.generation.wrapping_add(1);
            state.heap.push(item);

            state.stats.scheduled += 1;
            state.stats.peak_pending = state.stats.peak_pending.max(state.heap.len());
        }
        self.changed.notify_all();
        Ok(id)
    }

    /// Id and wake time of the earliest item, without removing it.
    pub fn peek_min(&self) -> Option<(JobId, Instant)> {
        self.lock().heap.peek().map(|item| (item.id, item.wake_at))
    }

    /// Remove and return the earliest item.
    pub fn pop_min(&self) -> Result<ScheduledItem> {
        self.lock().heap.pop().ok_or(SchedulerError::EmptyQueue)
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Stop accepting inserts and tell the waiter to drain and exit.
    ///
    /// Items whose wake time is at or before `cutoff` still come out of
    /// [`next_due`](Self::next_due); later ones are discarded. Returns `false`
    /// if shutdown had already been requested (the first cutoff wins).
    pub fn request_shutdown(&self, cutoff: Instant) -> bool {
        {
            let mut state = self.lock();
            if state.drain_cutoff.is_some() {
                return false;
            }
            state.drain_cutoff = Some(cutoff);
        }
        self.changed.notify_all();
        true
    }

    /// Refuse further inserts because nothing is left to run them.
    pub(crate) fn mark_worker_lost(&self) {
        self.lock().worker_lost = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().drain_cutoff.is_some()
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.lock();
        SchedulerStats {
            pending: state.heap.len(),
            ..state.stats
        }
    }

    pub(crate) fn record(&self, outcome: JobOutcome) {
        let mut state = self.lock();
        state.stats.executed += 1;
        if outcome == JobOutcome::Panicked {
            state.stats.panicked += 1;
        }
    }

    /// Block until the earliest item is due and return it, or return `None`
    /// once shutdown was requested and nothing due by the cutoff remains.
    ///
    /// Intended for a single consumer. The caller runs the returned job with
    /// the lock released and then calls this again, which is the drain loop.
    pub fn next_due(&self) -> Option<ScheduledItem> {
        let mut state = self.lock();
        loop {
            // Only place the waiter may sleep without a deadline.
            state = self
                .changed
                .wait_while(state, |s| s.heap.is_empty() && s.drain_cutoff.is_none())
                .unwrap_or_else(PoisonError::into_inner);

            let Some(head_wake) = state.heap.peek().map(|item| item.wake_at) else {
                debug!("deadline queue empty at shutdown");
                return None;
            };

            if let Some(cutoff) = state.drain_cutoff {
                if head_wake <= cutoff {
                    return state.heap.pop();
                }
                let discarded = std::mem::take(&mut state.heap);
                state.stats.dropped_on_stop += discarded.len() as u64;
                let dropped = discarded.len();
                // Closures may run arbitrary Drop code; not under our lock.
                drop(state);
                drop(discarded);
                info!(dropped, "discarded jobs not yet due at shutdown");
                return None;
            }

            let now = clock::now();
            if head_wake <= now {
                return state.heap.pop();
            }

            // Sleep until the head is due, something new is inserted, or
            // shutdown is requested. Whatever woke us, re-read the head.
            let seen = state.generation;
            let timeout = head_wake.saturating_duration_since(now);
            let (guard, _) = self
                .changed
                .wait_timeout_while(state, timeout, |s| {
                    s.generation == seen && s.drain_cutoff.is_none()
                })
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

impl Default for DeadlineQueue {
    fn default() -> Self {
        Self::new(None)
    }
}
