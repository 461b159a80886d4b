//! Thread-safe priority queue of pending tasks.
//!
//! Multi-producer multi-consumer queue backed by a binary heap, with blocking
//! and timed dequeue, targeted removal, and a sticky stop/resume switch.
//! Ordering is `(priority rank, submit time, id)` lexicographic: higher
//! priority first, FIFO within a priority.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::error::SchedulerError;
use crate::core::task::{Priority, Task, TaskId};

/// Heap wrapper ordering tasks most-urgent-first in a max-heap.
struct QueuedTask {
    task: Arc<Task>,
}

impl QueuedTask {
    fn key(&self) -> (u8, Instant, TaskId) {
        (self.task.priority.rank(), self.task.submit_time, self.task.id)
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.id == other.task.id
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed: the max-heap must surface the smallest (rank, time, id).
        other.key().cmp(&self.key())
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    counts: BTreeMap<Priority, usize>,
    stopped: bool,
}

impl QueueState {
    fn take_next(&mut self) -> Option<Arc<Task>> {
        let queued = self.heap.pop()?;
        if let Some(count) = self.counts.get_mut(&queued.task.priority) {
            *count = count.saturating_sub(1);
        }
        Some(queued.task)
    }
}

/// Blocking multi-level priority queue.
///
/// `stop()` is sticky: it wakes every blocked consumer, makes further pushes
/// fail, and makes pops return `None` once the queue has drained. Tasks that
/// were queued at the moment of `stop()` are kept; they can still be popped,
/// consumed after `resume()`, or discarded with `clear()`.
pub struct PriorityQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl PriorityQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                counts: BTreeMap::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue a task.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::QueueStopped` if the queue is stopped.
    pub fn push(&self, task: Arc<Task>) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(SchedulerError::QueueStopped);
            }
            *state.counts.entry(task.priority).or_insert(0) += 1;
            state.heap.push(QueuedTask { task });
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the most urgent task, blocking until one is available.
    ///
    /// Returns `None` only when the queue is stopped and empty.
    pub fn pop(&self) -> Option<Arc<Task>> {
        let mut state = self.state.lock();
        while state.heap.is_empty() && !state.stopped {
            self.not_empty.wait(&mut state);
        }
        state.take_next()
    }

    /// Dequeue the most urgent task without blocking.
    pub fn try_pop(&self) -> Option<Arc<Task>> {
        self.state.lock().take_next()
    }

    /// Dequeue the most urgent task, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout, or when the queue is stopped and empty.
    pub fn pop_with_timeout(&self, timeout: Duration) -> Option<Arc<Task>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.heap.is_empty() && !state.stopped {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let result = self.not_empty.wait_for(&mut state, deadline - now);
            if result.timed_out() && state.heap.is_empty() {
                return None;
            }
        }
        state.take_next()
    }

    /// Remove the task with the given id, preserving the relative order of
    /// the survivors. The heap is rebuilt, so this is O(n).
    pub fn remove(&self, id: TaskId) -> bool {
        let mut state = self.state.lock();
        let mut survivors = Vec::with_capacity(state.heap.len());
        let mut removed = None;
        for queued in state.heap.drain() {
            if queued.task.id == id {
                removed = Some(queued);
            } else {
                survivors.push(queued);
            }
        }
        state.heap = BinaryHeap::from(survivors);
        match removed {
            Some(queued) => {
                if let Some(count) = state.counts.get_mut(&queued.task.priority) {
                    *count = count.saturating_sub(1);
                }
                true
            }
            None => false,
        }
    }

    /// Discard every queued task.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.heap.clear();
        state.counts.clear();
    }

    /// Stop the queue: wake all blocked consumers and refuse further pushes.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            state.stopped = true;
        }
        self.not_empty.notify_all();
    }

    /// Clear the stop flag, allowing pushes and blocking pops again.
    pub fn resume(&self) {
        self.state.lock().stopped = false;
    }

    /// True if the queue is currently stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// True if no tasks are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued task count per priority level; every level is present.
    #[must_use]
    pub fn priority_distribution(&self) -> BTreeMap<Priority, usize> {
        let state = self.state.lock();
        Priority::ALL
            .iter()
            .map(|&p| (p, state.counts.get(&p).copied().unwrap_or(0)))
            .collect()
    }

    /// Ids of all queued tasks, in pop order.
    #[must_use]
    pub fn all_ids(&self) -> Vec<TaskId> {
        let state = self.state.lock();
        let mut keyed: Vec<_> = state.heap.iter().map(QueuedTask::key).collect();
        keyed.sort_unstable();
        keyed.into_iter().map(|(_, _, id)| id).collect()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
