//! Deferred-work scheduler.
//!
//! All deferred behavior in the coordinator (debounced saves, the periodic
//! persistence interval, delayed scroll restore, catch-up restore for editors
//! that mount late) is modeled as pending tasks with a due time rather than
//! ambient timers. The host drives the scheduler by calling the coordinator's
//! `tick()`; teardown cancels every pending task deterministically instead of
//! relying on cleanup-callback discipline.
//!
//! Tasks are one-shot. Recurring work is re-armed by the caller after each
//! firing.

use chrono::{DateTime, Utc};

/// Handle to a pending task, usable to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskToken(u64);

#[derive(Debug)]
struct Task<K> {
    id: u64,
    due_at: DateTime<Utc>,
    kind: K,
}

#[derive(Debug)]
pub struct Scheduler<K> {
    next_id: u64,
    tasks: Vec<Task<K>>,
}

impl<K> Scheduler<K> {
    pub fn new() -> Self {
        Scheduler {
            next_id: 0,
            tasks: Vec::new(),
        }
    }

    pub fn schedule_at(&mut self, due_at: DateTime<Utc>, kind: K) -> TaskToken {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(Task { id, due_at, kind });
        TaskToken(id)
    }

    /// Cancelling an already-fired or unknown token is a no-op.
    pub fn cancel(&mut self, token: TaskToken) {
        self.tasks.retain(|t| t.id != token.0);
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    /// Removes and returns every task due at or before `now`, ordered by due
    /// time (scheduling order breaks ties).
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<K> {
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(self.tasks.len());
        for task in self.tasks.drain(..) {
            if task.due_at <= now {
                due.push(task);
            } else {
                remaining.push(task);
            }
        }
        self.tasks = remaining;
        due.sort_by_key(|t| (t.due_at, t.id));
        due.into_iter().map(|t| t.kind).collect()
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

impl<K> Default for Scheduler<K> {
    fn default() -> Self {
        Scheduler::new()
    }
}
