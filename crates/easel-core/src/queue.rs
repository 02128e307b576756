//! Pending-task priority queue.
//!
//! Holds task ids plus their ordering keys only; the record store stays the
//! single source of truth for task state. Positions are derived from the
//! ordered structure on demand and never persisted, so they cannot go stale.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Ordering key: higher priority first, FIFO within a priority tier.
///
/// `seq` is a process-local monotonic counter rather than a wall-clock
/// timestamp, so two submissions in the same millisecond still have a total
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueKey {
    priority: i64,
    seq: u64,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse on priority so iteration starts at the highest priority;
        // seq ascending breaks ties in submission order.
        other
            .priority
            .cmp(&self.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// In-memory ordering over the pending set.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    ordered: BTreeMap<QueueKey, String>,
    keys: HashMap<String, QueueKey>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task id at the back of its priority tier.
    pub fn enqueue(&mut self, id: impl Into<String>, priority: i64) {
        let id = id.into();
        debug_assert!(!self.keys.contains_key(&id), "task enqueued twice: {id}");
        let key = QueueKey {
            priority,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.keys.insert(id.clone(), key);
        self.ordered.insert(key, id);
    }

    /// Remove and return the task that should run next.
    pub fn pop_next(&mut self) -> Option<String> {
        let key = *self.ordered.keys().next()?;
        let id = self.ordered.remove(&key)?;
        self.keys.remove(&id);
        Some(id)
    }

    /// Remove an arbitrary pending id. Returns `false` if it is not queued.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.keys.remove(id) {
            Some(key) => {
                self.ordered.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Re-rank a task. The task re-enters at the back of its new tier, the
    /// same as a fresh submission would: a priority-only edit forfeits the
    /// original submission slot. Returns `false` if the id is not queued.
    pub fn reorder(&mut self, id: &str, new_priority: i64) -> bool {
        if !self.remove(id) {
            return false;
        }
        self.enqueue(id, new_priority);
        true
    }

    /// 1-based rank of every pending task, consistent with pop order.
    pub fn positions(&self) -> HashMap<String, usize> {
        self.ordered
            .values()
            .enumerate()
            .map(|(index, id)| (id.clone(), index + 1))
            .collect()
    }

    /// 1-based rank of a single task, if it is pending.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.ordered
            .values()
            .position(|queued| queued == id)
            .map(|index| index + 1)
    }

    /// Snapshot of all pending ids in pop order.
    pub fn ordered_ids(&self) -> Vec<String> {
        self.ordered.values().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
