//! Reorder buffer for results that complete out of task-id order.
//!
//! Workers finish in any order; the frontend inserts each result under its
//! task id and pops them strictly in ascending order. The BTreeMap keeps the
//! pending results sorted so the next one is always the first entry.

use std::collections::BTreeMap;

#[derive(Debug)]
pub struct ReorderBuffer<T> {
    /// Next task id to hand out.
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        ReorderBuffer {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// The done cursor: id of the next result `pop_ready` will return.
    pub fn next_id(&self) -> u64 {
        self.next
    }

    /// Store the result of `task_id`. Ids already popped or already stored
    /// are refused and handed back.
    pub fn insert(&mut self, task_id: u64, item: T) -> Result<(), T> {
        if task_id < self.next || self.pending.contains_key(&task_id) {
            return Err(item);
        }
        self.pending.insert(task_id, item);
        Ok(())
    }

    /// The result at the cursor, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<T> {
        let entry = self.pending.first_entry()?;
        if *entry.key() != self.next {
            return None;
        }
        self.next += 1;
        Some(entry.remove())
    }

    /// Results waiting for an earlier task.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
