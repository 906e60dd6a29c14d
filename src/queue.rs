//! Priority-ordered queue of conversion jobs waiting for a worker.

use crate::job::Priority;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A queued item tagged with its priority and submission sequence number.
///
/// Entries are ordered by priority (higher first), then by sequence number
/// (FIFO within the same priority).
#[derive(Debug)]
pub struct QueueEntry<T> {
    pub priority: Priority,
    pub sequence: u64,
    pub item: T,
}

impl<T> PartialEq for QueueEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for QueueEntry<T> {}

impl<T> PartialOrd for QueueEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then lower sequence (older) first
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other_ordering => other_ordering,
        }
    }
}

/// In-memory job queue drained by the worker pool.
///
/// Not synchronized on its own; the engine guards it with its pool lock.
#[derive(Debug)]
pub struct JobQueue<T> {
    heap: BinaryHeap<QueueEntry<T>>,
    next_sequence: u64,
}

impl<T> JobQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Enqueues an item and returns its submission sequence number.
    pub fn enqueue(&mut self, item: T, priority: Priority) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueueEntry {
            priority,
            sequence,
            item,
        });
        sequence
    }

    /// Removes the highest priority, earliest submitted entry.
    pub fn dequeue(&mut self) -> Option<QueueEntry<T>> {
        self.heap.pop()
    }

    /// Removes every entry whose item matches `predicate`.
    ///
    /// Returns the number of removed entries.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.heap.len();
        self.heap.retain(|entry| !predicate(&entry.item));
        before - self.heap.len()
    }

    /// Empties the queue, returning the items in dispatch order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            items.push(entry.item);
        }
        items
    }

    /// Returns the current queue length.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
