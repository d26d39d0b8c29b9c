//! FIFO backlog of documents awaiting extraction

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::types::DocumentFile;

/// A document queued for extraction, tagged with its permanent output position
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub file: DocumentFile,
    pub original_index: usize,
}

impl WorkItem {
    pub fn new(file: DocumentFile, original_index: usize) -> Self {
        Self { file, original_index }
    }

    /// Filename shortcut for logging
    pub fn filename(&self) -> &str {
        &self.file.name
    }
}

/// Work queue shared by all workers of one run.
///
/// `take_next` pops under the lock, so concurrent workers never claim the
/// same item.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a queue from a batch of items
    pub fn from_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let queue = Self::new();
        queue.enqueue(items);
        queue
    }

    /// Append items in order
    pub fn enqueue(&self, items: impl IntoIterator<Item = WorkItem>) {
        self.items.lock().extend(items);
    }

    /// Claim the next item, or `None` once drained
    pub fn take_next(&self) -> Option<WorkItem> {
        self.items.lock().pop_front()
    }

    /// Items still waiting
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
