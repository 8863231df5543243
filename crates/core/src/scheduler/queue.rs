//! Shared work queues.

use std::collections::VecDeque;
use std::sync::Mutex;

/// A multi-producer multi-consumer FIFO with non-blocking pop.
///
/// Workers poll with [`WorkQueue::try_pop`] and sleep between attempts; the
/// lock is never held across an await point.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
}

// Manual impl: an empty queue needs no `T: Default`.
impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().expect("queue lock poisoned").push_back(item);
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().expect("queue lock poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.items
            .lock()
            .expect("queue lock poisoned")
            .drain(..)
            .collect()
    }
}
