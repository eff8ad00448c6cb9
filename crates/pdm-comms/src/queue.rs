//! Bounded drop-oldest frame queue

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Bounded FIFO shared between a producer callback and one async consumer
///
/// `push` never blocks: when full, the oldest item is discarded and counted.
#[derive(Debug)]
pub struct FrameQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> FrameQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an item; returns false when an older item was dropped for it
    pub fn push(&self, item: T) -> bool {
        let kept_all = {
            let mut items = self.items.lock();
            let kept_all = if items.len() >= self.capacity {
                items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            } else {
                true
            };
            items.push_back(item);
            kept_all
        };
        self.notify.notify_one();
        kept_all
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Wait for the next item
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop() {
                return item;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items discarded on overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}
