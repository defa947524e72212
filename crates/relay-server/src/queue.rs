//! Pending-action queue between connection tasks and the host tick.
//!
//! Any number of [`Producer`]s push; a single consumer drains in FIFO order
//! with a per-call budget so one tick never runs unbounded.

use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::warn;

use crate::connection::Connection;

/// A text message received from a tool, waiting to be executed.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub message: String,
    /// Connection the message arrived on; responses go back here.
    pub origin: Arc<Connection>,
}

impl PendingAction {
    pub fn new(message: String, origin: Arc<Connection>) -> Self {
        Self { message, origin }
    }
}

/// Multi-producer, single-consumer FIFO of pending work.
pub struct ActionQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> ActionQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Handle for pushing from other tasks.
    pub fn producer(&self) -> Producer<T> {
        Producer {
            tx: self.tx.clone(),
        }
    }

    pub fn push(&self, item: T) {
        // The queue owns a receiver, so the channel cannot be closed here.
        let _ = self.tx.send(item);
    }

    /// Runs `handle` on up to `max` queued items in FIFO order and returns
    /// how many were taken.
    ///
    /// A failing item is logged and does not stop the drain. Items pushed
    /// while draining are picked up if the budget allows.
    pub fn drain_up_to<E, F>(&self, max: usize, mut handle: F) -> usize
    where
        E: Display,
        F: FnMut(T) -> Result<(), E>,
    {
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut processed = 0;
        while processed < max {
            let Ok(item) = rx.try_recv() else {
                break;
            };
            processed += 1;
            if let Err(e) = handle(item) {
                warn!("pending action failed: {e}");
            }
        }
        processed
    }

    pub fn len(&self) -> usize {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ActionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable push handle onto an [`ActionQueue`].
pub struct Producer<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Producer<T> {
    /// Returns `false` if the queue has been dropped.
    pub fn push(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(queue: &ActionQueue<u32>, max: usize) -> Vec<u32> {
        let mut out = Vec::new();
        queue.drain_up_to(max, |n| {
            out.push(n);
            Ok::<(), String>(())
        });
        out
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = ActionQueue::new();
        for n in 1..=3 {
            queue.push(n);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(collect(&queue, 10), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn respects_budget() {
        let queue = ActionQueue::new();
        for n in 0..120 {
            queue.push(n);
        }
        assert_eq!(collect(&queue, 50).len(), 50);
        assert_eq!(collect(&queue, 50), (50..100).collect::<Vec<_>>());
        assert_eq!(collect(&queue, 50).len(), 20);
        assert_eq!(collect(&queue, 50), Vec::<u32>::new());
    }

    #[test]
    fn zero_budget_takes_nothing() {
        let queue = ActionQueue::new();
        queue.push(1);
        assert_eq!(collect(&queue, 0), Vec::<u32>::new());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn failing_item_does_not_stop_drain() {
        let queue = ActionQueue::new();
        for n in 1..=4 {
            queue.push(n);
        }
        let mut seen = Vec::new();
        let taken = queue.drain_up_to(10, |n| {
            seen.push(n);
            if n == 2 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(taken, 4);
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn producers_from_many_tasks() {
        let queue = ActionQueue::new();
        let mut tasks = Vec::new();
        for t in 0..4u32 {
            let producer = queue.producer();
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    assert!(producer.push(t * 100 + i));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut all = collect(&queue, usize::MAX);
        assert_eq!(all.len(), 100);

        // Per-producer order survives interleaving.
        for t in 0..4u32 {
            let mine: Vec<_> = all.iter().copied().filter(|n| n / 100 == t).collect();
            assert_eq!(mine, (0..25).map(|i| t * 100 + i).collect::<Vec<_>>());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 100);
    }

    #[test]
    fn producer_push_fails_after_queue_dropped() {
        let queue = ActionQueue::<u32>::new();
        let producer = queue.producer();
        drop(queue);
        assert!(!producer.push(1));
    }
}
