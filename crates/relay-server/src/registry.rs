//! Registry of open tool connections, in registration order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use vibelink_protocol::frame;

use crate::connection::{Connection, ConnectionId, FrameBytes};

#[derive(Default)]
pub struct Registry {
    conns: Mutex<Vec<Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Connection>>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, conn: Arc<Connection>) {
        debug!(conn = %conn.id(), "registered");
        self.lock().push(conn);
    }

    /// Returns whether `id` was registered.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut conns = self.lock();
        let before = conns.len();
        conns.retain(|c| c.id() != id);
        before != conns.len()
    }

    /// Drops connections whose socket is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        retain_connected(&mut self.lock())
    }

    /// Sends `text` to every open connection. Returns how many accepted it.
    pub fn broadcast(&self, text: &str) -> usize {
        self.broadcast_filtered(text, None)
    }

    /// Sends `text` to every open connection except `skip`.
    pub fn broadcast_except(&self, text: &str, skip: ConnectionId) -> usize {
        self.broadcast_filtered(text, Some(skip))
    }

    /// Prunes, encodes and queues under a single lock, so concurrent
    /// broadcasts reach every peer in the same order.
    fn broadcast_filtered(&self, text: &str, skip: Option<ConnectionId>) -> usize {
        let mut conns = self.lock();
        retain_connected(&mut conns);
        if conns.iter().all(|c| Some(c.id()) == skip) {
            return 0;
        }

        // Encoded once; every connection queues the same bytes.
        let bytes: FrameBytes = frame::encode_text(text.as_bytes()).into();
        conns
            .iter()
            .filter(|c| Some(c.id()) != skip)
            .filter(|c| c.send_frame(Arc::clone(&bytes)).is_ok())
            .count()
    }

    /// Closes and forgets every connection.
    pub fn close_all(&self) -> usize {
        let conns = std::mem::take(&mut *self.lock());
        for conn in &conns {
            conn.close();
        }
        conns.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids in registration order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.lock().iter().map(|c| c.id()).collect()
    }
}

fn retain_connected(conns: &mut Vec<Arc<Connection>>) -> usize {
    let before = conns.len();
    conns.retain(|c| c.is_connected());
    let removed = before - conns.len();
    if removed > 0 {
        debug!(removed, "pruned dead connections");
    }
    removed
}
