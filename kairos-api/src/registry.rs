//! Process-wide registry of open delivery connections.
//!
//! The registry only knows about streams served by this process. Fan-out
//! across processes goes through the Redis channel; the bridge in
//! [`crate::fanout`] is the sole writer into the registry's senders.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing;
use uuid::Uuid;

pub type ConnectionId = Uuid;

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Vec<Connection>>,
    buffer: usize,
}

impl ConnectionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            buffer,
        }
    }

    /// Registers a new connection for a user. A user may hold any number of
    /// simultaneous connections; each receives the full event sequence.
    ///
    /// The returned guard unregisters the connection when dropped.
    pub fn register(self: &Arc<Self>, user_id: &str) -> (ConnectionGuard, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();

        self.connections
            .entry(user_id.to_string())
            .or_default()
            .push(Connection { id, tx });

        tracing::debug!("Delivery connection {} registered for user {}", id, user_id);

        let guard = ConnectionGuard {
            registry: Arc::clone(self),
            user_id: user_id.to_string(),
            id,
        };
        (guard, rx)
    }

    /// Removes a connection. Safe to call for a connection that is already
    /// gone; teardown may race between the transport hook and an error path.
    pub fn unregister(&self, user_id: &str, id: ConnectionId) {
        let emptied = match self.connections.get_mut(user_id) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|c| c.id != id);
                if before != list.len() {
                    tracing::debug!("Delivery connection {} unregistered for user {}", id, user_id);
                }
                list.is_empty()
            }
            None => false,
        };

        if emptied {
            self.connections.remove_if(user_id, |_, list| list.is_empty());
        }
    }

    /// Forwards a payload to every open connection for a user, in call
    /// order. Returns how many connections accepted it. A connection with a
    /// full buffer misses this event (best-effort live path); a closed one
    /// is pruned.
    pub fn dispatch(&self, user_id: &str, payload: &str) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        if let Some(list) = self.connections.get(user_id) {
            for conn in list.iter() {
                match conn.tx.try_send(payload.to_string()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            "Delivery connection {} buffer full, dropping event",
                            conn.id
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(conn.id);
                    }
                }
            }
        }

        for id in dead {
            self.unregister(user_id, id);
        }

        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }

    pub fn user_count(&self) -> usize {
        self.connections.len()
    }
}

/// Unregisters its connection on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    user_id: String,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.user_id, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_connection_of_a_user_receives_the_event() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_guard_a, mut rx_a) = registry.register("user-1");
        let (_guard_b, mut rx_b) = registry.register("user-1");

        assert_eq!(registry.dispatch("user-1", "payload"), 2);
        assert_eq!(rx_a.recv().await.unwrap(), "payload");
        assert_eq!(rx_b.recv().await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_guard, mut rx) = registry.register("user-1");

        registry.dispatch("user-1", "first");
        registry.dispatch("user-1", "second");
        registry.dispatch("user-1", "third");

        assert_eq!(rx.recv().await.unwrap(), "first");
        assert_eq!(rx.recv().await.unwrap(), "second");
        assert_eq!(rx.recv().await.unwrap(), "third");
    }

    #[tokio::test]
    async fn dispatch_does_not_cross_users() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_guard, mut rx) = registry.register("user-1");

        assert_eq!(registry.dispatch("user-2", "other"), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn guard_drop_unregisters_and_explicit_unregister_is_idempotent() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (guard, _rx) = registry.register("user-1");
        let id = guard.id();

        // Error path tears down first, then the guard drops. Both are safe.
        registry.unregister("user-1", id);
        assert_eq!(registry.connection_count(), 0);
        drop(guard);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.user_count(), 0);
    }

    #[tokio::test]
    async fn closed_receivers_are_pruned_on_dispatch() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_guard, rx) = registry.register("user-1");
        drop(rx);

        assert_eq!(registry.dispatch("user-1", "payload"), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn full_buffer_drops_the_event_but_keeps_the_connection() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let (_guard, mut rx) = registry.register("user-1");

        assert_eq!(registry.dispatch("user-1", "first"), 1);
        assert_eq!(registry.dispatch("user-1", "second"), 0);

        assert_eq!(rx.recv().await.unwrap(), "first");
        assert_eq!(registry.connection_count(), 1);
    }
}
