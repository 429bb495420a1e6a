//! In-memory registry of connected runner WebSocket sessions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::frame::RunnerFrame;

pub type RunnerSink = mpsc::Sender<RunnerFrame>;

/// Key a connection by (owner, runner) rather than just runner id: two
/// different owners could otherwise register runners with colliding
/// ids, and a job dispatch always knows both from the `Runner` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub owner_id: String,
    pub runner_id: String,
}

pub struct Connection {
    pub session_id: uuid::Uuid,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub sink: RunnerSink,
}

/// Thread-safe registry of currently-connected runners.
///
/// A runner reconnecting under the same `(owner_id, runner_id)`
/// displaces its previous connection: the old sink is dropped (which
/// closes its writer task) and in-flight jobs against the stale
/// session are left for the dispatcher's own pending-request tracking
/// to time out, rather than being force-failed here.
#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionKey, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, displacing any existing one for the
    /// same key. Returns the displaced connection, if any.
    pub fn register(&self, key: ConnectionKey, conn: Connection) -> Option<Connection> {
        let displaced = self.connections.write().insert(key, conn);
        displaced
    }

    pub fn remove(&self, key: &ConnectionKey) -> Option<Connection> {
        self.connections.write().remove(key)
    }

    /// Remove a connection only if it's still the one with the given
    /// session id — guards against a handler that's winding down
    /// racing a newer reconnect and deregistering the wrong session.
    pub fn remove_if_current(&self, key: &ConnectionKey, session_id: uuid::Uuid) -> bool {
        let mut connections = self.connections.write();
        match connections.get(key) {
            Some(conn) if conn.session_id == session_id => {
                connections.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn touch(&self, key: &ConnectionKey) {
        if let Some(conn) = self.connections.write().get_mut(key) {
            conn.last_heartbeat_at = Utc::now();
        }
    }

    pub fn sink(&self, key: &ConnectionKey) -> Option<RunnerSink> {
        self.connections.read().get(key).map(|c| c.sink.clone())
    }

    pub fn is_connected(&self, key: &ConnectionKey) -> bool {
        self.connections.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Drop connections whose last heartbeat is older than `timeout_secs`.
    pub fn prune_stale(&self, timeout_secs: i64) -> usize {
        let now = Utc::now();
        let mut connections = self.connections.write();
        let before = connections.len();
        connections.retain(|_, conn| {
            now.signed_duration_since(conn.last_heartbeat_at).num_seconds() < timeout_secs
        });
        before - connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(owner: &str, runner: &str) -> ConnectionKey {
        ConnectionKey {
            owner_id: owner.into(),
            runner_id: runner.into(),
        }
    }

    fn make_conn() -> (Connection, mpsc::Receiver<RunnerFrame>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Connection {
                session_id: uuid::Uuid::new_v4(),
                connected_at: Utc::now(),
                last_heartbeat_at: Utc::now(),
                sink: tx,
            },
            rx,
        )
    }

    #[test]
    fn register_and_lookup() {
        let mgr = ConnectionManager::new();
        let (conn, _rx) = make_conn();
        let k = key("alice", "r1");
        assert!(mgr.register(k.clone(), conn).is_none());
        assert!(mgr.is_connected(&k));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn reconnect_displaces_previous_session() {
        let mgr = ConnectionManager::new();
        let k = key("alice", "r1");
        let (conn1, _rx1) = make_conn();
        let first_session = conn1.session_id;
        mgr.register(k.clone(), conn1);

        let (conn2, _rx2) = make_conn();
        let second_session = conn2.session_id;
        let displaced = mgr.register(k.clone(), conn2);

        assert!(displaced.is_some());
        assert_eq!(displaced.unwrap().session_id, first_session);
        assert_eq!(mgr.len(), 1);

        // The stale session's own remove_if_current must no-op now.
        assert!(!mgr.remove_if_current(&k, first_session));
        assert!(mgr.remove_if_current(&k, second_session));
        assert!(!mgr.is_connected(&k));
    }

    #[test]
    fn different_owners_same_runner_id_do_not_collide() {
        let mgr = ConnectionManager::new();
        let (conn_a, _rx_a) = make_conn();
        let (conn_b, _rx_b) = make_conn();
        mgr.register(key("alice", "r1"), conn_a);
        mgr.register(key("bob", "r1"), conn_b);
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn prune_stale_removes_dead_heartbeats() {
        let mgr = ConnectionManager::new();
        let (mut conn, _rx) = make_conn();
        conn.last_heartbeat_at = Utc::now() - chrono::Duration::seconds(120);
        mgr.register(key("alice", "r1"), conn);
        let pruned = mgr.prune_stale(60);
        assert_eq!(pruned, 1);
        assert!(mgr.is_empty());
    }
}
