use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Unique identifier for a tracked connection
///
/// A connection that closes and reconnects during draining gets a fresh id;
/// ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    // Private constructor, only usable within our crate
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a connection currently has an in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Live connection with no request being processed
    Idle,
    /// Live connection currently processing a request
    Active,
}

/// A tracked connection entry
struct TrackedConnection {
    /// Idle/active state
    state: ConnectionState,
    /// Aborts the connection's serve task, destroying its socket
    abort: AbortHandle,
}

/// Records every live transport connection and its idle/active state.
///
/// The connection set is mutated by three actors: the accept loop (adds),
/// normal request completion (idle/active transitions and natural removal),
/// and the drain controller (forced and graceful removal). All mutations go
/// through the mutex here; it is never held across an await point.
///
/// The live-connection count is published on a `watch` channel so the drain
/// controller can await emptiness instead of polling.
pub struct ConnectionTracker {
    /// Tracked connections by id
    connections: Mutex<HashMap<ConnectionId, TrackedConnection>>,
    /// Publishes the live-connection count on every change
    live_tx: watch::Sender<usize>,
    /// Set once draining begins; connection tasks and the accept loop consult it
    draining: AtomicBool,
}

impl ConnectionTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        let (live_tx, _) = watch::channel(0);
        Self {
            connections: Mutex::new(HashMap::new()),
            live_tx,
            draining: AtomicBool::new(false),
        }
    }

    /// Register a newly accepted connection as idle.
    ///
    /// `abort` must terminate the connection's serve task (dropping its
    /// socket) when invoked. Registering an id twice is a bug in the caller;
    /// the duplicate is ignored and logged.
    pub fn register(&self, id: ConnectionId, abort: AbortHandle) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if connections.contains_key(&id) {
            tracing::warn!(connection_id = %id, "Duplicate connection registration ignored");
            return;
        }
        connections.insert(
            id,
            TrackedConnection {
                state: ConnectionState::Idle,
                abort,
            },
        );
        let _ = self.live_tx.send(connections.len());
        tracing::trace!(connection_id = %id, live = connections.len(), "Connection registered");
    }

    /// Mark a connection active: a request began processing on it.
    ///
    /// Unknown ids are ignored; the connection may already have been closed by
    /// the drain controller.
    pub fn mark_active(&self, id: ConnectionId) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conn) = connections.get_mut(&id) {
            conn.state = ConnectionState::Active;
        }
    }

    /// Mark a connection idle: its in-flight response has been fully sent.
    pub fn mark_idle(&self, id: ConnectionId) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conn) = connections.get_mut(&id) {
            conn.state = ConnectionState::Idle;
        }
    }

    /// Current state of a connection, if it is still tracked
    pub fn state_of(&self, id: ConnectionId) -> Option<ConnectionState> {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.get(&id).map(|conn| conn.state)
    }

    /// Snapshot of currently tracked connections and their states
    pub fn snapshot(&self) -> Vec<(ConnectionId, ConnectionState)> {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.iter().map(|(id, conn)| (*id, conn.state)).collect()
    }

    /// Number of currently tracked connections
    pub fn count(&self) -> usize {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.len()
    }

    /// Remove a connection that closed naturally.
    ///
    /// Safe to call multiple times; calls after the first are no-ops. Returns
    /// whether the connection was still tracked.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        let removed = connections.remove(&id).is_some();
        if removed {
            let _ = self.live_tx.send(connections.len());
            tracing::trace!(connection_id = %id, live = connections.len(), "Connection unregistered");
        }
        removed
    }

    /// Forcibly close a connection: remove it from the set and abort its
    /// serve task, destroying the underlying socket.
    ///
    /// A no-op when the id is no longer tracked (the connection already closed
    /// on its own), which is how a pending grace timer gets cancelled.
    pub(crate) fn close_now(&self, id: ConnectionId) {
        let entry = {
            let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            let entry = connections.remove(&id);
            if entry.is_some() {
                let _ = self.live_tx.send(connections.len());
            }
            entry
        };
        if let Some(conn) = entry {
            conn.abort.abort();
            tracing::debug!(connection_id = %id, "Connection closed by drain controller");
        }
    }

    /// Subscribe to live-connection count changes
    pub(crate) fn watch_live(&self) -> watch::Receiver<usize> {
        self.live_tx.subscribe()
    }

    /// Mark the start of draining. New connections are refused and serve tasks
    /// close their connection after finishing the in-flight response.
    pub(crate) fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    /// Whether draining has begun
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
