//! Registry of live connections indexed by connection ID, user ID and
//! display name.
//!
//! All three indices sit behind one `RwLock`, so a reader never sees a
//! connection in one index but not the others. Locks are synchronous and
//! never held across an `.await`. Lock order is registry, then the
//! connection's own queue mutex.

use std::collections::HashMap;
use std::sync::Arc;

use chathub_core::ConnectionId;
use chathub_settings::DuplicatePolicy;
use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::connection::ClientConnection;
use crate::metrics::WS_SUPERSEDED_TOTAL;

/// Outcome of [`ConnectionRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The connection is now live. `superseded` prior holders were closed.
    Registered {
        /// Connections displaced under [`DuplicatePolicy::Supersede`].
        superseded: usize,
    },
    /// The connection was refused and nothing changed.
    Rejected,
}

#[derive(Default)]
struct Indices {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    by_user: HashMap<String, Arc<ClientConnection>>,
    by_name: HashMap<String, Arc<ClientConnection>>,
}

impl Indices {
    /// Distinct connections currently holding the user ID or the name.
    fn holders_of(&self, conn: &ClientConnection) -> Vec<Arc<ClientConnection>> {
        let mut holders: Vec<Arc<ClientConnection>> = Vec::with_capacity(2);
        for holder in [
            self.by_user.get(conn.user_id()),
            self.by_name.get(conn.username()),
        ]
        .into_iter()
        .flatten()
        {
            if !holders.iter().any(|h| h.id == holder.id) {
                holders.push(Arc::clone(holder));
            }
        }
        holders
    }

    fn insert(&mut self, conn: &Arc<ClientConnection>) {
        let _ = self.connections.insert(conn.id.clone(), Arc::clone(conn));
        let _ = self
            .by_user
            .insert(conn.user_id().to_owned(), Arc::clone(conn));
        let _ = self
            .by_name
            .insert(conn.username().to_owned(), Arc::clone(conn));
    }

    /// Remove `conn` wherever it is still the current holder.
    fn remove(&mut self, conn: &ClientConnection) -> bool {
        let removed = self.connections.remove(&conn.id).is_some();
        if self
            .by_user
            .get(conn.user_id())
            .is_some_and(|c| c.id == conn.id)
        {
            let _ = self.by_user.remove(conn.user_id());
        }
        if self
            .by_name
            .get(conn.username())
            .is_some_and(|c| c.id == conn.id)
        {
            let _ = self.by_name.remove(conn.username());
        }
        removed
    }
}

/// The authoritative set of connected sessions.
pub struct ConnectionRegistry {
    indices: RwLock<Indices>,
    policy: DuplicatePolicy,
}

impl ConnectionRegistry {
    /// Create an empty registry with the given duplicate-identity policy.
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            indices: RwLock::new(Indices::default()),
            policy,
        }
    }

    /// Duplicate-identity policy in force.
    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Insert a connection into every index.
    ///
    /// When another connection already owns the same user ID or display
    /// name, the policy decides: `Supersede` removes and closes the prior
    /// holders inside the same critical section, `RejectSecond` leaves
    /// everything untouched. A connection that is already closed is always
    /// rejected.
    pub fn register(&self, conn: &Arc<ClientConnection>) -> Registration {
        let mut indices = self.indices.write();

        if conn.is_closed() {
            return Registration::Rejected;
        }
        if indices.connections.contains_key(&conn.id) {
            return Registration::Registered { superseded: 0 };
        }

        let holders = indices.holders_of(conn);
        if !holders.is_empty() && self.policy == DuplicatePolicy::RejectSecond {
            info!(
                conn_id = %conn.id,
                user = conn.username(),
                "duplicate identity rejected"
            );
            return Registration::Rejected;
        }

        for holder in &holders {
            let _ = indices.remove(holder);
            let _ = holder.close();
            counter!(WS_SUPERSEDED_TOTAL).increment(1);
            info!(
                conn_id = %holder.id,
                replaced_by = %conn.id,
                user = holder.username(),
                "connection superseded"
            );
        }

        indices.insert(conn);
        if !conn.mark_registered() {
            // Closed between the check above and now.
            let _ = indices.remove(conn);
            return Registration::Rejected;
        }
        debug!(conn_id = %conn.id, user = conn.username(), "connection registered");
        Registration::Registered {
            superseded: holders.len(),
        }
    }

    /// Remove a connection from every index it still owns and close its
    /// outbound queue.
    ///
    /// Index entries already taken over by a newer connection are left
    /// alone. The queue is closed even when the connection was no longer
    /// registered. Returns whether this call removed it.
    pub fn unregister(&self, conn: &ClientConnection) -> bool {
        let removed = {
            let mut indices = self.indices.write();
            let removed = indices.remove(conn);
            let _ = conn.close();
            removed
        };
        if removed {
            debug!(conn_id = %conn.id, user = conn.username(), "connection unregistered");
        }
        removed
    }

    /// Connection owned by a user ID.
    pub fn lookup_by_user(&self, user_id: &str) -> Option<Arc<ClientConnection>> {
        self.indices.read().by_user.get(user_id).cloned()
    }

    /// Connection owned by a display name.
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<ClientConnection>> {
        self.indices.read().by_name.get(name).cloned()
    }

    /// Connection by its ID.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.indices.read().connections.get(id).cloned()
    }

    /// Display names of every live connection, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().by_name.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// All live connections at the time of the call.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.indices.read().connections.values().cloned().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.indices.read().connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregister and close every connection. Returns how many were removed.
    pub fn close_all(&self) -> usize {
        let drained = {
            let mut indices = self.indices.write();
            indices.by_user.clear();
            indices.by_name.clear();
            let drained: Vec<_> = indices.connections.drain().map(|(_, c)| c).collect();
            for conn in &drained {
                let _ = conn.close();
            }
            drained
        };
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all connections");
        }
        drained.len()
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let indices = self.indices.read();
        assert_eq!(indices.connections.len(), indices.by_user.len());
        assert_eq!(indices.connections.len(), indices.by_name.len());
        for conn in indices.connections.values() {
            assert!(!conn.is_closed(), "closed connection still indexed");
            assert_eq!(indices.by_user[conn.user_id()].id, conn.id);
            assert_eq!(indices.by_name[conn.username()].id, conn.id);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}
