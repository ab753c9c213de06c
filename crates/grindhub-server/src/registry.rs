//! Connection Registry.
//!
//! The authoritative map from user identity to the one connection currently
//! bound to it. It holds identifiers only; sockets are owned by their
//! connection actors. The registry is owned by the hub task, so it needs no
//! locking.

use std::collections::HashMap;

use grindhub_shared::{ConnectionId, UserId};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_user: HashMap<UserId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user` to `conn`, replacing any earlier binding (last
    /// registration wins). Returns the replaced connection, if any.
    pub fn register(&mut self, user: UserId, conn: ConnectionId) -> Option<ConnectionId> {
        self.by_user.insert(user, conn)
    }

    /// Remove the binding for `user`. Absent users are a no-op.
    pub fn unregister(&mut self, user: &UserId) -> Option<ConnectionId> {
        self.by_user.remove(user)
    }

    /// Remove the binding for `user` only if it still points at `conn`.
    ///
    /// A connection that was superseded by a newer registration for the same
    /// user must not evict the newer one when it closes.
    pub fn unregister_connection(&mut self, user: &UserId, conn: ConnectionId) -> bool {
        if self.by_user.get(user) == Some(&conn) {
            self.by_user.remove(user);
            true
        } else {
            false
        }
    }

    pub fn lookup(&self, user: &UserId) -> Option<ConnectionId> {
        self.by_user.get(user).copied()
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.by_user.contains_key(user)
    }

    /// The online-presence set, sorted for stable payloads.
    pub fn current_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.by_user.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(ids: &[&str]) -> Vec<UserId> {
        ids.iter().map(|s| UserId::new(*s)).collect()
    }

    #[test]
    fn current_users_tracks_registrations() {
        let mut registry = ConnectionRegistry::new();
        registry.register("u2".into(), ConnectionId::new());
        registry.register("u1".into(), ConnectionId::new());
        registry.register("u3".into(), ConnectionId::new());
        assert_eq!(registry.current_users(), users(&["u1", "u2", "u3"]));

        registry.unregister(&"u2".into());
        assert_eq!(registry.current_users(), users(&["u1", "u3"]));

        assert_eq!(registry.unregister(&"u2".into()), None);
        assert_eq!(registry.current_users(), users(&["u1", "u3"]));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = ConnectionRegistry::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        assert_eq!(registry.register("u1".into(), first), None);
        assert_eq!(registry.register("u1".into(), second), Some(first));
        assert_eq!(registry.lookup(&"u1".into()), Some(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_connection_does_not_evict_newer_one() {
        let mut registry = ConnectionRegistry::new();
        let old = ConnectionId::new();
        let new = ConnectionId::new();
        registry.register("u1".into(), old);
        registry.register("u1".into(), new);

        assert!(!registry.unregister_connection(&"u1".into(), old));
        assert!(registry.is_online(&"u1".into()));

        assert!(registry.unregister_connection(&"u1".into(), new));
        assert!(registry.is_empty());
    }
}
