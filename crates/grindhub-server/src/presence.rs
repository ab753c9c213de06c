//! Presence Broadcaster.
//!
//! Decides when the full online-user list has to be pushed to every
//! connected client. Payloads are always a complete snapshot of the
//! registry so recipients replace their local set wholesale.
//!
//! With coalescing disabled each registry mutation yields one broadcast.
//! With coalescing enabled mutations only mark the set dirty and the hub
//! calls [`PresenceBroadcaster::flush`] once it has drained the commands
//! that were already queued.

use grindhub_shared::ServerEvent;

use crate::registry::ConnectionRegistry;

#[derive(Debug)]
pub struct PresenceBroadcaster {
    coalesce: bool,
    dirty: bool,
}

impl PresenceBroadcaster {
    pub fn new(coalesce: bool) -> Self {
        Self {
            coalesce,
            dirty: false,
        }
    }

    pub fn coalescing(&self) -> bool {
        self.coalesce
    }

    /// Record a register/unregister. Returns the event to broadcast right
    /// away, or `None` when the broadcast is deferred to [`Self::flush`].
    pub fn changed(&mut self, registry: &ConnectionRegistry) -> Option<ServerEvent> {
        if self.coalesce {
            self.dirty = true;
            None
        } else {
            Some(snapshot(registry))
        }
    }

    /// Emit the deferred broadcast, if any change happened since the last
    /// flush.
    pub fn flush(&mut self, registry: &ConnectionRegistry) -> Option<ServerEvent> {
        if std::mem::take(&mut self.dirty) {
            Some(snapshot(registry))
        } else {
            None
        }
    }
}

pub fn snapshot(registry: &ConnectionRegistry) -> ServerEvent {
    ServerEvent::OnlineUsersChanged(registry.current_users())
}
