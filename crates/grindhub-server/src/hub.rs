//! Real-time hub.
//!
//! A single tokio task owns the [`ConnectionRegistry`], the table of
//! per-connection event sinks and the room-channel subscriptions. Every
//! connection actor talks to it through [`HubCommand`]s on one queue, so
//! registry mutation, presence broadcast and fan-out are processed one
//! command at a time without locks. The hub never awaits anything but its
//! own queue: membership reads happen in the actors and persistence is
//! handed to the writer task.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use grindhub_shared::{ConnectionId, DirectMessage, RoomId, RoomMessage, ServerEvent, UserId};
use grindhub_store::Message;

use crate::persist::PersistHandle;
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionRegistry;
use crate::relay;

/// Outbound event queue of one connection; drained by its writer task.
pub type EventSink = mpsc::UnboundedSender<ServerEvent>;

const HUB_QUEUE_SIZE: usize = 1024;

/// Upper bound on commands folded into one presence flush.
const MAX_BATCH: usize = 256;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum HubCommand {
    /// A transport finished its handshake. `user` is `None` when the client
    /// supplied no identity; such connections still receive broadcasts but
    /// are never registered.
    Connect {
        conn: ConnectionId,
        user: Option<UserId>,
        sink: EventSink,
    },
    /// A transport closed, errored or timed out.
    Disconnect {
        conn: ConnectionId,
        user: Option<UserId>,
    },
    JoinChannel {
        conn: ConnectionId,
        user: UserId,
        room_id: RoomId,
    },
    LeaveChannel {
        conn: ConnectionId,
        user: UserId,
        room_id: RoomId,
    },
    /// An admitted room message with the membership read used to admit it.
    RelayRoom {
        origin: ConnectionId,
        message: RoomMessage,
        members: Vec<UserId>,
    },
    RelayDirect {
        origin: ConnectionId,
        message: DirectMessage,
    },
    /// Snapshot of the online-presence set.
    OnlineUsers(oneshot::Sender<Vec<UserId>>),
}

/// Cloneable sender side of the hub queue.
#[derive(Clone, Debug)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Queue a command. Returns `false` once the hub has stopped.
    pub async fn send(&self, cmd: HubCommand) -> bool {
        self.tx.send(cmd).await.is_ok()
    }

    pub async fn online_users(&self) -> Option<Vec<UserId>> {
        let (reply, rx) = oneshot::channel();
        if !self.send(HubCommand::OnlineUsers(reply)).await {
            return None;
        }
        rx.await.ok()
    }
}

/// Spawn the hub task.
pub fn spawn_hub(coalesce: bool, persist: PersistHandle) -> HubHandle {
    let (tx, mut rx) = mpsc::channel::<HubCommand>(HUB_QUEUE_SIZE);

    tokio::spawn(async move {
        let mut hub = Hub::new(coalesce, persist);
        info!(coalesce, "Hub started");

        while let Some(cmd) = rx.recv().await {
            hub.handle(cmd);

            if hub.presence.coalescing() {
                for _ in 0..MAX_BATCH {
                    match rx.try_recv() {
                        Ok(cmd) => hub.handle(cmd),
                        Err(_) => break,
                    }
                }
            }
            hub.end_batch();
        }

        info!("Hub queue closed, shutting down");
    });

    HubHandle { tx }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

pub struct Hub {
    registry: ConnectionRegistry,
    presence: PresenceBroadcaster,
    sinks: HashMap<ConnectionId, EventSink>,
    /// Room channel subscribers, used for join/leave notices.
    channels: HashMap<RoomId, HashMap<ConnectionId, UserId>>,
    persist: PersistHandle,
}

impl Hub {
    pub fn new(coalesce: bool, persist: PersistHandle) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            presence: PresenceBroadcaster::new(coalesce),
            sinks: HashMap::new(),
            channels: HashMap::new(),
            persist,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { conn, user, sink } => self.connect(conn, user, sink),
            HubCommand::Disconnect { conn, user } => self.disconnect(conn, user),
            HubCommand::JoinChannel {
                conn,
                user,
                room_id,
            } => {
                let subscribers = self.channels.entry(room_id).or_default();
                if subscribers.insert(conn, user.clone()).is_none() {
                    debug!(room = %room_id, user = %user, "joined room channel");
                    self.notify_channel(room_id, conn, ServerEvent::UserJoinedRoom { room_id, user_id: user });
                }
            }
            HubCommand::LeaveChannel {
                conn,
                user,
                room_id,
            } => {
                if self.leave_channel(room_id, conn) {
                    debug!(room = %room_id, user = %user, "left room channel");
                    self.notify_channel(room_id, conn, ServerEvent::UserLeftRoom { room_id, user_id: user });
                }
            }
            HubCommand::RelayRoom {
                origin,
                message,
                members,
            } => self.relay_room(origin, message, members),
            HubCommand::RelayDirect { origin, message } => self.relay_direct(origin, message),
            HubCommand::OnlineUsers(reply) => {
                let _ = reply.send(self.registry.current_users());
            }
        }
    }

    /// Emit the presence broadcast deferred while coalescing.
    pub fn end_batch(&mut self) {
        if let Some(event) = self.presence.flush(&self.registry) {
            self.broadcast(&event);
        }
    }

    fn connect(&mut self, conn: ConnectionId, user: Option<UserId>, sink: EventSink) {
        self.sinks.insert(conn, sink);

        let Some(user) = user else {
            debug!(conn = %conn, "anonymous connection, not registered");
            return;
        };

        if let Some(previous) = self.registry.register(user.clone(), conn) {
            if previous != conn {
                info!(user_id = %user, old = %previous, new = %conn, "registration superseded");
            }
        }
        info!(user_id = %user, conn = %conn, online = self.registry.len(), "user online");

        if let Some(event) = self.presence.changed(&self.registry) {
            self.broadcast(&event);
        }
    }

    fn disconnect(&mut self, conn: ConnectionId, user: Option<UserId>) {
        self.sinks.remove(&conn);

        let rooms: Vec<RoomId> = self
            .channels
            .iter()
            .filter(|(_, subs)| subs.contains_key(&conn))
            .map(|(room, _)| *room)
            .collect();
        for room_id in rooms {
            self.leave_channel(room_id, conn);
        }

        let Some(user) = user else { return };

        // A superseded connection closing leaves the newer binding alone.
        if !self.registry.unregister_connection(&user, conn) {
            debug!(user_id = %user, conn = %conn, "stale connection closed");
            return;
        }
        info!(user_id = %user, conn = %conn, online = self.registry.len(), "user offline");

        if let Some(event) = self.presence.changed(&self.registry) {
            self.broadcast(&event);
        }
    }

    fn leave_channel(&mut self, room_id: RoomId, conn: ConnectionId) -> bool {
        let Some(subscribers) = self.channels.get_mut(&room_id) else {
            return false;
        };
        let removed = subscribers.remove(&conn).is_some();
        if subscribers.is_empty() {
            self.channels.remove(&room_id);
        }
        removed
    }

    fn relay_room(&mut self, origin: ConnectionId, message: RoomMessage, members: Vec<UserId>) {
        let targets = relay::room_targets(&self.registry, &members, &message.sender_id);
        let event = ServerEvent::RoomMessageReceived(message.clone());
        for target in &targets {
            self.deliver(*target, event.clone());
        }
        debug!(
            room = %message.room_id,
            message = %message.id,
            delivered = targets.len(),
            members = members.len(),
            "room message relayed"
        );

        self.deliver(origin, ServerEvent::RoomMessageSent(message.clone()));
        self.persist.enqueue(Message::from(message));
    }

    fn relay_direct(&mut self, origin: ConnectionId, message: DirectMessage) {
        if let Some(target) = relay::direct_target(&self.registry, &message.receiver_id) {
            if target != origin {
                self.deliver(target, ServerEvent::DirectMessageReceived(message.clone()));
            }
        }

        self.deliver(origin, ServerEvent::DirectMessageSent(message.clone()));
        self.persist.enqueue(Message::from(message));
    }

    fn notify_channel(&self, room_id: RoomId, except: ConnectionId, event: ServerEvent) {
        if let Some(subscribers) = self.channels.get(&room_id) {
            for conn in subscribers.keys().filter(|c| **c != except) {
                self.deliver(*conn, event.clone());
            }
        }
    }

    fn broadcast(&self, event: &ServerEvent) {
        debug!(recipients = self.sinks.len(), event = event.name(), "broadcast");
        for sink in self.sinks.values() {
            // A closed sink means its Disconnect is already queued.
            let _ = sink.send(event.clone());
        }
    }

    fn deliver(&self, conn: ConnectionId, event: ServerEvent) {
        match self.sinks.get(&conn) {
            Some(sink) => {
                if sink.send(event).is_err() {
                    debug!(conn = %conn, "sink closed, dropping event");
                }
            }
            None => warn!(conn = %conn, "no sink for connection"),
        }
    }
}
