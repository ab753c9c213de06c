//! Connection lifecycle of a signed-in client.
//!
//! [`SessionController`] is a synchronous state machine: the driver feeds it
//! [`SessionInput`]s and carries out the [`SessionAction`]s it returns. Every
//! transport it asks for is tagged with a [`Generation`]; inputs carrying an
//! older generation are dropped, so a late frame or close from a replaced
//! socket can neither be delivered twice nor start a second reconnect.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use grindhub_shared::{ClientEvent, RoomId, ServerEvent, UserId};

use crate::config::ClientConfig;

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Sign-in produced a user identity.
    Authenticated(UserId),
    /// The transport of `Generation` finished its handshake.
    Opened(Generation),
    Frame(Generation, ServerEvent),
    /// The transport failed to connect, errored or was closed by the peer.
    Closed {
        generation: Generation,
        reason: String,
    },
    /// The retry delay scheduled for `Generation` has elapsed.
    RetryDue(Generation),
    OpenRoom(RoomId),
    CloseRoom(RoomId),
    Send(ClientEvent),
    Logout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Open a new transport. Any previous one is already superseded.
    Connect { generation: Generation, user: UserId },
    Transmit(ClientEvent),
    Deliver(ServerEvent),
    ScheduleRetry { generation: Generation, after: Duration },
    CloseTransport,
    StateChanged(SessionState),
    /// A send was requested while no transport was usable.
    NotConnected(ClientEvent),
    /// Reconnection attempts are exhausted.
    GaveUp,
    /// A transport came back after a gap. Anything relayed meanwhile was
    /// skipped, so open conversations need their history again.
    Refetch,
}

pub struct SessionController {
    state: SessionState,
    user: Option<UserId>,
    generation: Generation,
    /// Room channels to (re)join on every fresh transport.
    rooms: BTreeSet<RoomId>,
    /// Some transport has reached `Connected` for the current user.
    was_connected: bool,
    retry_interval: Duration,
    max_attempts: u32,
}

impl SessionController {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            state: SessionState::Disconnected,
            user: None,
            generation: 0,
            rooms: BTreeSet::new(),
            was_connected: false,
            retry_interval: config.reconnect_interval,
            max_attempts: config.max_reconnect_attempts,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn handle(&mut self, input: SessionInput) -> Vec<SessionAction> {
        match input {
            SessionInput::Authenticated(user) => self.authenticated(user),
            SessionInput::Opened(generation) => self.opened(generation),
            SessionInput::Frame(generation, event) => {
                if generation == self.generation && self.state == SessionState::Connected {
                    vec![SessionAction::Deliver(event)]
                } else {
                    debug!(generation, current = self.generation, "dropping stale frame");
                    Vec::new()
                }
            }
            SessionInput::Closed { generation, reason } => self.closed(generation, reason),
            SessionInput::RetryDue(generation) => {
                if generation != self.generation
                    || !matches!(self.state, SessionState::Reconnecting { .. })
                {
                    return Vec::new();
                }
                let state = self.state;
                self.connect(state)
            }
            SessionInput::OpenRoom(room_id) => {
                if self.rooms.insert(room_id) && self.state == SessionState::Connected {
                    vec![SessionAction::Transmit(ClientEvent::JoinRoomChannel { room_id })]
                } else {
                    Vec::new()
                }
            }
            SessionInput::CloseRoom(room_id) => {
                if self.rooms.remove(&room_id) && self.state == SessionState::Connected {
                    vec![SessionAction::Transmit(ClientEvent::LeaveRoomChannel { room_id })]
                } else {
                    Vec::new()
                }
            }
            SessionInput::Send(event) => {
                if self.state == SessionState::Connected {
                    vec![SessionAction::Transmit(event)]
                } else {
                    vec![SessionAction::NotConnected(event)]
                }
            }
            SessionInput::Logout => self.logout(),
        }
    }

    fn authenticated(&mut self, user: UserId) -> Vec<SessionAction> {
        if self.state != SessionState::Disconnected && self.user.as_ref() == Some(&user) {
            debug!(user_id = %user, "already connected");
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.state != SessionState::Disconnected {
            actions.push(SessionAction::CloseTransport);
        }
        if self.user.as_ref() != Some(&user) {
            self.rooms.clear();
            self.was_connected = false;
        }
        self.user = Some(user);
        actions.extend(self.connect(SessionState::Connecting));
        actions
    }

    fn opened(&mut self, generation: Generation) -> Vec<SessionAction> {
        if generation != self.generation
            || !matches!(
                self.state,
                SessionState::Connecting | SessionState::Reconnecting { .. }
            )
        {
            return Vec::new();
        }

        let mut actions: Vec<SessionAction> =
            self.transition(SessionState::Connected).into_iter().collect();
        // Channel subscriptions belong to the transport; restore them.
        actions.extend(
            self.rooms
                .iter()
                .map(|room_id| SessionAction::Transmit(ClientEvent::JoinRoomChannel { room_id: *room_id })),
        );
        if self.was_connected {
            actions.push(SessionAction::Refetch);
        }
        self.was_connected = true;
        actions
    }

    fn closed(&mut self, generation: Generation, reason: String) -> Vec<SessionAction> {
        if generation != self.generation || self.state == SessionState::Disconnected {
            return Vec::new();
        }

        let attempt = match self.state {
            SessionState::Reconnecting { attempt } => attempt + 1,
            _ => 1,
        };

        if attempt > self.max_attempts {
            warn!(reason = %reason, attempts = self.max_attempts, "giving up on reconnection");
            self.generation += 1;
            let mut actions: Vec<SessionAction> =
                self.transition(SessionState::Disconnected).into_iter().collect();
            actions.push(SessionAction::GaveUp);
            return actions;
        }

        info!(reason = %reason, attempt, "connection lost, will retry");
        let mut actions: Vec<SessionAction> = self
            .transition(SessionState::Reconnecting { attempt })
            .into_iter()
            .collect();
        actions.push(SessionAction::ScheduleRetry {
            generation: self.generation,
            after: self.retry_interval,
        });
        actions
    }

    fn logout(&mut self) -> Vec<SessionAction> {
        self.user = None;
        self.rooms.clear();
        self.was_connected = false;
        if self.state == SessionState::Disconnected {
            return Vec::new();
        }

        self.generation += 1;
        let mut actions = vec![SessionAction::CloseTransport];
        actions.extend(self.transition(SessionState::Disconnected));
        actions
    }

    /// Start a new transport generation while in `state`.
    fn connect(&mut self, state: SessionState) -> Vec<SessionAction> {
        let Some(user) = self.user.clone() else {
            return Vec::new();
        };

        self.generation += 1;
        let mut actions: Vec<SessionAction> = self.transition(state).into_iter().collect();
        actions.push(SessionAction::Connect {
            generation: self.generation,
            user,
        });
        actions
    }

    fn transition(&mut self, next: SessionState) -> Option<SessionAction> {
        if self.state == next {
            return None;
        }
        info!(from = ?self.state, to = ?next, "session state changed");
        self.state = next;
        Some(SessionAction::StateChanged(next))
    }
}
