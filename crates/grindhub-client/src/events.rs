//! Messages exchanged between the UI and the session driver.

use grindhub_shared::{ClientEvent, MessageKind, RejectReason, RoomId, UserId};

use crate::cache::{ChatMessage, Context};
use crate::session::SessionState;

/// Commands sent *to* the session driver.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    SendRoomMessage {
        room_id: RoomId,
        body: String,
        kind: MessageKind,
        code_language: Option<String>,
    },
    SendDirectMessage {
        receiver_id: UserId,
        body: String,
        kind: MessageKind,
        image: Option<String>,
    },
    /// The room view was opened: subscribe to its channel and backfill.
    OpenRoom(RoomId),
    CloseRoom(RoomId),
    /// A direct conversation was opened: backfill it.
    OpenConversation(UserId),
    CloseConversation(UserId),
    /// Try again after the session gave up reconnecting.
    Reconnect,
    Logout,
}

/// Notifications sent *from* the session driver to the UI.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    StateChanged(SessionState),
    OnlineUsers(Vec<UserId>),
    /// A new message in an open conversation.
    Message {
        context: Context,
        message: ChatMessage,
    },
    /// Full, de-duplicated contents of a conversation after backfill.
    History {
        context: Context,
        messages: Vec<ChatMessage>,
    },
    BackfillFailed {
        context: Context,
        error: String,
    },
    Rejected {
        room_id: Option<RoomId>,
        receiver_id: Option<UserId>,
        reason: RejectReason,
    },
    UserJoinedRoom {
        room_id: RoomId,
        user_id: UserId,
    },
    UserLeftRoom {
        room_id: RoomId,
        user_id: UserId,
    },
    /// A send issued while the connection was down; it was not delivered.
    NotSent(ClientEvent),
    ServerError(String),
    /// Reconnection attempts are exhausted.
    Offline,
}
