//! Real-time wire protocol.
//!
//! Every frame is a JSON text frame of the form `{"event": "<name>", "data": ...}`.
//! Both directions are closed enums so handlers dispatch with an exhaustive
//! `match` instead of string-keyed lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{MessageId, MessageKind, RoomId, UserId};

/// Events sent by a client to the server.
///
/// The sender is never part of the payload: the server uses the user bound
/// to the connection at handshake time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    SendRoomMessage {
        room_id: RoomId,
        body: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code_language: Option<String>,
    },
    SendDirectMessage {
        receiver_id: UserId,
        body: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    /// Subscription scoping hint; does not change room membership.
    JoinRoomChannel { room_id: RoomId },
    LeaveRoomChannel { room_id: RoomId },
}

/// Events pushed by the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Full replacement of the online user set, never a delta.
    OnlineUsersChanged(Vec<UserId>),
    RoomMessageReceived(RoomMessage),
    DirectMessageReceived(DirectMessage),
    /// Acknowledgement to the sender of an accepted room message.
    RoomMessageSent(RoomMessage),
    /// Acknowledgement to the sender of an accepted direct message.
    DirectMessageSent(DirectMessage),
    MessageRejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receiver_id: Option<UserId>,
        reason: RejectReason,
    },
    UserJoinedRoom { room_id: RoomId, user_id: UserId },
    UserLeftRoom { room_id: RoomId, user_id: UserId },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub body: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_language: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    NotAuthenticated,
    NotAMember,
    RoomNotFound,
    RateLimited,
    InvalidMessage,
    Unavailable,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotAuthenticated => "connection is not bound to a user",
            Self::NotAMember => "you are not a member of this room",
            Self::RoomNotFound => "room not found",
            Self::RateLimited => "too many messages, slow down",
            Self::InvalidMessage => "message is empty or too large",
            Self::Unavailable => "message service unavailable",
        };
        f.write_str(text)
    }
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Wire name of the event, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsersChanged(_) => "online-users-changed",
            Self::RoomMessageReceived(_) => "room-message-received",
            Self::DirectMessageReceived(_) => "direct-message-received",
            Self::RoomMessageSent(_) => "room-message-sent",
            Self::DirectMessageSent(_) => "direct-message-sent",
            Self::MessageRejected { .. } => "message-rejected",
            Self::UserJoinedRoom { .. } => "user-joined-room",
            Self::UserLeftRoom { .. } => "user-left-room",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_event_wire_shape() {
        let room_id = RoomId::new();
        let raw = json!({
            "event": "send-room-message",
            "data": { "roomId": room_id, "body": "two pointers?", "kind": "code" }
        })
        .to_string();

        let event = ClientEvent::from_json(&raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendRoomMessage {
                room_id,
                body: "two pointers?".into(),
                kind: MessageKind::Code,
                code_language: None,
            }
        );
    }

    #[test]
    fn kind_defaults_to_text() {
        let raw = json!({
            "event": "send-direct-message",
            "data": { "receiverId": "u2", "body": "hi" }
        })
        .to_string();

        match ClientEvent::from_json(&raw).unwrap() {
            ClientEvent::SendDirectMessage { kind, image, .. } => {
                assert_eq!(kind, MessageKind::Text);
                assert!(image.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_rejected() {
        let raw = json!({ "event": "room-message", "data": {} }).to_string();
        assert!(ClientEvent::from_json(&raw).is_err());
    }

    #[test]
    fn online_users_payload_is_a_plain_list() {
        let event = ServerEvent::OnlineUsersChanged(vec![UserId::new("u1"), UserId::new("u3")]);
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "online-users-changed");
        assert_eq!(value["data"], json!(["u1", "u3"]));
    }

    #[test]
    fn room_message_payload_fields() {
        let msg = RoomMessage {
            id: MessageId::new(),
            room_id: RoomId::new(),
            sender_id: UserId::new("u1"),
            body: "hello".into(),
            kind: MessageKind::Text,
            code_language: None,
            timestamp: Utc::now(),
        };
        let event = ServerEvent::RoomMessageReceived(msg.clone());
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "room-message-received");
        assert_eq!(value["data"]["senderId"], "u1");
        assert_eq!(value["data"]["roomId"], json!(msg.room_id));
        assert!(value["data"].get("codeLanguage").is_none());
    }
}
