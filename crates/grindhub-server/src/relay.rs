//! Room Message Relay.
//!
//! Admission (body checks, membership) runs in the sender's connection
//! actor; target selection runs inside the hub against the registry it
//! owns. Membership is read fresh for every send and never cached.

use chrono::Utc;

use grindhub_shared::constants::MAX_MESSAGE_BODY;
use grindhub_shared::{
    ConnectionId, DirectMessage, MessageId, MessageKind, RejectReason, RoomId, RoomMessage,
    UserId,
};

use crate::error::ServerError;
use crate::registry::ConnectionRegistry;
use crate::state::{with_db, SharedDb};

/// Reject oversized bodies, and blank ones unless an image is attached.
pub fn check_body(body: &str, image: Option<&str>) -> Result<(), RejectReason> {
    if body.len() > MAX_MESSAGE_BODY {
        return Err(RejectReason::InvalidMessage);
    }
    let has_image = image.is_some_and(|url| !url.trim().is_empty());
    if body.trim().is_empty() && !has_image {
        return Err(RejectReason::InvalidMessage);
    }
    Ok(())
}

/// Load the room's current members and require `sender` to be one of them.
pub async fn authorize_room(
    db: &SharedDb,
    room_id: RoomId,
    sender: &UserId,
) -> Result<Vec<UserId>, RejectReason> {
    let members = match with_db(db, move |db| db.room_members(room_id)).await {
        Ok(members) => members,
        Err(ServerError::NotFound(_)) => return Err(RejectReason::RoomNotFound),
        Err(e) => {
            tracing::error!(room = %room_id, error = %e, "membership lookup failed");
            return Err(RejectReason::Unavailable);
        }
    };

    if members.contains(sender) {
        Ok(members)
    } else {
        Err(RejectReason::NotAMember)
    }
}

pub fn room_message(
    sender: UserId,
    room_id: RoomId,
    body: String,
    kind: MessageKind,
    code_language: Option<String>,
) -> RoomMessage {
    RoomMessage {
        id: MessageId::new(),
        room_id,
        sender_id: sender,
        body,
        kind,
        code_language,
        timestamp: Utc::now(),
    }
}

pub fn direct_message(
    sender: UserId,
    receiver: UserId,
    body: String,
    kind: MessageKind,
    image: Option<String>,
) -> DirectMessage {
    DirectMessage {
        id: MessageId::new(),
        sender_id: sender,
        receiver_id: receiver,
        body,
        kind,
        image,
        timestamp: Utc::now(),
    }
}

/// Connections that receive a room message: every registered member other
/// than the sender. Offline members are skipped; they catch up through
/// history.
pub fn room_targets(
    registry: &ConnectionRegistry,
    members: &[UserId],
    sender: &UserId,
) -> Vec<ConnectionId> {
    members
        .iter()
        .filter(|member| *member != sender)
        .filter_map(|member| registry.lookup(member))
        .collect()
}

/// The counterpart's connection for a direct message, if online.
pub fn direct_target(registry: &ConnectionRegistry, receiver: &UserId) -> Option<ConnectionId> {
    registry.lookup(receiver)
}
