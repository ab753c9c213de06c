//! # grindhub-shared
//!
//! Types shared by the GrindHub server and client: identifier newtypes, the
//! closed set of real-time events exchanged over the WebSocket, message
//! payloads and protocol constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::SharedError;
pub use protocol::{ClientEvent, DirectMessage, RejectReason, RoomMessage, ServerEvent};
pub use types::{ConnectionId, MessageId, MessageKind, RoomId, UserId};
