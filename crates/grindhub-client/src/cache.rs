//! Local view of presence and of the conversations open in the UI.
//!
//! The online set is always replaced wholesale. Each open conversation keeps
//! its messages in timestamp order and remembers the ids it holds, so a
//! message seen live, as a send acknowledgement and again in REST history is
//! shown once.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use grindhub_shared::{DirectMessage, MessageId, MessageKind, RoomId, RoomMessage, UserId};

/// A room, or a direct conversation keyed by the other participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Context {
    Room(RoomId),
    Direct(UserId),
}

/// A chat message as the client shows it, whether it arrived live or from
/// history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    pub body: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub code_language: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
}

impl From<RoomMessage> for ChatMessage {
    fn from(m: RoomMessage) -> Self {
        Self {
            id: m.id,
            sender_id: m.sender_id,
            room_id: Some(m.room_id),
            receiver_id: None,
            body: m.body,
            kind: m.kind,
            code_language: m.code_language,
            image: None,
            is_edited: false,
            created_at: m.timestamp,
        }
    }
}

impl From<DirectMessage> for ChatMessage {
    fn from(m: DirectMessage) -> Self {
        Self {
            id: m.id,
            sender_id: m.sender_id,
            room_id: None,
            receiver_id: Some(m.receiver_id),
            body: m.body,
            kind: m.kind,
            code_language: None,
            image: m.image,
            is_edited: false,
            created_at: m.timestamp,
        }
    }
}

impl ChatMessage {
    /// Conversation this message belongs to, seen from `me`.
    pub fn context(&self, me: &UserId) -> Context {
        if let Some(room_id) = self.room_id {
            return Context::Room(room_id);
        }
        match &self.receiver_id {
            Some(receiver) if self.sender_id == *me => Context::Direct(receiver.clone()),
            _ => Context::Direct(self.sender_id.clone()),
        }
    }
}

#[derive(Default)]
struct Conversation {
    messages: Vec<ChatMessage>,
    seen: HashSet<MessageId>,
}

impl Conversation {
    fn insert(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    fn sort(&mut self) {
        self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
}

pub struct ClientCache {
    me: UserId,
    online: Vec<UserId>,
    open: HashMap<Context, Conversation>,
}

impl ClientCache {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            online: Vec::new(),
            open: HashMap::new(),
        }
    }

    pub fn online(&self) -> &[UserId] {
        &self.online
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains(user)
    }

    pub fn set_online(&mut self, users: Vec<UserId>) {
        self.online = users;
    }

    /// Start tracking a conversation. Returns `false` if it was already open.
    pub fn open(&mut self, context: Context) -> bool {
        if self.open.contains_key(&context) {
            return false;
        }
        self.open.insert(context, Conversation::default());
        true
    }

    pub fn close(&mut self, context: &Context) -> bool {
        self.open.remove(context).is_some()
    }

    pub fn is_open(&self, context: &Context) -> bool {
        self.open.contains_key(context)
    }

    pub fn open_contexts(&self) -> Vec<Context> {
        self.open.keys().cloned().collect()
    }

    pub fn messages(&self, context: &Context) -> &[ChatMessage] {
        self.open
            .get(context)
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Append a live message. Returns its context when it was new and the
    /// conversation is open.
    pub fn push(&mut self, message: ChatMessage) -> Option<Context> {
        let context = message.context(&self.me);
        let conversation = self.open.get_mut(&context)?;
        conversation.insert(message).then_some(context)
    }

    /// Fold fetched history into an open conversation and return the merged
    /// list.
    pub fn merge_history(
        &mut self,
        context: &Context,
        history: Vec<ChatMessage>,
    ) -> Option<&[ChatMessage]> {
        let conversation = self.open.get_mut(context)?;
        for message in history {
            conversation.insert(message);
        }
        conversation.sort();
        Some(&conversation.messages)
    }

    pub fn clear(&mut self) {
        self.online.clear();
        self.open.clear();
    }
}
