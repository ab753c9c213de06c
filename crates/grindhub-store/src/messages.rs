use rusqlite::params;

use grindhub_shared::constants::MAX_MESSAGE_BODY;
use grindhub_shared::{MessageId, RoomId, UserId};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{Message, Reaction};
use crate::row;

const MESSAGE_COLUMNS: &str = "id, sender_id, room_id, receiver_id, body, image, kind,
     code_language, is_edited, edited_at, created_at";

impl Database {
    /// Persist a message under the id it was relayed with.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        if message.room_id.is_some() == message.receiver_id.is_some() {
            return Err(StoreError::Invalid(
                "message needs exactly one destination".into(),
            ));
        }

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, room_id, receiver_id, body, image, kind,
                                   code_language, is_edited, edited_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, ?9)",
            params![
                message.id.to_string(),
                message.sender_id.as_str(),
                message.room_id.map(|r| r.to_string()),
                message.receiver_id.as_ref().map(UserId::as_str),
                message.body,
                message.image,
                message.kind.as_str(),
                message.code_language,
                row::stamp(&message.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        let mut message = self
            .conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)?;
        message.reactions = self.reactions_for(id)?;
        Ok(message)
    }

    /// Full history of a room, oldest first.
    pub fn room_history(&self, room_id: RoomId) -> Result<Vec<Message>> {
        self.collect_messages(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE room_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ),
            params![room_id.to_string()],
        )
    }

    /// Direct conversation between two users in both directions, oldest first.
    pub fn direct_history(&self, me: &UserId, other: &UserId) -> Result<Vec<Message>> {
        self.collect_messages(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, rowid ASC"
            ),
            params![me.as_str(), other.as_str()],
        )
    }

    /// Replace the body of a message. Only its sender may edit it.
    pub fn edit_message(&self, id: MessageId, actor: &UserId, body: &str) -> Result<Message> {
        let message = self.get_message(id)?;
        if message.sender_id != *actor {
            return Err(StoreError::Forbidden("Only the sender can edit a message".into()));
        }
        if body.trim().is_empty() {
            return Err(StoreError::Invalid("message body is empty".into()));
        }
        if body.len() > MAX_MESSAGE_BODY {
            return Err(StoreError::Invalid("message body is too long".into()));
        }

        self.conn().execute(
            "UPDATE messages SET body = ?2, is_edited = 1, edited_at = ?3 WHERE id = ?1",
            params![id.to_string(), body, row::now()],
        )?;
        self.get_message(id)
    }

    /// Add or replace `actor`'s reaction on a message the actor can see.
    pub fn set_reaction(&self, id: MessageId, actor: &UserId, emoji: &str) -> Result<Message> {
        let message = self.get_message(id)?;
        let visible = match (&message.room_id, &message.receiver_id) {
            (Some(room_id), _) => self.is_room_member(*room_id, actor)?,
            (None, Some(receiver)) => message.sender_id == *actor || receiver == actor,
            (None, None) => false,
        };
        if !visible {
            return Err(StoreError::Forbidden("Access denied".into()));
        }
        if emoji.trim().is_empty() {
            return Err(StoreError::Invalid("emoji is required".into()));
        }

        self.conn().execute(
            "INSERT INTO reactions (message_id, user_id, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(message_id, user_id)
             DO UPDATE SET emoji = excluded.emoji, created_at = excluded.created_at",
            params![id.to_string(), actor.as_str(), emoji, row::now()],
        )?;
        self.get_message(id)
    }

    fn reactions_for(&self, id: MessageId) -> Result<Vec<Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, emoji, created_at FROM reactions
             WHERE message_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |r| {
            let created: String = r.get(2)?;
            Ok(Reaction {
                user_id: UserId(r.get(0)?),
                emoji: r.get(1)?,
                created_at: row::timestamp(2, &created)?,
            })
        })?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }

    fn collect_messages(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params, row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            let mut message = row?;
            message.reactions = self.reactions_for(message.id)?;
            messages.push(message);
        }
        Ok(messages)
    }
}

fn row_to_message(r: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = r.get(0)?;
    let room_id: Option<String> = r.get(2)?;
    let kind: String = r.get(6)?;
    let edited_at: Option<String> = r.get(9)?;
    let created: String = r.get(10)?;

    Ok(Message {
        id: MessageId(row::uuid(0, &id)?),
        sender_id: UserId(r.get(1)?),
        room_id: room_id
            .map(|s| row::uuid(2, &s).map(RoomId))
            .transpose()?,
        receiver_id: r.get::<_, Option<String>>(3)?.map(UserId),
        body: r.get(4)?,
        image: r.get(5)?,
        kind: row::parsed(6, &kind)?,
        code_language: r.get(7)?,
        is_edited: r.get(8)?,
        edited_at: edited_at
            .map(|s| row::timestamp(9, &s))
            .transpose()?,
        created_at: row::timestamp(10, &created)?,
        reactions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use grindhub_shared::{DirectMessage, MessageKind, RoomMessage};

    use super::*;
    use crate::models::{NewRoom, RoomCategory};

    fn room(db: &Database, creator: &UserId) -> RoomId {
        db.create_room(
            creator,
            NewRoom {
                name: "Arrays".into(),
                description: "".into(),
                category: RoomCategory::Algorithms,
                difficulty: crate::models::Difficulty::Mixed,
                is_private: false,
                max_members: None,
                tags: vec![],
            },
        )
        .unwrap()
        .id
    }

    fn room_message(room_id: RoomId, sender: &str, body: &str, offset: i64) -> Message {
        Message::from(RoomMessage {
            id: MessageId::new(),
            room_id,
            sender_id: sender.into(),
            body: body.into(),
            kind: MessageKind::Text,
            code_language: None,
            timestamp: Utc::now() + Duration::milliseconds(offset),
        })
    }

    fn direct(sender: &str, receiver: &str, body: &str, offset: i64) -> Message {
        Message::from(DirectMessage {
            id: MessageId::new(),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            body: body.into(),
            kind: MessageKind::Text,
            image: None,
            timestamp: Utc::now() + Duration::milliseconds(offset),
        })
    }

    #[test]
    fn room_history_is_oldest_first_and_keeps_ids() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new("a");
        let room_id = room(&db, &a);

        let later = room_message(room_id, "a", "second", 50);
        let earlier = room_message(room_id, "a", "first", 0);
        db.insert_message(&later).unwrap();
        db.insert_message(&earlier).unwrap();

        let history = db.room_history(room_id).unwrap();
        let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["first", "second"]);
        assert_eq!(history[0].id, earlier.id);
    }

    #[test]
    fn direct_history_covers_both_directions() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&direct("u1", "u2", "hi", 0)).unwrap();
        db.insert_message(&direct("u2", "u1", "hey", 10)).unwrap();
        db.insert_message(&direct("u1", "u3", "other", 20)).unwrap();

        let history = db.direct_history(&"u2".into(), &"u1".into()).unwrap();
        let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["hi", "hey"]);
    }

    #[test]
    fn only_sender_edits() {
        let db = Database::open_in_memory().unwrap();
        let msg = direct("u1", "u2", "typo", 0);
        db.insert_message(&msg).unwrap();

        assert!(matches!(
            db.edit_message(msg.id, &"u2".into(), "nope"),
            Err(StoreError::Forbidden(_))
        ));
        let edited = db.edit_message(msg.id, &"u1".into(), "fixed").unwrap();
        assert_eq!(edited.body, "fixed");
        assert!(edited.is_edited);
        assert!(edited.edited_at.is_some());
    }

    #[test]
    fn edit_respects_body_limit() {
        let db = Database::open_in_memory().unwrap();
        let msg = direct("u1", "u2", "short", 0);
        db.insert_message(&msg).unwrap();

        assert!(matches!(
            db.edit_message(msg.id, &"u1".into(), &"x".repeat(MAX_MESSAGE_BODY + 1)),
            Err(StoreError::Invalid(_))
        ));
        assert_eq!(db.get_message(msg.id).unwrap().body, "short");
        assert!(db
            .edit_message(msg.id, &"u1".into(), &"x".repeat(MAX_MESSAGE_BODY))
            .is_ok());
    }

    #[test]
    fn reaction_replaces_previous_emoji() {
        let db = Database::open_in_memory().unwrap();
        let msg = direct("u1", "u2", "solved it", 0);
        db.insert_message(&msg).unwrap();

        db.set_reaction(msg.id, &"u2".into(), "🔥").unwrap();
        let updated = db.set_reaction(msg.id, &"u2".into(), "🎉").unwrap();
        assert_eq!(updated.reactions.len(), 1);
        assert_eq!(updated.reactions[0].emoji, "🎉");

        assert!(matches!(
            db.set_reaction(msg.id, &"u3".into(), "👀"),
            Err(StoreError::Forbidden(_))
        ));
    }

    #[test]
    fn deleting_room_drops_its_messages() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new("a");
        let room_id = room(&db, &a);
        let msg = room_message(room_id, "a", "bye", 0);
        db.insert_message(&msg).unwrap();

        db.delete_room(room_id, &a).unwrap();
        assert!(matches!(db.get_message(msg.id), Err(StoreError::NotFound)));
    }
}
