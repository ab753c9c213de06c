//! Room records and the membership service the real-time relay consults.

use rusqlite::{params, OptionalExtension};

use grindhub_shared::constants::DEFAULT_ROOM_CAPACITY;
use grindhub_shared::{RoomId, UserId};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{NewRoom, Room, RoomFilter, RoomUpdate};
use crate::row;

const ROOM_COLUMNS: &str = "id, name, description, category, difficulty, is_private, max_members,
     created_by, tags, is_active, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new room. The creator becomes its first member and a
    /// moderator.
    pub fn create_room(&self, creator: &UserId, new: NewRoom) -> Result<Room> {
        let id = RoomId::new();
        let now = row::now();
        let max_members = new.max_members.unwrap_or(DEFAULT_ROOM_CAPACITY);
        if max_members == 0 {
            return Err(StoreError::Invalid("maxMembers must be positive".into()));
        }

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO rooms (id, name, description, category, difficulty, is_private,
                                max_members, created_by, tags, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
            params![
                id.to_string(),
                new.name,
                new.description,
                new.category.as_str(),
                new.difficulty.as_str(),
                new.is_private,
                max_members,
                creator.as_str(),
                serde_json::to_string(&new.tags)?,
                now,
            ],
        )?;
        tx.execute(
            "INSERT INTO room_members (room_id, user_id, is_moderator, seq, joined_at)
             VALUES (?1, ?2, 1, 0, ?3)",
            params![id.to_string(), creator.as_str(), now],
        )?;
        tx.commit()?;

        tracing::debug!(room = %id, creator = %creator, "room created");
        self.get_room(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single room with its members and moderators.
    pub fn get_room(&self, id: RoomId) -> Result<Room> {
        let mut room = self
            .conn()
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"),
                params![id.to_string()],
                row_to_room,
            )
            .map_err(not_found)?;
        self.attach_members(&mut room)?;
        Ok(room)
    }

    /// List active rooms matching the filter, newest first.
    ///
    /// `search` matches name or description case-insensitively, or a tag
    /// exactly.
    pub fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<Room>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms
             WHERE is_active = 1
               AND (?1 IS NULL OR category = ?1)
               AND (?2 IS NULL OR difficulty = ?2)
               AND (?3 IS NULL
                    OR name LIKE '%' || ?3 || '%'
                    OR description LIKE '%' || ?3 || '%'
                    OR EXISTS (SELECT 1 FROM json_each(rooms.tags) WHERE value = ?3))
             ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(
            params![
                filter.category.map(|c| c.as_str()),
                filter.difficulty.map(|d| d.as_str()),
                search,
            ],
            row_to_room,
        )?;

        let mut rooms = Vec::new();
        for row in rows {
            let mut room = row?;
            self.attach_members(&mut room)?;
            rooms.push(room);
        }
        Ok(rooms)
    }

    /// Current member list of a room in join order.
    ///
    /// Returns [`StoreError::NotFound`] if the room does not exist, so the
    /// relay can tell "no such room" apart from "not a member".
    pub fn room_members(&self, room_id: RoomId) -> Result<Vec<UserId>> {
        let exists: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM rooms WHERE id = ?1",
                params![room_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM room_members WHERE room_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![room_id.to_string()], |row| {
            row.get::<_, String>(0).map(UserId)
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    pub fn is_room_member(&self, room_id: RoomId, user: &UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2",
                params![room_id.to_string(), user.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Add `user` to the room, enforcing the capacity limit.
    pub fn join_room(&self, room_id: RoomId, user: &UserId) -> Result<Room> {
        let room = self.get_room(room_id)?;

        if room.is_member(user) {
            return Err(StoreError::Invalid("Already a member of this room".into()));
        }
        if room.members.len() >= room.max_members as usize {
            return Err(StoreError::Invalid("Room is full".into()));
        }

        self.conn().execute(
            "INSERT INTO room_members (room_id, user_id, is_moderator, seq, joined_at)
             VALUES (?1, ?2, 0,
                     (SELECT COALESCE(MAX(seq), -1) + 1 FROM room_members WHERE room_id = ?1),
                     ?3)",
            params![room_id.to_string(), user.as_str(), row::now()],
        )?;

        tracing::debug!(room = %room_id, user = %user, "user joined room");
        self.get_room(room_id)
    }

    /// Remove `user` from the members and moderators of the room.
    /// Returns `false` if the user was not a member.
    pub fn leave_room(&self, room_id: RoomId, user: &UserId) -> Result<bool> {
        // Surface NotFound for a missing room.
        self.get_room(room_id)?;

        let affected = self.conn().execute(
            "DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2",
            params![room_id.to_string(), user.as_str()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Update / delete
    // ------------------------------------------------------------------

    /// Apply a partial update. Only the creator or a moderator may update.
    pub fn update_room(&self, room_id: RoomId, actor: &UserId, update: RoomUpdate) -> Result<Room> {
        let room = self.get_room(room_id)?;
        if room.created_by != *actor && !room.is_moderator(actor) {
            return Err(StoreError::Forbidden("Access denied".into()));
        }
        if update.max_members == Some(0) {
            return Err(StoreError::Invalid("maxMembers must be positive".into()));
        }

        let tags = update.tags.as_ref().unwrap_or(&room.tags);
        self.conn().execute(
            "UPDATE rooms
             SET name = ?2, description = ?3, category = ?4, difficulty = ?5,
                 is_private = ?6, max_members = ?7, tags = ?8, is_active = ?9,
                 updated_at = ?10
             WHERE id = ?1",
            params![
                room_id.to_string(),
                update.name.as_ref().unwrap_or(&room.name),
                update.description.as_ref().unwrap_or(&room.description),
                update.category.unwrap_or(room.category).as_str(),
                update.difficulty.unwrap_or(room.difficulty).as_str(),
                update.is_private.unwrap_or(room.is_private),
                update.max_members.unwrap_or(room.max_members),
                serde_json::to_string(tags)?,
                update.is_active.unwrap_or(room.is_active),
                row::now(),
            ],
        )?;

        self.get_room(room_id)
    }

    /// Delete a room and, through the cascade, its membership and messages.
    /// Only the creator may delete.
    pub fn delete_room(&self, room_id: RoomId, actor: &UserId) -> Result<()> {
        let room = self.get_room(room_id)?;
        if room.created_by != *actor {
            return Err(StoreError::Forbidden("Only room creator can delete".into()));
        }

        self.conn().execute(
            "DELETE FROM rooms WHERE id = ?1",
            params![room_id.to_string()],
        )?;
        tracing::debug!(room = %room_id, "room deleted");
        Ok(())
    }

    fn attach_members(&self, room: &mut Room) -> Result<()> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, is_moderator FROM room_members
             WHERE room_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![room.id.to_string()], |row| {
            Ok((UserId(row.get(0)?), row.get::<_, bool>(1)?))
        })?;

        room.members.clear();
        room.moderators.clear();
        for row in rows {
            let (user, is_moderator) = row?;
            if is_moderator {
                room.moderators.push(user.clone());
            }
            room.members.push(user);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Room`] without its membership lists.
fn row_to_room(r: &rusqlite::Row<'_>) -> rusqlite::Result<Room> {
    let id: String = r.get(0)?;
    let category: String = r.get(3)?;
    let difficulty: String = r.get(4)?;
    let tags: String = r.get(8)?;
    let created: String = r.get(10)?;
    let updated: String = r.get(11)?;

    Ok(Room {
        id: RoomId(row::uuid(0, &id)?),
        name: r.get(1)?,
        description: r.get(2)?,
        category: row::parsed(3, &category)?,
        difficulty: row::parsed(4, &difficulty)?,
        is_private: r.get(5)?,
        max_members: r.get(6)?,
        created_by: UserId(r.get(7)?),
        members: Vec::new(),
        moderators: Vec::new(),
        tags: row::json_list(8, &tags)?,
        is_active: r.get(9)?,
        created_at: row::timestamp(10, &created)?,
        updated_at: row::timestamp(11, &updated)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, RoomCategory};

    fn new_room(name: &str, tags: &[&str]) -> NewRoom {
        NewRoom {
            name: name.into(),
            description: "Daily grind".into(),
            category: RoomCategory::Algorithms,
            difficulty: Difficulty::Medium,
            is_private: false,
            max_members: Some(3),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn creator_is_member_and_moderator() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserId::new("alice");

        let room = db.create_room(&alice, new_room("Graphs", &[])).unwrap();
        assert_eq!(room.members, vec![alice.clone()]);
        assert_eq!(room.moderators, vec![alice.clone()]);
        assert_eq!(db.room_members(room.id).unwrap(), vec![alice]);
    }

    #[test]
    fn join_enforces_duplicates_and_capacity() {
        let db = Database::open_in_memory().unwrap();
        let room = db.create_room(&"a".into(), new_room("DP", &[])).unwrap();

        db.join_room(room.id, &"b".into()).unwrap();
        let dup = db.join_room(room.id, &"b".into());
        assert!(matches!(dup, Err(StoreError::Invalid(_))));

        db.join_room(room.id, &"c".into()).unwrap();
        let full = db.join_room(room.id, &"d".into());
        assert!(matches!(full, Err(StoreError::Invalid(msg)) if msg == "Room is full"));

        let members = db.room_members(room.id).unwrap();
        assert_eq!(members, vec!["a".into(), "b".into(), "c".into()]);
    }

    #[test]
    fn leave_removes_moderator_role() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new("a");
        let room = db.create_room(&a, new_room("Trees", &[])).unwrap();

        assert!(db.leave_room(room.id, &a).unwrap());
        assert!(!db.leave_room(room.id, &a).unwrap());
        let room = db.get_room(room.id).unwrap();
        assert!(room.members.is_empty());
        assert!(room.moderators.is_empty());
    }

    #[test]
    fn members_of_missing_room_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.room_members(RoomId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_filters_by_search_and_tag() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new("a");
        db.create_room(&a, new_room("Sliding Window", &["arrays"])).unwrap();
        db.create_room(&a, new_room("Heaps", &["priority-queue"])).unwrap();

        let by_name = db
            .list_rooms(&RoomFilter {
                search: Some("sliding".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Sliding Window");

        let by_tag = db
            .list_rooms(&RoomFilter {
                search: Some("priority-queue".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].name, "Heaps");

        assert_eq!(db.list_rooms(&RoomFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn only_creator_deletes_and_moderators_update() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new("a");
        let b = UserId::new("b");
        let room = db.create_room(&a, new_room("Bits", &[])).unwrap();
        db.join_room(room.id, &b).unwrap();

        let denied = db.update_room(
            room.id,
            &b,
            RoomUpdate {
                name: Some("Bytes".into()),
                ..Default::default()
            },
        );
        assert!(matches!(denied, Err(StoreError::Forbidden(_))));

        let updated = db
            .update_room(
                room.id,
                &a,
                RoomUpdate {
                    name: Some("Bytes".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Bytes");
        assert_eq!(updated.description, "Daily grind");

        assert!(matches!(
            db.delete_room(room.id, &b),
            Err(StoreError::Forbidden(_))
        ));
        db.delete_room(room.id, &a).unwrap();
        assert!(matches!(db.get_room(room.id), Err(StoreError::NotFound)));
    }
}
