//! Daily study goal and the todo list attached to it.
//!
//! Goals are kept per user and per calendar day: reading a goal on a later
//! day than it was last touched resets `current` to zero. Callers pass the
//! day explicitly so the roll-over is deterministic in tests.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use grindhub_shared::constants::{DAILY_GOAL_DEFAULT_MINUTES, DAILY_GOAL_MAX_MINUTES, DAILY_GOAL_MIN_MINUTES};
use grindhub_shared::UserId;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{DailyGoal, NewTodo, Todo, TodoUpdate};
use crate::row;

impl Database {
    /// Today's goal for `user`, created with the default target if missing.
    pub fn daily_goal(&self, user: &UserId, today: NaiveDate) -> Result<DailyGoal> {
        self.roll_goal(user, today)?;

        let (target, current, goal_date, updated): (u32, u32, String, String) = self
            .conn()
            .query_row(
                "SELECT target, current, goal_date, updated_at FROM daily_goals WHERE user_id = ?1",
                params![user.as_str()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .map_err(not_found)?;

        let todos = self.list_todos(user)?;
        let completed_todos = todos.iter().filter(|t| t.completed).count();

        Ok(DailyGoal {
            user_id: user.clone(),
            target,
            current,
            goal_date: row::date(2, &goal_date)?,
            total_todos: todos.len(),
            completed_todos,
            todos,
            updated_at: row::timestamp(3, &updated)?,
        })
    }

    pub fn set_goal_target(&self, user: &UserId, target: u32, today: NaiveDate) -> Result<DailyGoal> {
        if !(DAILY_GOAL_MIN_MINUTES..=DAILY_GOAL_MAX_MINUTES).contains(&target) {
            return Err(StoreError::Invalid(format!(
                "target must be between {DAILY_GOAL_MIN_MINUTES} and {DAILY_GOAL_MAX_MINUTES} minutes"
            )));
        }
        self.roll_goal(user, today)?;
        self.conn().execute(
            "UPDATE daily_goals SET target = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user.as_str(), target, row::now()],
        )?;
        self.daily_goal(user, today)
    }

    /// Credit studied minutes to today's goal.
    pub fn add_goal_minutes(&self, user: &UserId, minutes: u32, today: NaiveDate) -> Result<DailyGoal> {
        self.roll_goal(user, today)?;
        self.conn().execute(
            "UPDATE daily_goals SET current = current + ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user.as_str(), minutes, row::now()],
        )?;
        self.daily_goal(user, today)
    }

    /// Make sure a goal row exists and belongs to `today`.
    fn roll_goal(&self, user: &UserId, today: NaiveDate) -> Result<()> {
        let today_str = today.format("%Y-%m-%d").to_string();
        let existing: Option<String> = self
            .conn()
            .query_row(
                "SELECT goal_date FROM daily_goals WHERE user_id = ?1",
                params![user.as_str()],
                |r| r.get(0),
            )
            .optional()?;

        match existing {
            None => {
                self.conn().execute(
                    "INSERT INTO daily_goals (user_id, target, current, goal_date, updated_at)
                     VALUES (?1, ?2, 0, ?3, ?4)",
                    params![user.as_str(), DAILY_GOAL_DEFAULT_MINUTES, today_str, row::now()],
                )?;
            }
            Some(date) if date != today_str => {
                tracing::debug!(user = %user, from = %date, to = %today_str, "daily goal rolled over");
                self.conn().execute(
                    "UPDATE daily_goals SET current = 0, goal_date = ?2, updated_at = ?3
                     WHERE user_id = ?1",
                    params![user.as_str(), today_str, row::now()],
                )?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Todos
    // ------------------------------------------------------------------

    pub fn list_todos(&self, user: &UserId) -> Result<Vec<Todo>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, text, priority, estimated_time, completed, created_at, updated_at
             FROM todos WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![user.as_str()], row_to_todo)?;

        let mut todos = Vec::new();
        for row in rows {
            todos.push(row?);
        }
        Ok(todos)
    }

    pub fn add_todo(&self, user: &UserId, new: NewTodo) -> Result<Todo> {
        if new.text.trim().is_empty() {
            return Err(StoreError::Invalid("todo text is required".into()));
        }
        let id = Uuid::new_v4();
        let now = row::now();
        self.conn().execute(
            "INSERT INTO todos (id, user_id, text, priority, estimated_time, completed,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
            params![
                id.to_string(),
                user.as_str(),
                new.text.trim(),
                new.priority.as_str(),
                new.estimated_time,
                now,
            ],
        )?;
        self.get_todo(user, id)
    }

    pub fn update_todo(&self, user: &UserId, id: Uuid, update: TodoUpdate) -> Result<Todo> {
        let todo = self.get_todo(user, id)?;
        let text = update.text.unwrap_or(todo.text);
        if text.trim().is_empty() {
            return Err(StoreError::Invalid("todo text is required".into()));
        }

        self.conn().execute(
            "UPDATE todos SET text = ?3, priority = ?4, estimated_time = ?5, completed = ?6,
                              updated_at = ?7
             WHERE id = ?1 AND user_id = ?2",
            params![
                id.to_string(),
                user.as_str(),
                text,
                update.priority.unwrap_or(todo.priority).as_str(),
                update.estimated_time.unwrap_or(todo.estimated_time),
                update.completed.unwrap_or(todo.completed),
                row::now(),
            ],
        )?;
        self.get_todo(user, id)
    }

    pub fn delete_todo(&self, user: &UserId, id: Uuid) -> Result<()> {
        let affected = self.conn().execute(
            "DELETE FROM todos WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user.as_str()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn get_todo(&self, user: &UserId, id: Uuid) -> Result<Todo> {
        self.conn()
            .query_row(
                "SELECT id, text, priority, estimated_time, completed, created_at, updated_at
                 FROM todos WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user.as_str()],
                row_to_todo,
            )
            .map_err(not_found)
    }
}

fn row_to_todo(r: &rusqlite::Row<'_>) -> rusqlite::Result<Todo> {
    let id: String = r.get(0)?;
    let priority: String = r.get(2)?;
    let created: String = r.get(5)?;
    let updated: String = r.get(6)?;

    Ok(Todo {
        id: row::uuid(0, &id)?,
        text: r.get(1)?,
        priority: row::parsed(2, &priority)?,
        estimated_time: r.get(3)?,
        completed: r.get(4)?,
        created_at: row::timestamp(5, &created)?,
        updated_at: row::timestamp(6, &updated)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TodoPriority;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn goal_defaults_and_rolls_over() {
        let db = Database::open_in_memory().unwrap();
        let u = UserId::new("u1");

        let goal = db.daily_goal(&u, day(1)).unwrap();
        assert_eq!(goal.target, DAILY_GOAL_DEFAULT_MINUTES);
        assert_eq!(goal.current, 0);

        db.add_goal_minutes(&u, 25, day(1)).unwrap();
        assert_eq!(db.daily_goal(&u, day(1)).unwrap().current, 25);

        let next = db.daily_goal(&u, day(2)).unwrap();
        assert_eq!(next.current, 0);
        assert_eq!(next.goal_date, day(2));
    }

    #[test]
    fn target_range_is_enforced() {
        let db = Database::open_in_memory().unwrap();
        let u = UserId::new("u1");

        assert!(matches!(
            db.set_goal_target(&u, 4, day(1)),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            db.set_goal_target(&u, 481, day(1)),
            Err(StoreError::Invalid(_))
        ));
        assert_eq!(db.set_goal_target(&u, 120, day(1)).unwrap().target, 120);
    }

    #[test]
    fn todos_feed_goal_counts() {
        let db = Database::open_in_memory().unwrap();
        let u = UserId::new("u1");

        let first = db
            .add_todo(
                &u,
                NewTodo {
                    text: "Review heaps".into(),
                    priority: TodoPriority::High,
                    estimated_time: 45,
                },
            )
            .unwrap();
        db.add_todo(
            &u,
            NewTodo {
                text: "Mock interview".into(),
                priority: TodoPriority::Low,
                estimated_time: 60,
            },
        )
        .unwrap();

        db.update_todo(
            &u,
            first.id,
            TodoUpdate {
                completed: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let goal = db.daily_goal(&u, day(1)).unwrap();
        assert_eq!(goal.total_todos, 2);
        assert_eq!(goal.completed_todos, 1);
        assert_eq!(goal.todos[0].text, "Review heaps");

        assert!(matches!(
            db.delete_todo(&"u2".into(), first.id),
            Err(StoreError::NotFound)
        ));
        db.delete_todo(&u, first.id).unwrap();
        assert_eq!(db.list_todos(&u).unwrap().len(), 1);
    }
}
