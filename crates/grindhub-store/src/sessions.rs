use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, NaiveDate};
use rusqlite::params;
use uuid::Uuid;

use grindhub_shared::UserId;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{EndSession, SessionKind, StartSession, StudySession, StudyStats};
use crate::row;

const SESSION_COLUMNS: &str =
    "id, user_id, problem_id, kind, duration, completed, notes, created_at, updated_at";

impl Database {
    /// Open a study session with zero duration.
    pub fn start_session(&self, user: &UserId, start: StartSession) -> Result<StudySession> {
        let id = Uuid::new_v4();
        let now = row::now();
        self.conn().execute(
            "INSERT INTO study_sessions (id, user_id, problem_id, kind, duration, completed,
                                         notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?6, ?6)",
            params![
                id.to_string(),
                user.as_str(),
                start.problem.map(|p| p.to_string()),
                start.kind.as_str(),
                start.notes,
                now,
            ],
        )?;
        self.get_session(user, id)
    }

    /// Record the outcome of a session and credit the studied minutes to
    /// today's goal. Ending a session twice only credits the difference.
    pub fn end_session(&self, user: &UserId, end: EndSession, today: NaiveDate) -> Result<StudySession> {
        let previous = self.get_session(user, end.session_id)?;

        self.conn().execute(
            "UPDATE study_sessions
             SET duration = ?3, notes = COALESCE(?4, notes), completed = ?5, updated_at = ?6
             WHERE id = ?1 AND user_id = ?2",
            params![
                end.session_id.to_string(),
                user.as_str(),
                end.duration,
                end.notes,
                end.completed,
                row::now(),
            ],
        )?;

        let credited = end.duration.saturating_sub(previous.duration);
        if credited > 0 {
            self.add_goal_minutes(user, credited, today)?;
        }

        self.get_session(user, end.session_id)
    }

    /// Session history, newest first.
    pub fn list_sessions(&self, user: &UserId) -> Result<Vec<StudySession>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions
             WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![user.as_str()], row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    pub fn study_stats(&self, user: &UserId, today: NaiveDate) -> Result<StudyStats> {
        let sessions = self.list_sessions(user)?;

        let total_problems = sessions
            .iter()
            .filter(|s| s.completed && s.kind == SessionKind::ProblemSolving)
            .count() as u32;

        let week_start = today.checked_sub_days(Days::new(6)).unwrap_or(today);
        let mut weekly_progress: BTreeMap<NaiveDate, u32> = week_start
            .iter_days()
            .take_while(|d| *d <= today)
            .map(|d| (d, 0))
            .collect();

        let mut completed_days = BTreeSet::new();
        for session in &sessions {
            let day = session.created_at.date_naive();
            if let Some(minutes) = weekly_progress.get_mut(&day) {
                *minutes += session.duration;
            }
            if session.completed {
                completed_days.insert(day);
            }
        }

        let today_minutes = weekly_progress.get(&today).copied().unwrap_or(0);
        let today_hours = (f64::from(today_minutes) / 60.0 * 100.0).round() / 100.0;

        Ok(StudyStats {
            streak: streak(&completed_days, today),
            total_problems,
            today_hours,
            weekly_progress,
        })
    }

    fn get_session(&self, user: &UserId, id: Uuid) -> Result<StudySession> {
        self.conn()
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = ?1 AND user_id = ?2"),
                params![id.to_string(), user.as_str()],
                row_to_session,
            )
            .map_err(not_found)
    }
}

/// Consecutive days with a completed session, ending today or yesterday.
fn streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut cursor = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };

    let mut count = 0;
    while days.contains(&cursor) {
        count += 1;
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    count
}

fn row_to_session(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudySession> {
    let id: String = r.get(0)?;
    let problem: Option<String> = r.get(2)?;
    let kind: String = r.get(3)?;
    let created: String = r.get(7)?;
    let updated: String = r.get(8)?;

    Ok(StudySession {
        id: row::uuid(0, &id)?,
        user_id: UserId(r.get(1)?),
        problem_id: problem.map(|p| row::uuid(2, &p)).transpose()?,
        kind: row::parsed(3, &kind)?,
        duration: r.get(4)?,
        completed: r.get(5)?,
        notes: r.get(6)?,
        created_at: row::timestamp(7, &created)?,
        updated_at: row::timestamp(8, &updated)?,
    })
}
