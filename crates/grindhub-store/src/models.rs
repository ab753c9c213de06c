//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so the HTTP layer can
//! hand it straight to clients as JSON.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use grindhub_shared::{DirectMessage, MessageId, MessageKind, RoomId, RoomMessage, UserId};

/// Declares a kebab-case string enum stored as TEXT.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(concat!("invalid ", stringify!($name), ": {}"), other)),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

text_enum!(
    /// Topic a study room is organised around.
    RoomCategory {
        Algorithms => "algorithms",
        SystemDesign => "system-design",
        Frontend => "frontend",
        Backend => "backend",
        General => "general",
        MockInterviews => "mock-interviews",
    }
);

text_enum!(
    Difficulty {
        Easy => "easy",
        Medium => "medium",
        Hard => "hard",
        Mixed => "mixed",
    }
);

/// A persisted group-chat context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub category: RoomCategory,
    pub difficulty: Difficulty,
    pub is_private: bool,
    pub max_members: u32,
    pub created_by: UserId,
    /// Members in join order.
    pub members: Vec<UserId>,
    pub moderators: Vec<UserId>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    pub fn is_moderator(&self, user: &UserId) -> bool {
        self.moderators.contains(user)
    }
}

/// Fields supplied when creating a room.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub name: String,
    pub description: String,
    pub category: RoomCategory,
    #[serde(default = "default_difficulty")]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub is_private: bool,
    pub max_members: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_difficulty() -> Difficulty {
    Difficulty::Mixed
}

/// Partial update of a room; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<RoomCategory>,
    pub difficulty: Option<Difficulty>,
    pub is_private: Option<bool>,
    pub max_members: Option<u32>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomFilter {
    pub category: Option<RoomCategory>,
    pub difficulty: Option<Difficulty>,
    pub search: Option<String>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single persisted chat message. Exactly one of `room_id` /
/// `receiver_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub room_id: Option<RoomId>,
    pub receiver_id: Option<UserId>,
    pub body: String,
    /// Image reference, direct messages only.
    pub image: Option<String>,
    pub kind: MessageKind,
    pub code_language: Option<String>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl From<RoomMessage> for Message {
    fn from(m: RoomMessage) -> Self {
        Self {
            id: m.id,
            sender_id: m.sender_id,
            room_id: Some(m.room_id),
            receiver_id: None,
            body: m.body,
            image: None,
            kind: m.kind,
            code_language: m.code_language,
            is_edited: false,
            edited_at: None,
            created_at: m.timestamp,
            reactions: Vec::new(),
        }
    }
}

impl From<DirectMessage> for Message {
    fn from(m: DirectMessage) -> Self {
        Self {
            id: m.id,
            sender_id: m.sender_id,
            room_id: None,
            receiver_id: Some(m.receiver_id),
            body: m.body,
            image: m.image,
            kind: m.kind,
            code_language: None,
            is_edited: false,
            edited_at: None,
            created_at: m.timestamp,
            reactions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Problems
// ---------------------------------------------------------------------------

text_enum!(
    ProblemDifficulty {
        Easy => "easy",
        Medium => "medium",
        Hard => "hard",
    }
);

text_enum!(
    ProblemCategory {
        Algorithms => "algorithms",
        DataStructures => "data-structures",
        SystemDesign => "system-design",
        Frontend => "frontend",
        Backend => "backend",
    }
);

text_enum!(
    ProblemSort {
        Newest => "newest",
        Oldest => "oldest",
        Popular => "popular",
        Difficulty => "difficulty",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Example {
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub approach: Option<String>,
    pub code: Option<String>,
    pub time_complexity: Option<String>,
    pub space_complexity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub difficulty: ProblemDifficulty,
    pub category: ProblemCategory,
    pub tags: Vec<String>,
    pub companies: Vec<String>,
    pub examples: Vec<Example>,
    pub constraints: Vec<String>,
    pub hints: Vec<String>,
    pub solution: Option<Solution>,
    pub created_by: Option<UserId>,
    pub likes: u32,
    pub submissions: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create payload; also used as a whole-record replacement on update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProblem {
    pub title: String,
    pub description: String,
    pub difficulty: ProblemDifficulty,
    pub category: ProblemCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub solution: Option<Solution>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemFilter {
    pub search: Option<String>,
    pub difficulty: Option<ProblemDifficulty>,
    pub category: Option<ProblemCategory>,
    #[serde(alias = "sort_by")]
    pub sort_by: Option<ProblemSort>,
}

// ---------------------------------------------------------------------------
// Daily goal / todos
// ---------------------------------------------------------------------------

text_enum!(
    TodoPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: Uuid,
    pub text: String,
    pub priority: TodoPriority,
    /// Estimated effort in minutes.
    pub estimated_time: u32,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    pub text: String,
    #[serde(default = "default_priority")]
    pub priority: TodoPriority,
    #[serde(default = "default_estimate")]
    pub estimated_time: u32,
}

fn default_priority() -> TodoPriority {
    TodoPriority::Medium
}

fn default_estimate() -> u32 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoUpdate {
    pub text: Option<String>,
    pub priority: Option<TodoPriority>,
    pub estimated_time: Option<u32>,
    pub completed: Option<bool>,
}

/// A user's goal for the current day, in minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyGoal {
    pub user_id: UserId,
    pub target: u32,
    pub current: u32,
    pub goal_date: NaiveDate,
    pub todos: Vec<Todo>,
    pub completed_todos: usize,
    pub total_todos: usize,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Study sessions
// ---------------------------------------------------------------------------

text_enum!(
    SessionKind {
        ProblemSolving => "problem-solving",
        Study => "study",
        MockInterview => "mock-interview",
        PeerSession => "peer-session",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: Uuid,
    pub user_id: UserId,
    pub problem_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    /// Minutes studied; zero until the session ends.
    pub duration: u32,
    pub completed: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub problem: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSession {
    pub session_id: Uuid,
    pub duration: u32,
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyStats {
    pub streak: u32,
    pub total_problems: u32,
    pub today_hours: f64,
    /// Minutes per calendar day over the last seven days.
    pub weekly_progress: std::collections::BTreeMap<NaiveDate, u32>,
}
