use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity is issued by the external auth service and treated as opaque.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An id supplied at handshake is usable only if it is non-blank.
    pub fn parse_handshake(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self(s.to_string()))
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Server-generated message id, assigned before fan-out and reused by the
/// persisted record so clients can de-duplicate live copies against history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    #[default]
    Text,
    Code,
    ProblemLink,
    File,
    VoiceNote,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::ProblemLink => "problem-link",
            Self::File => "file",
            Self::VoiceNote => "voice-note",
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "code" => Ok(Self::Code),
            "problem-link" => Ok(Self::ProblemLink),
            "file" => Ok(Self::File),
            "voice-note" => Ok(Self::VoiceNote),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_ignores_blank_user() {
        assert_eq!(UserId::parse_handshake(None), None);
        assert_eq!(UserId::parse_handshake(Some("   ")), None);
        assert_eq!(
            UserId::parse_handshake(Some(" u1 ")),
            Some(UserId::new("u1"))
        );
    }

    #[test]
    fn message_kind_uses_kebab_names() {
        let json = serde_json::to_string(&MessageKind::ProblemLink).unwrap();
        assert_eq!(json, "\"problem-link\"");
        assert_eq!("voice-note".parse::<MessageKind>(), Ok(MessageKind::VoiceNote));
        assert!("gif".parse::<MessageKind>().is_err());
    }
}
