//! Message domain types.
//!
//! A message is one persisted entry in a session's history. Messages are
//! immutable once stored; insertion order is the only ordering guarantee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::problem::ProblemId;

/// The role of a message sender in a tutoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The student
    User,
    /// The tutor persona
    Tutor,
    /// Bookkeeping notes (problem changes, completion). Never shown to the model.
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Tutor => "tutor",
            Role::System => "system",
        }
    }

    /// Parse a stored role label. Older sessions wrote the tutor's name or
    /// `assistant` for tutor turns; those map to [`Role::Tutor`].
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "student" => Some(Role::User),
            "tutor" | "assistant" | "alex" => Some(Role::Tutor),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (assigned by the store)
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// The problem that was active when the message was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_id: Option<ProblemId>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, problem_id: Option<ProblemId>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            problem_id,
            timestamp: Utc::now(),
        }
    }

    /// Create a new student message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, None)
    }

    /// Create a new tutor message.
    pub fn tutor(content: impl Into<String>) -> Self {
        Self::new(Role::Tutor, content, None)
    }

    /// Create a new system note.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, None)
    }

    pub fn with_problem(mut self, problem_id: ProblemId) -> Self {
        self.problem_id = Some(problem_id);
        self
    }

    /// Whether this entry takes part in the dialogue (user or tutor).
    pub fn is_dialogue(&self) -> bool {
        matches!(self.role, Role::User | Role::Tutor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("How do I start?");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "How do I start?");
        assert!(msg.problem_id.is_none());
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn with_problem_sets_scope() {
        let msg = Message::tutor("Let's begin.").with_problem(ProblemId(1));
        assert_eq!(msg.problem_id, Some(ProblemId(1)));
    }

    #[test]
    fn system_notes_are_not_dialogue() {
        assert!(!Message::system("New problem started").is_dialogue());
        assert!(Message::user("hi").is_dialogue());
        assert!(Message::tutor("hello").is_dialogue());
    }

    #[test]
    fn role_parse_accepts_legacy_labels() {
        assert_eq!(Role::parse("alex"), Some(Role::Tutor));
        assert_eq!(Role::parse("Assistant"), Some(Role::Tutor));
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("narrator"), None);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user("test message").with_problem(ProblemId(7));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, msg);
    }
}
