//! Tutor-level streaming events.
//!
//! `TutorStreamEvent` wraps engine-level stream chunks into the events a
//! front end renders:
//! - `fragment`: partial text from the model, in production order
//! - `done`: the committed (cleaned) tutor message
//! - `error`: the turn could not be committed

use serde::{Deserialize, Serialize};
use zerotohire_core::message::Message;
use zerotohire_core::session::Session;

/// Events emitted while a streamed turn is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TutorStreamEvent {
    /// Raw text as the model produced it. Not yet cleaned.
    Fragment { content: String },

    /// The turn is committed. Always the last event on success.
    Done {
        message: Message,
        /// Whether the apology fallback was committed instead of model output
        fallback: bool,
        session: Session,
    },

    /// The turn failed after the user message was stored.
    Error { message: String },
}

impl TutorStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Fragment { .. } => "fragment",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_serialization() {
        let event = TutorStreamEvent::Fragment {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"fragment""#));
        assert!(json.contains(r#""content":"Hello""#));
        assert!(!event.is_terminal());
    }

    #[test]
    fn done_serialization() {
        let event = TutorStreamEvent::Done {
            message: Message::tutor("What is the brute force approach?"),
            fallback: false,
            session: Session::default(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""fallback":false"#));
        assert!(event.is_terminal());
    }

    #[test]
    fn event_types() {
        assert_eq!(
            TutorStreamEvent::Error {
                message: "boom".into()
            }
            .event_type(),
            "error"
        );
    }
}
