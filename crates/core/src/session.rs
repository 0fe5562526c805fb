//! Session value: ordered history plus the active-problem pointer.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};
use crate::problem::ActiveProblemRef;

/// Where a session is in its lifecycle. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No active problem.
    Idle,
    /// A problem is active but the student has not spoken about it yet.
    ProblemSelected,
    /// A problem is active and at least one student turn refers to it.
    Conversing,
}

/// A snapshot of one student's tutoring session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Messages in insertion order
    pub history: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_problem: Option<ActiveProblemRef>,
}

impl Session {
    pub fn new(history: Vec<Message>, active_problem: Option<ActiveProblemRef>) -> Self {
        Self {
            history,
            active_problem,
        }
    }

    pub fn state(&self) -> SessionState {
        let Some(active) = &self.active_problem else {
            return SessionState::Idle;
        };

        let has_user_turn = self
            .history
            .iter()
            .any(|m| m.role == Role::User && m.problem_id == Some(active.id));

        if has_user_turn {
            SessionState::Conversing
        } else {
            SessionState::ProblemSelected
        }
    }

    /// User and tutor entries only, in order.
    pub fn dialogue(&self) -> impl Iterator<Item = &Message> {
        self.history.iter().filter(|m| m.is_dialogue())
    }

    pub fn has_dialogue(&self) -> bool {
        self.dialogue().next().is_some()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }
}
