//! Session store trait: persisted history and the active-problem pointer.
//!
//! The engine consumes persistence through this narrow interface only. Schema,
//! migrations, and connection handling belong to the implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::{Message, Role};
use crate::problem::{ActiveProblemRef, ProblemId};

/// A saved copy of the student's code for a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSnapshot {
    pub problem_id: ProblemId,
    pub code: String,
    pub language: String,
    pub saved_at: DateTime<Utc>,
}

/// Progress statistics across all problems the student has touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_attempted: u64,
    pub total_completed: u64,
    pub total_messages: u64,
    /// Completed problem count keyed by difficulty label
    pub completed_by_difficulty: BTreeMap<String, u64>,
    /// Percentage of attempted problems that are completed, rounded to one decimal
    pub completion_rate: f64,
}

impl StoreStats {
    pub fn from_counts(
        total_attempted: u64,
        total_completed: u64,
        total_messages: u64,
        completed_by_difficulty: BTreeMap<String, u64>,
    ) -> Self {
        let completion_rate = if total_attempted == 0 {
            0.0
        } else {
            let pct = total_completed as f64 / total_attempted as f64 * 100.0;
            (pct * 10.0).round() / 10.0
        };
        Self {
            total_attempted,
            total_completed,
            total_messages,
            completed_by_difficulty,
            completion_rate,
        }
    }
}

/// The persisted per-student session.
///
/// Implementations: SQLite, in-memory (for testing).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in-memory").
    fn name(&self) -> &str;

    // ── History ───────────────────────────────────────────────────────────

    /// Append a message to the history. Returns the stored message with its ID.
    async fn append_message(
        &self,
        role: Role,
        content: &str,
        problem_id: Option<ProblemId>,
    ) -> std::result::Result<Message, StoreError>;

    /// The most recent messages in chronological order.
    ///
    /// `problem_id` scopes the result to one problem; `limit` keeps only the
    /// newest `limit` entries.
    async fn recent_messages(
        &self,
        problem_id: Option<ProblemId>,
        limit: Option<usize>,
    ) -> std::result::Result<Vec<Message>, StoreError>;

    /// Remove messages (all, or only those for one problem). Returns how many were removed.
    async fn clear_messages(
        &self,
        problem_id: Option<ProblemId>,
    ) -> std::result::Result<u64, StoreError>;

    // ── Active problem ────────────────────────────────────────────────────

    async fn active_problem(&self) -> std::result::Result<Option<ActiveProblemRef>, StoreError>;

    /// Point the session at a problem and record an attempt on it.
    async fn set_active_problem(
        &self,
        problem: &ActiveProblemRef,
    ) -> std::result::Result<(), StoreError>;

    async fn clear_active_problem(&self) -> std::result::Result<(), StoreError>;

    // ── Progress ──────────────────────────────────────────────────────────

    async fn mark_completed(&self, problem_id: ProblemId) -> std::result::Result<(), StoreError>;

    async fn mark_incomplete(&self, problem_id: ProblemId) -> std::result::Result<(), StoreError>;

    async fn is_completed(&self, problem_id: ProblemId) -> std::result::Result<bool, StoreError>;

    async fn completed_problems(&self) -> std::result::Result<Vec<ProblemId>, StoreError>;

    // ── Code snapshots ────────────────────────────────────────────────────

    async fn save_code(
        &self,
        problem_id: ProblemId,
        code: &str,
        language: &str,
    ) -> std::result::Result<CodeSnapshot, StoreError>;

    async fn latest_code(
        &self,
        problem_id: ProblemId,
    ) -> std::result::Result<Option<CodeSnapshot>, StoreError>;

    /// Remove every trace of a problem: messages, code snapshots, and progress.
    async fn reset_problem(&self, problem_id: ProblemId) -> std::result::Result<(), StoreError>;

    // ── Settings ──────────────────────────────────────────────────────────

    async fn setting(&self, key: &str) -> std::result::Result<Option<serde_json::Value>, StoreError>;

    async fn set_setting(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> std::result::Result<(), StoreError>;

    async fn stats(&self) -> std::result::Result<StoreStats, StoreError>;
}
