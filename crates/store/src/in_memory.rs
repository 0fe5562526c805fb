//! In-memory store, useful for testing and throwaway sessions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use zerotohire_core::error::StoreError;
use zerotohire_core::message::{Message, Role};
use zerotohire_core::problem::{ActiveProblemRef, Difficulty, ProblemId};
use zerotohire_core::store::{CodeSnapshot, SessionStore, StoreStats};

#[derive(Debug, Clone)]
struct ProblemProgress {
    difficulty: Difficulty,
    attempts: u64,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    messages: Vec<Message>,
    active: Option<ActiveProblemRef>,
    progress: HashMap<ProblemId, ProblemProgress>,
    snapshots: Vec<CodeSnapshot>,
    settings: HashMap<String, serde_json::Value>,
}

/// A store that keeps the whole session in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append_message(
        &self,
        role: Role,
        content: &str,
        problem_id: Option<ProblemId>,
    ) -> Result<Message, StoreError> {
        let message = Message::new(role, content, problem_id);
        self.state.write().await.messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(
        &self,
        problem_id: Option<ProblemId>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        let scoped: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| problem_id.is_none() || m.problem_id == problem_id)
            .collect();

        let skip = limit.map_or(0, |limit| scoped.len().saturating_sub(limit));
        Ok(scoped.into_iter().skip(skip).cloned().collect())
    }

    async fn clear_messages(&self, problem_id: Option<ProblemId>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.messages.len();
        match problem_id {
            Some(id) => state.messages.retain(|m| m.problem_id != Some(id)),
            None => state.messages.clear(),
        }
        Ok((before - state.messages.len()) as u64)
    }

    async fn active_problem(&self) -> Result<Option<ActiveProblemRef>, StoreError> {
        Ok(self.state.read().await.active.clone())
    }

    async fn set_active_problem(&self, problem: &ActiveProblemRef) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let progress = state
            .progress
            .entry(problem.id)
            .or_insert_with(|| ProblemProgress {
                difficulty: problem.difficulty,
                attempts: 0,
                completed_at: None,
            });
        progress.attempts += 1;
        progress.difficulty = problem.difficulty;
        state.active = Some(problem.clone());
        Ok(())
    }

    async fn clear_active_problem(&self) -> Result<(), StoreError> {
        self.state.write().await.active = None;
        Ok(())
    }

    async fn mark_completed(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let progress = state
            .progress
            .entry(problem_id)
            .or_insert_with(|| ProblemProgress {
                difficulty: Difficulty::Unknown,
                attempts: 0,
                completed_at: None,
            });
        progress.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_incomplete(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        if let Some(progress) = self.state.write().await.progress.get_mut(&problem_id) {
            progress.completed_at = None;
        }
        Ok(())
    }

    async fn is_completed(&self, problem_id: ProblemId) -> Result<bool, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .progress
            .get(&problem_id)
            .is_some_and(|p| p.completed_at.is_some()))
    }

    async fn completed_problems(&self) -> Result<Vec<ProblemId>, StoreError> {
        let state = self.state.read().await;
        let mut done: Vec<(DateTime<Utc>, ProblemId)> = state
            .progress
            .iter()
            .filter_map(|(id, p)| p.completed_at.map(|at| (at, *id)))
            .collect();
        // Most recently completed first
        done.sort_by(|a, b| b.cmp(a));
        Ok(done.into_iter().map(|(_, id)| id).collect())
    }

    async fn save_code(
        &self,
        problem_id: ProblemId,
        code: &str,
        language: &str,
    ) -> Result<CodeSnapshot, StoreError> {
        let snapshot = CodeSnapshot {
            problem_id,
            code: code.to_string(),
            language: language.to_string(),
            saved_at: Utc::now(),
        };
        self.state.write().await.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn latest_code(&self, problem_id: ProblemId) -> Result<Option<CodeSnapshot>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .snapshots
            .iter()
            .rev()
            .find(|s| s.problem_id == problem_id)
            .cloned())
    }

    async fn reset_problem(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.messages.retain(|m| m.problem_id != Some(problem_id));
        state.snapshots.retain(|s| s.problem_id != problem_id);
        state.progress.remove(&problem_id);
        Ok(())
    }

    async fn setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.state.read().await.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .settings
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.read().await;
        let attempted = state.progress.values().filter(|p| p.attempts > 0).count() as u64;

        let mut by_difficulty = BTreeMap::new();
        let mut completed = 0;
        for progress in state.progress.values().filter(|p| p.completed_at.is_some()) {
            completed += 1;
            *by_difficulty
                .entry(progress.difficulty.to_string())
                .or_insert(0) += 1;
        }

        Ok(StoreStats::from_counts(
            attempted,
            completed,
            state.messages.len() as u64,
            by_difficulty,
        ))
    }
}
