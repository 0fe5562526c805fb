//! Shared test helpers for controller tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use zerotohire_config::AppConfig;
use zerotohire_core::corpus::InMemoryCorpus;
use zerotohire_core::error::{InferenceError, StoreError};
use zerotohire_core::inference::{Generation, GenerationParams, InferenceEngine, StreamChunk};
use zerotohire_core::message::{Message, Role};
use zerotohire_core::problem::{ActiveProblemRef, Difficulty, Problem, ProblemId};
use zerotohire_core::store::{CodeSnapshot, SessionStore, StoreStats};
use zerotohire_store::InMemoryStore;

use crate::session::SessionController;

/// A mock engine that returns a sequence of scripted replies.
///
/// Each generation takes the next reply in the queue; once the queue is
/// empty every call returns the default reply. Prompts are recorded, and the
/// number of generations running at once is tracked.
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<Result<String, InferenceError>>>,
    default_reply: String,
    prompts: Mutex<Vec<String>>,
    params: Mutex<Vec<GenerationParams>>,
    delay: Duration,
    fragment_delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(replies: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            default_reply: "What have you tried so far?".into(),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fragment_delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An engine that always answers with `text`.
    pub fn always(text: &str) -> Self {
        let mut engine = Self::new(vec![]);
        engine.default_reply = text.into();
        engine
    }

    /// An engine whose next generation fails.
    pub fn failing() -> Self {
        Self::new(vec![Err(InferenceError::Network("connection refused".into()))])
    }

    /// Make every generation take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Pause between streamed fragments.
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn last_params(&self) -> Option<GenerationParams> {
        self.params.lock().unwrap().last().cloned()
    }

    /// The most generations ever observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn begin(&self, prompt: &str, params: &GenerationParams) -> Result<String, InferenceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.params.lock().unwrap().push(params.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_reply.clone()))
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, InferenceError> {
        let reply = self.begin(prompt, params);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.map(|text| Generation {
            text,
            usage: None,
            model: "mock-model".into(),
        })
    }

    async fn stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, InferenceError>>,
        InferenceError,
    > {
        let reply = self.begin(prompt, params);
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let in_flight = self.in_flight.clone();
        let delay = self.delay;
        let fragment_delay = self.fragment_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match reply {
                Ok(text) => {
                    for word in text.split_inclusive(' ') {
                        let chunk = StreamChunk {
                            content: Some(word.to_string()),
                            ..Default::default()
                        };
                        if tx.send(Ok(chunk)).await.is_err() {
                            break;
                        }
                        tokio::time::sleep(fragment_delay).await;
                    }
                    let _ = tx
                        .send(Ok(StreamChunk {
                            done: true,
                            ..Default::default()
                        }))
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(rx)
    }
}

pub fn sample_corpus() -> Arc<InMemoryCorpus> {
    Arc::new(
        InMemoryCorpus::new(vec![
            Problem::new(1, "Two Sum")
                .with_description("Given an array of integers nums and an integer target, return indices of the two numbers that add up to target.")
                .with_difficulty(Difficulty::Easy)
                .with_topic("Array")
                .with_topic("Hash Table"),
            Problem::new(70, "Climbing Stairs")
                .with_description("You are climbing a staircase. It takes n steps to reach the top.")
                .with_difficulty(Difficulty::Easy)
                .with_topic("Dynamic Programming")
                .with_topic("Math"),
            Problem::new(198, "House Robber")
                .with_description("Maximize the amount of money you can rob without robbing adjacent houses.")
                .with_difficulty(Difficulty::Medium)
                .with_topic("Dynamic Programming")
                .with_topic("Array"),
            Problem::new(20, "Valid Parentheses")
                .with_description("Determine if the input string has valid brackets. A stack helps.")
                .with_difficulty(Difficulty::Easy)
                .with_topic("String"),
        ])
        .unwrap(),
    )
}

/// A controller over an in-memory store and the sample corpus.
pub fn controller(engine: Arc<ScriptedEngine>) -> (SessionController, Arc<InMemoryStore>) {
    controller_with_config(engine, &AppConfig::default())
}

pub fn controller_with_config(
    engine: Arc<ScriptedEngine>,
    config: &AppConfig,
) -> (SessionController, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let controller = SessionController::new(engine, store.clone(), sample_corpus(), config)
        .unwrap()
        .with_seed(7);
    (controller, store)
}

/// A store whose history writes always fail. Everything else is delegated.
#[derive(Default)]
pub struct FailingAppendStore {
    inner: InMemoryStore,
}

impl FailingAppendStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
        }
    }
}

#[async_trait]
impl SessionStore for FailingAppendStore {
    fn name(&self) -> &str {
        "failing_append"
    }

    async fn append_message(
        &self,
        _role: Role,
        _content: &str,
        _problem_id: Option<ProblemId>,
    ) -> Result<Message, StoreError> {
        Err(StoreError::Storage("disk full".into()))
    }

    async fn recent_messages(
        &self,
        problem_id: Option<ProblemId>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.recent_messages(problem_id, limit).await
    }

    async fn clear_messages(&self, problem_id: Option<ProblemId>) -> Result<u64, StoreError> {
        self.inner.clear_messages(problem_id).await
    }

    async fn active_problem(&self) -> Result<Option<ActiveProblemRef>, StoreError> {
        self.inner.active_problem().await
    }

    async fn set_active_problem(&self, problem: &ActiveProblemRef) -> Result<(), StoreError> {
        self.inner.set_active_problem(problem).await
    }

    async fn clear_active_problem(&self) -> Result<(), StoreError> {
        self.inner.clear_active_problem().await
    }

    async fn mark_completed(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        self.inner.mark_completed(problem_id).await
    }

    async fn mark_incomplete(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        self.inner.mark_incomplete(problem_id).await
    }

    async fn is_completed(&self, problem_id: ProblemId) -> Result<bool, StoreError> {
        self.inner.is_completed(problem_id).await
    }

    async fn completed_problems(&self) -> Result<Vec<ProblemId>, StoreError> {
        self.inner.completed_problems().await
    }

    async fn save_code(
        &self,
        problem_id: ProblemId,
        code: &str,
        language: &str,
    ) -> Result<CodeSnapshot, StoreError> {
        self.inner.save_code(problem_id, code, language).await
    }

    async fn latest_code(&self, problem_id: ProblemId) -> Result<Option<CodeSnapshot>, StoreError> {
        self.inner.latest_code(problem_id).await
    }

    async fn reset_problem(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        self.inner.reset_problem(problem_id).await
    }

    async fn setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.setting(key).await
    }

    async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.inner.set_setting(key, value).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.stats().await
    }
}

/// A store that tracks how many history reads overlap. Every prompt is
/// assembled from a history read, so this counts concurrent assemblies.
#[derive(Default)]
pub struct TrackingStore {
    inner: InMemoryStore,
    reads_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most history reads ever observed running at once.
    pub fn max_reads_in_flight(&self) -> usize {
        self.max_reads_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for TrackingStore {
    fn name(&self) -> &str {
        "tracking"
    }

    async fn append_message(
        &self,
        role: Role,
        content: &str,
        problem_id: Option<ProblemId>,
    ) -> Result<Message, StoreError> {
        self.inner.append_message(role, content, problem_id).await
    }

    async fn recent_messages(
        &self,
        problem_id: Option<ProblemId>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let now = self.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_reads_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let messages = self.inner.recent_messages(problem_id, limit).await;
        self.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
        messages
    }

    async fn clear_messages(&self, problem_id: Option<ProblemId>) -> Result<u64, StoreError> {
        self.inner.clear_messages(problem_id).await
    }

    async fn active_problem(&self) -> Result<Option<ActiveProblemRef>, StoreError> {
        self.inner.active_problem().await
    }

    async fn set_active_problem(&self, problem: &ActiveProblemRef) -> Result<(), StoreError> {
        self.inner.set_active_problem(problem).await
    }

    async fn clear_active_problem(&self) -> Result<(), StoreError> {
        self.inner.clear_active_problem().await
    }

    async fn mark_completed(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        self.inner.mark_completed(problem_id).await
    }

    async fn mark_incomplete(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        self.inner.mark_incomplete(problem_id).await
    }

    async fn is_completed(&self, problem_id: ProblemId) -> Result<bool, StoreError> {
        self.inner.is_completed(problem_id).await
    }

    async fn completed_problems(&self) -> Result<Vec<ProblemId>, StoreError> {
        self.inner.completed_problems().await
    }

    async fn save_code(
        &self,
        problem_id: ProblemId,
        code: &str,
        language: &str,
    ) -> Result<CodeSnapshot, StoreError> {
        self.inner.save_code(problem_id, code, language).await
    }

    async fn latest_code(&self, problem_id: ProblemId) -> Result<Option<CodeSnapshot>, StoreError> {
        self.inner.latest_code(problem_id).await
    }

    async fn reset_problem(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        self.inner.reset_problem(problem_id).await
    }

    async fn setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.setting(key).await
    }

    async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.inner.set_setting(key, value).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.stats().await
    }
}
