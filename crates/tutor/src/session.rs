//! The session controller: runs turns, selects problems, and owns every
//! write to the session store.
//!
//! # Turn protocol
//!
//! 1. Validate input (no state touched on failure)
//! 2. Take the turn lock (wait or reject, per [`LockPolicy`])
//! 3. Store the user message; if that fails, stop before generating
//! 4. Assemble the prompt from the freshly loaded session
//! 5. Generate, clean, and store the tutor reply; inference failures store
//!    [`FALLBACK_MESSAGE`] instead, so a stored user turn is always answered
//!
//! Streamed turns run steps 4-5 in a spawned task that owns the lock guard.
//! If the consumer drops the receiver before the reply is complete, the
//! partial text is discarded and nothing is stored.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};
use zerotohire_config::{AppConfig, LockPolicy};
use zerotohire_core::corpus::ProblemCorpus;
use zerotohire_core::error::{Error, InferenceError, Result};
use zerotohire_core::inference::{GenerationParams, InferenceEngine};
use zerotohire_core::message::{Message, Role};
use zerotohire_core::problem::{ActiveProblemRef, Problem, ProblemId};
use zerotohire_core::session::{Session, SessionState};
use zerotohire_core::store::{CodeSnapshot, SessionStore, StoreStats};

use crate::context::preamble::{STUDENT_LABEL, clamp_title};
use crate::context::{AssembledPrompt, AssemblyError, AssemblyMetadata, ContextAssembler, PromptBudget};
use crate::evaluation::{SubmissionKind, classify_submission, evaluation_instruction};
use crate::postprocess::ResponseCleaner;
use crate::retriever::{ProblemRetriever, RetrievalStage};
use crate::stream_event::TutorStreamEvent;

/// Stored in place of a reply when generation fails.
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I'm having trouble responding right now. Could you try rephrasing your question?";

/// Settings key for the code-in-context flag.
pub const INCLUDE_CODE_SETTING: &str = "include_code_in_context";

const DEFAULT_LANGUAGE: &str = "python";

// ── Outcomes ──────────────────────────────────────────────────────────────

/// A committed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// The stored tutor message
    pub message: Message,
    /// Whether the fallback apology was stored instead of model output
    pub fallback: bool,
    /// The session after the commit
    pub session: Session,
    pub metadata: AssemblyMetadata,
}

/// A committed code review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub kind: SubmissionKind,
    pub turn: TurnOutcome,
}

/// A committed problem selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub problem: Problem,
    /// Cascade stage for request-based selection; `None` when picked by id
    pub stage: Option<RetrievalStage>,
    /// The synthesized intro message
    pub message: Message,
    pub session: Session,
}

/// A summary of the session for status displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub active_problem: Option<ActiveProblemRef>,
    pub completed: bool,
    pub messages: usize,
    pub include_code_in_context: bool,
    pub busy: bool,
    pub engine: String,
    pub store: String,
    pub corpus_size: usize,
}

struct PreparedTurn {
    prompt: AssembledPrompt,
    problem_id: Option<ProblemId>,
    params: GenerationParams,
}

#[derive(Debug, Clone, Copy)]
struct InputLimits {
    history_fetch: usize,
    message_chars: usize,
    code_chars: usize,
}

// ── Controller ────────────────────────────────────────────────────────────

/// Orchestrates one student's tutoring session.
///
/// Cheap to clone; clones share the engine, store, corpus, and turn lock.
#[derive(Clone)]
pub struct SessionController {
    engine: Arc<dyn InferenceEngine>,
    store: Arc<dyn SessionStore>,
    corpus: Arc<dyn ProblemCorpus>,
    assembler: ContextAssembler,
    cleaner: ResponseCleaner,
    retriever: Arc<ProblemRetriever>,
    chat_params: GenerationParams,
    evaluation_params: GenerationParams,
    limits: InputLimits,
    lock_policy: LockPolicy,
    turn_lock: Arc<Mutex<()>>,
    rng: Arc<StdMutex<StdRng>>,
}

impl SessionController {
    /// Create a controller. Fails if the configured budget cannot hold the
    /// fixed prompt sections.
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        store: Arc<dyn SessionStore>,
        corpus: Arc<dyn ProblemCorpus>,
        config: &AppConfig,
    ) -> Result<Self> {
        let budget = PromptBudget {
            model_context_tokens: config.budget.model_context_tokens,
            reserved_output_tokens: config.reserved_output_tokens(),
            safety_margin: config.budget.safety_margin,
        };
        let tutor_name = config.context.tutor_name.clone();
        let assembler = ContextAssembler::new(budget, tutor_name.clone(), config.context.history_windows.clone())
            .map_err(|e| Error::Config {
                message: e.to_string(),
            })?;

        let chat_params = GenerationParams {
            max_tokens: config.inference.max_tokens,
            temperature: config.inference.temperature,
            top_p: config.inference.top_p,
            stop: Vec::new(),
        }
        .with_stops(stop_sequences(&tutor_name));
        let evaluation_params = chat_params
            .clone()
            .with_max_tokens(config.inference.evaluation_max_tokens);

        Ok(Self {
            engine,
            store,
            corpus,
            assembler,
            cleaner: ResponseCleaner::new(tutor_name),
            retriever: Arc::new(ProblemRetriever::new(&config.retriever)),
            chat_params,
            evaluation_params,
            limits: InputLimits {
                history_fetch: config.context.history_fetch_limit,
                message_chars: config.context.max_message_chars,
                code_chars: config.context.max_code_chars,
            },
            lock_policy: config.session.lock_policy,
            turn_lock: Arc::new(Mutex::new(())),
            rng: Arc::new(StdMutex::new(StdRng::from_os_rng())),
        })
    }

    /// Make problem selection reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(StdMutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub fn with_retriever(mut self, retriever: ProblemRetriever) -> Self {
        self.retriever = Arc::new(retriever);
        self
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn tutor_name(&self) -> &str {
        self.assembler.tutor_name()
    }

    pub fn corpus(&self) -> &Arc<dyn ProblemCorpus> {
        &self.corpus
    }

    /// Whether a turn currently holds the lock.
    pub fn is_busy(&self) -> bool {
        self.turn_lock.try_lock().is_err()
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// The persisted session: recent history plus the active problem.
    pub async fn load_session(&self) -> Result<Session> {
        let history = self
            .store
            .recent_messages(None, Some(self.limits.history_fetch))
            .await?;
        let active = self.store.active_problem().await?;
        Ok(Session::new(history, active))
    }

    /// The full corpus entry for the active problem.
    pub async fn active_problem(&self) -> Result<Option<Problem>> {
        let active = self.store.active_problem().await?;
        Ok(active.and_then(|a| self.corpus.get(a.id).cloned()))
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let session = self.load_session().await?;
        let completed = match &session.active_problem {
            Some(active) => self.store.is_completed(active.id).await?,
            None => false,
        };
        Ok(SessionStatus {
            state: session.state(),
            completed,
            messages: session.history.len(),
            active_problem: session.active_problem,
            include_code_in_context: self.include_code_in_context().await?,
            busy: self.is_busy(),
            engine: self.engine.name().to_string(),
            store: self.store.name().to_string(),
            corpus_size: self.corpus.len(),
        })
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats().await?)
    }

    // ── Problem selection ─────────────────────────────────────────────────

    /// Pick a problem for a free-text request and introduce it.
    ///
    /// Never calls the inference engine.
    pub async fn select_problem(&self, request: &str) -> Result<SelectionOutcome> {
        let _guard = self.turn_lock.lock().await;

        let retrieval = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.retriever
                .retrieve(request, self.corpus.as_ref(), &mut *rng)?
        };

        self.commit_selection(retrieval.problem, Some(retrieval.stage), Some(&retrieval.lead))
            .await
    }

    /// Make a specific problem active.
    pub async fn select_problem_by_id(&self, id: ProblemId) -> Result<SelectionOutcome> {
        let problem = self
            .corpus
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("There is no problem with id {id}.")))?;

        let _guard = self.turn_lock.lock().await;
        self.commit_selection(problem, None, None).await
    }

    async fn commit_selection(
        &self,
        problem: Problem,
        stage: Option<RetrievalStage>,
        lead: Option<&str>,
    ) -> Result<SelectionOutcome> {
        let returning = self.load_session().await?.has_dialogue();
        let greeting = self.greeting(&problem.title, returning);
        let intro = match lead {
            Some(lead) => format!("{lead}\n\n{greeting}"),
            None => greeting,
        };

        self.store
            .set_active_problem(&ActiveProblemRef::from(&problem))
            .await?;
        let message = self
            .store
            .append_message(Role::Tutor, &intro, Some(problem.id))
            .await?;

        info!(
            problem_id = %problem.id,
            title = %problem.title,
            stage = ?stage,
            "Problem selected"
        );

        Ok(SelectionOutcome {
            problem,
            stage,
            message,
            session: self.load_session().await?,
        })
    }

    fn greeting(&self, title: &str, returning: bool) -> String {
        if returning {
            format!(
                "Great! Let's work on '{title}'. I can see you have the problem description. \
                 Before we dive into coding, let's make sure we understand what we're being asked to do. \
                 Can you tell me in your own words what this problem is asking for? \
                 Let me know if you have any questions!"
            )
        } else {
            format!(
                "Hello! I'm {}, your coding assistant. I see you're working on '{title}'. \
                 Before we start coding, let's make sure we understand the problem. \
                 Can you read through the problem description and tell me what you think it's asking us to do? \
                 Let me know if you have any questions!",
                self.tutor_name()
            )
        }
    }

    // ── Conversation ──────────────────────────────────────────────────────

    /// Run one conversational turn and wait for the committed reply.
    pub async fn converse(&self, user_message: &str, code: Option<&str>) -> Result<TurnOutcome> {
        let (guard, turn) = self.prepare_conversation(user_message, code).await?;
        let outcome = self.complete_turn(turn).await;
        drop(guard);
        outcome
    }

    /// Run one conversational turn, streaming fragments as they arrive.
    ///
    /// Errors before generation (validation, busy, storage) are returned
    /// directly. Afterwards the receiver yields `Fragment`s, then exactly one
    /// `Done` or `Error`.
    pub async fn converse_stream(
        &self,
        user_message: &str,
        code: Option<&str>,
    ) -> Result<mpsc::Receiver<TutorStreamEvent>> {
        let (guard, turn) = self.prepare_conversation(user_message, code).await?;
        Ok(self.spawn_stream(guard, turn))
    }

    async fn prepare_conversation(
        &self,
        user_message: &str,
        code: Option<&str>,
    ) -> Result<(OwnedMutexGuard<()>, PreparedTurn)> {
        let content = validate_text(user_message, "Message", self.limits.message_chars)?;
        if let Some(code) = code {
            check_length(code, "Code", self.limits.code_chars)?;
        }

        let guard = self.acquire_turn().await?;

        let problem_id = self.store.active_problem().await?.map(|p| p.id);
        self.store
            .append_message(Role::User, content, problem_id)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to store user message; turn aborted"))?;

        let session = self.load_session().await?;
        let code = self.context_code(code, problem_id).await?;
        let prompt = self.assembler.assemble(&session, code.as_deref());

        Ok((
            guard,
            PreparedTurn {
                prompt,
                problem_id,
                params: self.chat_params.clone(),
            },
        ))
    }

    async fn context_code(
        &self,
        supplied: Option<&str>,
        problem_id: Option<ProblemId>,
    ) -> Result<Option<String>> {
        if !self.include_code_in_context().await? {
            return Ok(None);
        }
        if let Some(code) = supplied.filter(|c| !c.trim().is_empty()) {
            return Ok(Some(code.to_string()));
        }
        match problem_id {
            Some(id) => Ok(self.store.latest_code(id).await?.map(|s| s.code)),
            None => Ok(None),
        }
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    /// Review a code submission for the active problem.
    ///
    /// Only the tutor's review is stored; the review instruction is not.
    pub async fn evaluate_submission(
        &self,
        code: &str,
        language: &str,
    ) -> Result<EvaluationOutcome> {
        let (guard, kind, turn) = self.prepare_evaluation(code, language).await?;
        let outcome = self.complete_turn(turn).await;
        drop(guard);
        Ok(EvaluationOutcome {
            kind,
            turn: outcome?,
        })
    }

    /// Streaming variant of [`evaluate_submission`](Self::evaluate_submission).
    pub async fn evaluate_submission_stream(
        &self,
        code: &str,
        language: &str,
    ) -> Result<(SubmissionKind, mpsc::Receiver<TutorStreamEvent>)> {
        let (guard, kind, turn) = self.prepare_evaluation(code, language).await?;
        Ok((kind, self.spawn_stream(guard, turn)))
    }

    async fn prepare_evaluation(
        &self,
        code: &str,
        language: &str,
    ) -> Result<(OwnedMutexGuard<()>, SubmissionKind, PreparedTurn)> {
        validate_text(code, "Code", self.limits.code_chars)?;
        let language = match language.trim() {
            "" => DEFAULT_LANGUAGE,
            lang => lang,
        };

        let guard = self.acquire_turn().await?;

        let active = self
            .store
            .active_problem()
            .await?
            .ok_or(Error::NoActiveProblem)?;

        let kind = classify_submission(code, language);
        let instruction = evaluation_instruction(kind, &clamp_title(&active.title), code, language);
        let session = self.load_session().await?;
        let prompt = self
            .assembler
            .assemble_with_instruction(&session, None, &instruction)
            .map_err(assembly_error)?;

        info!(
            problem_id = %active.id,
            kind = ?kind,
            language,
            "Evaluating submission"
        );

        Ok((
            guard,
            kind,
            PreparedTurn {
                prompt,
                problem_id: Some(active.id),
                params: self.evaluation_params.clone(),
            },
        ))
    }

    // ── Generation & commit ───────────────────────────────────────────────

    async fn acquire_turn(&self) -> Result<OwnedMutexGuard<()>> {
        match self.lock_policy {
            LockPolicy::Wait => Ok(self.turn_lock.clone().lock_owned().await),
            LockPolicy::Reject => self.turn_lock.clone().try_lock_owned().map_err(|_| {
                debug!("Turn rejected: another reply is in progress");
                Error::Busy
            }),
        }
    }

    async fn complete_turn(&self, turn: PreparedTurn) -> Result<TurnOutcome> {
        let generated = self
            .engine
            .generate(&turn.prompt.text, &turn.params)
            .await
            .map(|g| g.text);
        let (content, fallback) = self.finalize(generated);

        let message = self
            .store
            .append_message(Role::Tutor, &content, turn.problem_id)
            .await?;
        info!(
            message_id = %message.id,
            problem_id = ?turn.problem_id,
            fallback,
            "Tutor reply committed"
        );

        Ok(TurnOutcome {
            message,
            fallback,
            session: self.load_session().await?,
            metadata: turn.prompt.metadata,
        })
    }

    /// Clean model output, or substitute the fallback.
    fn finalize(&self, generated: std::result::Result<String, InferenceError>) -> (String, bool) {
        match generated {
            Ok(raw) => {
                let cleaned = self.cleaner.clean(&raw);
                if cleaned.is_empty() {
                    warn!(raw_chars = raw.len(), "Reply empty after cleaning; storing fallback");
                    (FALLBACK_MESSAGE.to_string(), true)
                } else {
                    (cleaned, false)
                }
            }
            Err(e) => {
                warn!(engine = %self.engine.name(), error = %e, "Inference failed; storing fallback");
                (FALLBACK_MESSAGE.to_string(), true)
            }
        }
    }

    fn spawn_stream(
        &self,
        guard: OwnedMutexGuard<()>,
        turn: PreparedTurn,
    ) -> mpsc::Receiver<TutorStreamEvent> {
        let (tx, rx) = mpsc::channel(128);
        let controller = self.clone();

        tokio::spawn(async move {
            let _guard = guard;
            controller.drive_stream(turn, tx).await;
        });

        rx
    }

    async fn drive_stream(&self, turn: PreparedTurn, tx: mpsc::Sender<TutorStreamEvent>) {
        let generated = match self.engine.stream(&turn.prompt.text, &turn.params).await {
            Ok(mut chunks) => {
                let mut text = String::new();
                let mut failure = None;
                loop {
                    tokio::select! {
                        _ = tx.closed() => {
                            info!(partial_chars = text.len(), "Stream consumer disconnected; reply discarded");
                            return;
                        }
                        next = chunks.recv() => match next {
                            Some(Ok(chunk)) => {
                                if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                                    text.push_str(&content);
                                    if tx.send(TutorStreamEvent::Fragment { content }).await.is_err() {
                                        info!(partial_chars = text.len(), "Stream consumer disconnected; reply discarded");
                                        return;
                                    }
                                }
                                if chunk.done {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                failure = Some(e);
                                break;
                            }
                            None => break,
                        }
                    }
                }
                match failure {
                    Some(e) => Err(e),
                    None => Ok(text),
                }
            }
            Err(e) => Err(e),
        };

        if tx.is_closed() {
            info!("Stream consumer disconnected before commit; reply discarded");
            return;
        }

        let (content, fallback) = self.finalize(generated);
        let message = match self
            .store
            .append_message(Role::Tutor, &content, turn.problem_id)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to store streamed reply");
                let _ = tx
                    .send(TutorStreamEvent::Error {
                        message: Error::from(e).user_message(),
                    })
                    .await;
                return;
            }
        };
        info!(
            message_id = %message.id,
            problem_id = ?turn.problem_id,
            fallback,
            "Streamed tutor reply committed"
        );

        let event = match self.load_session().await {
            Ok(session) => TutorStreamEvent::Done {
                message,
                fallback,
                session,
            },
            Err(e) => TutorStreamEvent::Error {
                message: e.user_message(),
            },
        };
        let _ = tx.send(event).await;
    }

    // ── Housekeeping ──────────────────────────────────────────────────────

    /// Remove messages (all, or one problem's). The active problem stays.
    pub async fn clear_history(&self, problem_id: Option<ProblemId>) -> Result<Session> {
        let _guard = self.turn_lock.lock().await;
        let removed = self.store.clear_messages(problem_id).await?;
        info!(removed, problem_id = ?problem_id, "History cleared");
        self.load_session().await
    }

    /// Remove all messages and unset the active problem.
    pub async fn clear_session(&self) -> Result<Session> {
        let _guard = self.turn_lock.lock().await;
        let removed = self.store.clear_messages(None).await?;
        self.store.clear_active_problem().await?;
        info!(removed, "Session cleared");
        self.load_session().await
    }

    /// Remove every trace of a problem. Unsets it if it is active.
    pub async fn reset_problem(&self, id: ProblemId) -> Result<Session> {
        let _guard = self.turn_lock.lock().await;
        self.store.reset_problem(id).await?;
        if self.store.active_problem().await?.is_some_and(|a| a.id == id) {
            self.store.clear_active_problem().await?;
        }
        info!(problem_id = %id, "Problem reset");
        self.load_session().await
    }

    /// Mark the active problem completed (or not).
    pub async fn set_completed(&self, completed: bool) -> Result<Session> {
        let _guard = self.turn_lock.lock().await;
        let active = self
            .store
            .active_problem()
            .await?
            .ok_or(Error::NoActiveProblem)?;

        let note = if completed {
            self.store.mark_completed(active.id).await?;
            format!("Marked '{}' as completed.", active.title)
        } else {
            self.store.mark_incomplete(active.id).await?;
            format!("Marked '{}' as not completed.", active.title)
        };
        self.store
            .append_message(Role::System, &note, Some(active.id))
            .await?;
        info!(problem_id = %active.id, completed, "Completion status changed");

        self.load_session().await
    }

    /// Save the student's code for the active problem.
    pub async fn save_code(&self, code: &str, language: &str) -> Result<CodeSnapshot> {
        check_length(code, "Code", self.limits.code_chars)?;
        let _guard = self.turn_lock.lock().await;
        let active = self
            .store
            .active_problem()
            .await?
            .ok_or(Error::NoActiveProblem)?;
        let language = match language.trim() {
            "" => DEFAULT_LANGUAGE,
            lang => lang,
        };
        Ok(self.store.save_code(active.id, code, language).await?)
    }

    /// The most recent code saved for the active problem.
    pub async fn latest_code(&self) -> Result<Option<CodeSnapshot>> {
        let active = self
            .store
            .active_problem()
            .await?
            .ok_or(Error::NoActiveProblem)?;
        Ok(self.store.latest_code(active.id).await?)
    }

    pub async fn include_code_in_context(&self) -> Result<bool> {
        let value = self.store.setting(INCLUDE_CODE_SETTING).await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(true))
    }

    pub async fn set_include_code_in_context(&self, include: bool) -> Result<()> {
        let _guard = self.turn_lock.lock().await;
        self.store
            .set_setting(INCLUDE_CODE_SETTING, serde_json::Value::Bool(include))
            .await?;
        Ok(())
    }
}

/// Role labels that end a generation.
fn stop_sequences(tutor_name: &str) -> Vec<String> {
    vec![
        format!("{STUDENT_LABEL}:"),
        "User:".to_string(),
        "Human:".to_string(),
        format!("\n{tutor_name}:"),
    ]
}

fn validate_text<'a>(text: &'a str, what: &str, max_chars: usize) -> Result<&'a str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{what} cannot be empty.")));
    }
    check_length(text, what, max_chars)?;
    Ok(trimmed)
}

fn check_length(text: &str, what: &str, max_chars: usize) -> Result<()> {
    let chars = text.chars().count();
    if chars > max_chars {
        return Err(Error::Validation(format!(
            "{what} is too long ({chars} characters, limit {max_chars})."
        )));
    }
    Ok(())
}

fn assembly_error(e: AssemblyError) -> Error {
    match e {
        AssemblyError::InstructionTooLarge { .. } => Error::Validation(
            "That submission is too large to review. Try sending a smaller piece of code.".into(),
        ),
        other => Error::Config {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        FailingAppendStore, ScriptedEngine, TrackingStore, controller, controller_with_config,
        sample_corpus,
    };
    use std::time::Duration;
    use zerotohire_store::InMemoryStore;

    fn roles(session: &Session) -> Vec<Role> {
        session.history.iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn converse_commits_cleaned_reply() {
        let engine = Arc::new(ScriptedEngine::new(vec![Ok(
            "Alex: (smiles) What would a brute force approach look like?\nStudent: loops".into(),
        )]));
        let (ctl, _store) = controller(engine.clone());
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();

        let outcome = ctl.converse("Where do I start?", None).await.unwrap();

        assert!(!outcome.fallback);
        assert_eq!(
            outcome.message.content,
            "What would a brute force approach look like?"
        );
        assert_eq!(outcome.message.problem_id, Some(ProblemId(1)));
        assert_eq!(roles(&outcome.session), vec![Role::Tutor, Role::User, Role::Tutor]);
        assert_eq!(outcome.session.state(), SessionState::Conversing);

        let prompt = engine.last_prompt().unwrap();
        assert!(prompt.contains("CURRENT PROBLEM: Two Sum"));
        assert!(prompt.ends_with("Student: Where do I start?\n\nAlex:"));
    }

    #[tokio::test]
    async fn generation_params_carry_role_stops() {
        let engine = Arc::new(ScriptedEngine::always("Think about pairs."));
        let (ctl, _store) = controller(engine.clone());
        ctl.converse("hi", None).await.unwrap();

        let params = engine.last_params().unwrap();
        assert_eq!(params.max_tokens, 400);
        assert!(params.stop.contains(&"Student:".to_string()));
        assert!(params.stop.contains(&"User:".to_string()));
        assert!(params.stop.contains(&"\nAlex:".to_string()));
    }

    #[tokio::test]
    async fn inference_failure_commits_fallback() {
        let engine = Arc::new(ScriptedEngine::failing());
        let (ctl, _store) = controller(engine);

        let outcome = ctl.converse("hello?", None).await.unwrap();

        assert!(outcome.fallback);
        assert_eq!(outcome.message.content, FALLBACK_MESSAGE);
        assert_eq!(roles(&outcome.session), vec![Role::User, Role::Tutor]);
    }

    #[tokio::test]
    async fn empty_cleaned_output_commits_fallback() {
        let engine = Arc::new(ScriptedEngine::always("<think>hmm</think> (pauses) Student: hi"));
        let (ctl, _store) = controller(engine);

        let outcome = ctl.converse("hello?", None).await.unwrap();
        assert!(outcome.fallback);
        assert_eq!(outcome.message.content, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn invalid_input_rejected_before_mutation() {
        let engine = Arc::new(ScriptedEngine::always("ok"));
        let (ctl, store) = controller(engine.clone());

        assert!(matches!(ctl.converse("   ", None).await, Err(Error::Validation(_))));
        let huge = "x".repeat(10_000);
        assert!(matches!(ctl.converse(&huge, None).await, Err(Error::Validation(_))));
        assert!(matches!(
            ctl.select_problem_by_id(ProblemId(9999)).await,
            Err(Error::Validation(_))
        ));

        assert_eq!(engine.call_count(), 0);
        assert!(store.recent_messages(None, None).await.unwrap().is_empty());
        assert!(store.active_problem().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_user_append_stops_the_turn() {
        let engine = Arc::new(ScriptedEngine::always("ok"));
        let ctl = SessionController::new(
            engine.clone(),
            Arc::new(FailingAppendStore::new()),
            sample_corpus(),
            &AppConfig::default(),
        )
        .unwrap();

        let err = ctl.converse("hello", None).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn evaluate_without_problem_is_rejected_without_mutation() {
        let engine = Arc::new(ScriptedEngine::always("ok"));
        let (ctl, store) = controller(engine.clone());
        let stats_before = store.stats().await.unwrap();

        let err = ctl
            .evaluate_submission("def f():\n    return 1", "python")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoActiveProblem));
        assert_eq!(engine.call_count(), 0);
        assert!(store.recent_messages(None, None).await.unwrap().is_empty());
        assert!(store.active_problem().await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap(), stats_before);
    }

    #[tokio::test]
    async fn boilerplate_submission_uses_boilerplate_prompt() {
        let engine = Arc::new(ScriptedEngine::always("What should happen first?"));
        let (ctl, _store) = controller(engine.clone());
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();

        let code = "class Solution:\n    def twoSum(self, nums: List[int], target: int) -> List[int]:\n        pass\n";
        let outcome = ctl.evaluate_submission(code, "python").await.unwrap();

        assert_eq!(outcome.kind, SubmissionKind::Boilerplate);
        let prompt = engine.last_prompt().unwrap();
        assert!(prompt.contains("submitted only the boilerplate code for \"Two Sum\""));
        assert!(prompt.ends_with("start implementing logic.\n\nAlex:"));
        assert_eq!(engine.last_params().unwrap().max_tokens, 300);

        // Only the review is stored, never the instruction.
        assert_eq!(roles(&outcome.turn.session), vec![Role::Tutor, Role::Tutor]);
        assert!(!outcome
            .turn
            .session
            .history
            .iter()
            .any(|m| m.content.contains("boilerplate")));
    }

    #[tokio::test]
    async fn substantive_submission_uses_review_prompt() {
        let engine = Arc::new(ScriptedEngine::always("Why a dictionary?"));
        let (ctl, _store) = controller(engine.clone());
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();

        let code = "def twoSum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        seen[n] = i\n";
        let outcome = ctl.evaluate_submission(code, "").await.unwrap();

        assert_eq!(outcome.kind, SubmissionKind::Substantive);
        assert!(engine
            .last_prompt()
            .unwrap()
            .contains("submitted the following python code"));
    }

    #[tokio::test]
    async fn dynamic_programming_request_selects_tagged_problem() {
        let engine = Arc::new(ScriptedEngine::always("unused"));
        let (ctl, store) = controller(engine.clone());

        let outcome = ctl
            .select_problem("give me a dynamic programming problem")
            .await
            .unwrap();

        assert_eq!(outcome.stage, Some(RetrievalStage::Taxonomy));
        assert!(outcome.problem.has_topic("Dynamic Programming"));
        assert_eq!(
            store.active_problem().await.unwrap().map(|a| a.id),
            Some(outcome.problem.id)
        );
        let history = store.recent_messages(None, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Tutor);
        assert!(history[0].content.starts_with("Perfect! I found a dynamic programming problem"));
        assert!(history[0].content.contains("Hello! I'm Alex"));
        assert_eq!(outcome.session.state(), SessionState::ProblemSelected);
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn unmatched_request_explains_fallback() {
        let (ctl, _store) = controller(Arc::new(ScriptedEngine::always("unused")));
        let outcome = ctl.select_problem("quantum chess").await.unwrap();
        assert_eq!(outcome.stage, Some(RetrievalStage::Fallback));
        assert!(outcome
            .message
            .content
            .starts_with("I couldn't find a specific problem matching 'quantum chess'"));
    }

    #[tokio::test]
    async fn returning_student_gets_continuation_greeting() {
        let (ctl, _store) = controller(Arc::new(ScriptedEngine::always("Sure.")));
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();
        ctl.converse("done with this one", None).await.unwrap();

        let outcome = ctl.select_problem_by_id(ProblemId(70)).await.unwrap();
        assert!(outcome.message.content.starts_with("Great! Let's work on 'Climbing Stairs'"));
        assert_eq!(outcome.session.state(), SessionState::ProblemSelected);
    }

    #[tokio::test]
    async fn stream_forwards_fragments_then_commits() {
        let engine = Arc::new(ScriptedEngine::always("What is the base case?"));
        let (ctl, store) = controller(engine);
        ctl.select_problem_by_id(ProblemId(70)).await.unwrap();

        let mut rx = ctl.converse_stream("help", None).await.unwrap();
        let mut fragments = String::new();
        let mut done = None;
        while let Some(event) = rx.recv().await {
            match event {
                TutorStreamEvent::Fragment { content } => fragments.push_str(&content),
                TutorStreamEvent::Done { message, fallback, .. } => {
                    assert!(!fallback);
                    done = Some(message);
                }
                TutorStreamEvent::Error { message } => panic!("unexpected error: {message}"),
            }
        }

        assert_eq!(fragments, "What is the base case?");
        let message = done.unwrap();
        assert_eq!(message.content, "What is the base case?");
        let history = store.recent_messages(None, None).await.unwrap();
        assert_eq!(history.last().unwrap().content, "What is the base case?");
    }

    #[tokio::test]
    async fn stream_failure_commits_fallback() {
        let (ctl, _store) = controller(Arc::new(ScriptedEngine::failing()));
        let mut rx = ctl.converse_stream("help", None).await.unwrap();

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        match last.unwrap() {
            TutorStreamEvent::Done { message, fallback, .. } => {
                assert!(fallback);
                assert_eq!(message.content, FALLBACK_MESSAGE);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnected_stream_commits_nothing() {
        let engine = Arc::new(
            ScriptedEngine::always("one two three four five six seven eight")
                .with_fragment_delay(Duration::from_millis(20)),
        );
        let (ctl, store) = controller(engine);
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();

        let mut rx = ctl.converse_stream("explain please", None).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "fragment");
        drop(rx);

        // Wait for the producer to notice and release the lock.
        for _ in 0..100 {
            if !ctl.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!ctl.is_busy());

        let history = store.recent_messages(None, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::User);
        assert!(history.iter().filter(|m| m.role == Role::Tutor).count() == 1);
    }

    #[tokio::test]
    async fn concurrent_turns_are_serialized() {
        let engine = Arc::new(
            ScriptedEngine::always("Keep going.").with_delay(Duration::from_millis(30)),
        );
        let store = Arc::new(TrackingStore::new());
        let ctl = SessionController::new(
            engine.clone(),
            store.clone(),
            sample_corpus(),
            &AppConfig::default(),
        )
        .unwrap();

        let turns: Vec<_> = ["first", "second", "third"]
            .into_iter()
            .map(|text| {
                let ctl = ctl.clone();
                tokio::spawn(async move { ctl.converse(text, None).await })
            })
            .collect();
        for turn in turns {
            turn.await.unwrap().unwrap();
        }

        // Prompts are assembled from a history read; none overlapped.
        assert_eq!(store.max_reads_in_flight(), 1);
        assert_eq!(engine.max_in_flight(), 1);
        let history = store.recent_messages(None, None).await.unwrap();
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Tutor, Role::User, Role::Tutor, Role::User, Role::Tutor]
        );
    }

    #[tokio::test]
    async fn code_and_setting_writes_wait_for_the_turn() {
        let engine = Arc::new(
            ScriptedEngine::always("Keep going.").with_delay(Duration::from_millis(50)),
        );
        let (ctl, store) = controller(engine);
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();

        let running = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.converse("first", None).await }
        });
        while !ctl.is_busy() {
            tokio::task::yield_now().await;
        }

        // Intro, then the student's message; the reply lands before the save.
        ctl.save_code("seen = {}", "python").await.unwrap();
        let committed = store.recent_messages(None, None).await.unwrap();
        assert_eq!(committed.len(), 3);
        assert_eq!(committed[2].content, "Keep going.");
        running.await.unwrap().unwrap();

        let running = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.converse("second", None).await }
        });
        while !ctl.is_busy() {
            tokio::task::yield_now().await;
        }

        ctl.set_include_code_in_context(false).await.unwrap();
        let committed = store.recent_messages(None, None).await.unwrap();
        assert_eq!(committed.len(), 5);
        assert_eq!(committed[4].role, Role::Tutor);
        running.await.unwrap().unwrap();
        assert!(!ctl.include_code_in_context().await.unwrap());
    }

    #[tokio::test]
    async fn reject_policy_reports_busy() {
        let engine = Arc::new(
            ScriptedEngine::always("Keep going.").with_delay(Duration::from_millis(100)),
        );
        let mut config = AppConfig::default();
        config.session.lock_policy = LockPolicy::Reject;
        let (ctl, store) = controller_with_config(engine.clone(), &config);

        let running = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.converse("first", None).await }
        });
        while !ctl.is_busy() {
            tokio::task::yield_now().await;
        }

        let err = ctl.converse("second", None).await.unwrap_err();
        assert!(matches!(err, Error::Busy));
        running.await.unwrap().unwrap();

        assert_eq!(engine.max_in_flight(), 1);
        let history = store.recent_messages(None, None).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn clear_operations_are_idempotent() {
        let (ctl, _store) = controller(Arc::new(ScriptedEngine::always("ok")));
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();
        ctl.converse("hi", None).await.unwrap();

        let session = ctl.clear_history(None).await.unwrap();
        assert!(session.history.is_empty());
        assert!(session.active_problem.is_some());
        assert_eq!(session.state(), SessionState::ProblemSelected);
        ctl.clear_history(None).await.unwrap();

        let session = ctl.clear_session().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(ctl.clear_session().await.unwrap(), Session::default());
    }

    #[tokio::test]
    async fn clear_history_scoped_to_problem() {
        let (ctl, store) = controller(Arc::new(ScriptedEngine::always("ok")));
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();
        ctl.converse("about two sum", None).await.unwrap();
        ctl.select_problem_by_id(ProblemId(70)).await.unwrap();

        ctl.clear_history(Some(ProblemId(1))).await.unwrap();
        let history = store.recent_messages(None, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].problem_id, Some(ProblemId(70)));
    }

    #[tokio::test]
    async fn reset_problem_removes_traces_and_unsets_active() {
        let (ctl, store) = controller(Arc::new(ScriptedEngine::always("ok")));
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();
        ctl.save_code("def f(): pass", "python").await.unwrap();
        ctl.set_completed(true).await.unwrap();

        let session = ctl.reset_problem(ProblemId(1)).await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(store.latest_code(ProblemId(1)).await.unwrap().is_none());
        assert!(!store.is_completed(ProblemId(1)).await.unwrap());
        assert!(store.recent_messages(Some(ProblemId(1)), None).await.unwrap().is_empty());

        ctl.reset_problem(ProblemId(1)).await.unwrap();
    }

    #[tokio::test]
    async fn completion_requires_active_problem() {
        let (ctl, store) = controller(Arc::new(ScriptedEngine::always("ok")));
        assert!(matches!(ctl.set_completed(true).await, Err(Error::NoActiveProblem)));
        assert!(matches!(ctl.latest_code().await, Err(Error::NoActiveProblem)));

        ctl.select_problem_by_id(ProblemId(70)).await.unwrap();
        let session = ctl.set_completed(true).await.unwrap();
        assert_eq!(session.history.last().unwrap().role, Role::System);
        assert!(ctl.status().await.unwrap().completed);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_completed, 1);
        assert_eq!(stats.completed_by_difficulty.get("Easy"), Some(&1));

        ctl.set_completed(false).await.unwrap();
        assert!(!ctl.status().await.unwrap().completed);
    }

    #[tokio::test]
    async fn code_context_follows_setting() {
        let engine = Arc::new(ScriptedEngine::always("ok"));
        let (ctl, _store) = controller(engine.clone());
        ctl.select_problem_by_id(ProblemId(1)).await.unwrap();
        ctl.save_code("seen = {}", "python").await.unwrap();

        ctl.converse("look at my code", None).await.unwrap();
        assert!(engine.last_prompt().unwrap().contains("STUDENT'S CURRENT CODE:\n```\nseen = {}\n```"));

        ctl.set_include_code_in_context(false).await.unwrap();
        assert!(!ctl.include_code_in_context().await.unwrap());
        ctl.converse("and now?", Some("x = 1")).await.unwrap();
        assert!(!engine.last_prompt().unwrap().contains("STUDENT'S CURRENT CODE"));
    }

    #[tokio::test]
    async fn system_notes_never_reach_the_prompt() {
        let engine = Arc::new(ScriptedEngine::always("ok"));
        let (ctl, _store) = controller(engine.clone());
        ctl.select_problem_by_id(ProblemId(70)).await.unwrap();
        ctl.set_completed(true).await.unwrap();
        ctl.converse("what next?", None).await.unwrap();

        assert!(!engine.last_prompt().unwrap().contains("Marked 'Climbing Stairs'"));
    }

    #[tokio::test]
    async fn status_reports_session_shape() {
        let store = Arc::new(InMemoryStore::new());
        let ctl = SessionController::new(
            Arc::new(ScriptedEngine::always("ok")),
            store,
            sample_corpus(),
            &AppConfig::default(),
        )
        .unwrap();

        let status = ctl.status().await.unwrap();
        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(status.corpus_size, 4);
        assert_eq!(status.engine, "scripted_mock");
        assert!(status.include_code_in_context);
        assert!(!status.busy);
    }

    #[test]
    fn tiny_budget_is_a_config_error() {
        let mut config = AppConfig::default();
        config.budget.model_context_tokens = 700;
        let result = SessionController::new(
            Arc::new(ScriptedEngine::always("ok")),
            Arc::new(InMemoryStore::new()),
            sample_corpus(),
            &config,
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
