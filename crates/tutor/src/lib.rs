//! The tutoring session engine.
//!
//! A student turn flows through:
//!
//! 1. **Context assembly**: persona, code, problem, and recent history packed
//!    into a prompt that fits the model's budget
//! 2. **Inference** via the configured engine
//! 3. **Post-processing**: reasoning tags, stage directions, and leaked
//!    speaker labels stripped from the reply
//! 4. **Commit** to the session store
//!
//! Problem selection runs a separate retrieval cascade and never calls the
//! model. [`SessionController`] owns both flows.

pub mod context;
pub mod evaluation;
pub mod postprocess;
pub mod retriever;
pub mod session;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{AssembledPrompt, AssemblyError, AssemblyMetadata, ContextAssembler, PromptBudget};
pub use evaluation::{SubmissionKind, classify_submission};
pub use postprocess::{ResponseCleaner, extract_code_blocks};
pub use retriever::{ProblemRetriever, Retrieval, RetrievalStage, detect_problem_request};
pub use session::{
    EvaluationOutcome, FALLBACK_MESSAGE, SelectionOutcome, SessionController, SessionStatus,
    TurnOutcome,
};
pub use stream_event::TutorStreamEvent;
