//! Error types for the ZeroToHire domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::problem::ProblemId;

/// The top-level error type for all ZeroToHire operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Inference errors ---
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Corpus errors ---
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Session errors ---
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No problem is currently loaded")]
    NoActiveProblem,

    #[error("A reply is already being generated for this session")]
    Busy,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// A short message safe to show to the student.
    ///
    /// Infrastructure failures collapse into a polite, stable sentence;
    /// user-actionable errors keep their own wording.
    pub fn user_message(&self) -> String {
        match self {
            Error::Inference(_) => {
                "I'm having trouble thinking right now. Please try again in a moment.".into()
            }
            Error::Store(_) | Error::Serialization(_) | Error::Internal(_) => {
                "Something went wrong while saving your session. Please try again.".into()
            }
            Error::Corpus(CorpusError::Empty) => {
                "There are no problems available right now.".into()
            }
            Error::Corpus(_) | Error::Config { .. } => {
                "The tutor is not set up correctly. Please check the configuration.".into()
            }
            Error::NoActiveProblem => {
                "No problem is currently loaded. Pick a problem first.".into()
            }
            Error::Busy => "I'm still answering your last message. One moment!".into(),
            Error::Validation(msg) => msg.clone(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by inference backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Inference backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("The problem corpus is empty")]
    Empty,

    #[error("Problem not found: {0}")]
    NotFound(ProblemId),

    #[error("Failed to read corpus: {0}")]
    Load(String),

    #[error("Failed to parse corpus: {0}")]
    Parse(String),
}
