//! # ZeroToHire Core
//!
//! Domain types, traits, and error definitions for the ZeroToHire tutoring
//! engine. This crate has **no framework dependencies**; it defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the tutoring engine is a trait here:
//! - [`InferenceEngine`] for the language model
//! - [`SessionStore`] for persisted history and the active-problem pointer
//! - [`ProblemCorpus`] for the read-only problem set
//!
//! Implementations live in their own crates, so the session controller can be
//! exercised with in-memory fakes.

pub mod error;
pub mod message;
pub mod problem;
pub mod corpus;
pub mod inference;
pub mod store;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, InferenceError, StoreError, CorpusError};
pub use message::{Message, Role};
pub use problem::{ActiveProblemRef, Difficulty, Problem, ProblemId};
pub use corpus::{FilterOptions, InMemoryCorpus, ProblemCorpus};
pub use inference::{Generation, GenerationParams, InferenceEngine, StreamChunk, Usage};
pub use store::{CodeSnapshot, SessionStore, StoreStats};
pub use session::{Session, SessionState};
