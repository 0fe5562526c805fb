//! Context assembly: turns a session snapshot into a bounded prompt.

pub mod assembler;
pub mod preamble;
pub mod token;

pub use assembler::{AssembledPrompt, AssemblyError, AssemblyMetadata, ContextAssembler, PromptBudget};
pub use token::estimate_tokens;
