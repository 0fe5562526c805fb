//! Inference engine implementations for ZeroToHire.
//!
//! All engines implement the `zerotohire_core::InferenceEngine` trait.
//! [`router::build_from_config`] selects the right endpoint from configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatEngine;
pub use router::build_from_config;
