//! Inference engine trait: the abstraction over the language model.
//!
//! An engine takes a fully assembled prompt plus generation parameters and
//! returns either the complete text or a stream of incremental fragments.
//! Engines are single-flight from the caller's point of view; the session
//! controller never issues two generations at once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Sampling parameters for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_max_tokens() -> u32 {
    400
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            stop: Vec::new(),
        }
    }
}

impl GenerationParams {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Add stop sequences, skipping any already present.
    pub fn with_stops<I, S>(mut self, stops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for stop in stops {
            let stop = stop.into();
            if !self.stop.contains(&stop) {
                self.stop.push(stop);
            }
        }
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The raw generated text
    pub text: String,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    #[serde(default)]
    pub model: String,
}

/// A single chunk in a streaming generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial text delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The core InferenceEngine trait.
///
/// Every model backend (llama.cpp server, Ollama, OpenAI-compatible endpoints,
/// test fakes) implements this trait.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// A human-readable name for this engine (e.g., "llama.cpp", "openai").
    fn name(&self) -> &str;

    /// Generate a complete continuation of `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<Generation, InferenceError>;

    /// Generate a continuation as a stream of fragments.
    ///
    /// Default implementation calls `generate()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, InferenceError>>,
        InferenceError,
    > {
        let generation = self.generate(prompt, params).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(generation.text),
                done: true,
                usage: generation.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, InferenceError> {
        Ok(true)
    }
}
