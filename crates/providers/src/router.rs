//! Engine selection: builds the configured inference engine.

use std::sync::Arc;
use std::time::Duration;

use zerotohire_config::AppConfig;
use zerotohire_core::inference::InferenceEngine;

use crate::openai_compat::OpenAiCompatEngine;

/// Build the inference engine described by `[inference]`.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn InferenceEngine> {
    let inference = &config.inference;
    let base_url = inference
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(&inference.provider));

    let mut engine = OpenAiCompatEngine::new(&inference.provider, base_url, &inference.model)
        .with_timeout(Duration::from_secs(inference.timeout_secs));

    if let Some(key) = &inference.api_key {
        engine = engine.with_api_key(key);
    }

    tracing::debug!(
        engine = %inference.provider,
        base_url = %engine.base_url(),
        model = %engine.model(),
        "Inference engine configured"
    );

    Arc::new(engine)
}

/// Get the default base URL for well-known backends.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        // llama.cpp server and custom endpoints
        _ => "http://localhost:8080/v1".into(),
    }
}
