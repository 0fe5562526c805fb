//! OpenAI-compatible text completion engine.
//!
//! Works with: llama.cpp server, Ollama, vLLM, OpenAI, and any endpoint that
//! exposes the `/v1/completions` API. The tutoring engine sends one fully
//! assembled prompt string per turn, so the raw completion endpoint is used
//! rather than chat completions.
//!
//! Supports:
//! - Non-streaming completions
//! - Streaming completions over SSE
//! - Health checks via `/models`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};
use zerotohire_core::error::InferenceError;
use zerotohire_core::inference::{Generation, GenerationParams, InferenceEngine, StreamChunk, Usage};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// An engine speaking the OpenAI `/completions` protocol.
pub struct OpenAiCompatEngine {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatEngine {
    /// Create a new engine against `base_url` (e.g. `http://localhost:8080/v1`).
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Create an OpenAI engine (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", model).with_api_key(api_key)
    }

    /// Create an Ollama engine (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Self {
        Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"), model)
    }

    /// Create a llama.cpp server engine (convenience constructor).
    pub fn llama_cpp(base_url: Option<&str>, model: impl Into<String>) -> Self {
        Self::new("llama_cpp", base_url.unwrap_or("http://localhost:8080/v1"), model)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str, params: &GenerationParams, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "stream": stream,
        });

        if !params.stop.is_empty() {
            body["stop"] = serde_json::json!(params.stop);
        }

        body
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

fn network_error(e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout(e.to_string())
    } else {
        InferenceError::Network(e.to_string())
    }
}

/// Map non-success statuses to domain errors.
async fn check_status(
    engine: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, InferenceError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(InferenceError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(InferenceError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if status == 404 {
        let body = response.text().await.unwrap_or_default();
        return Err(InferenceError::ModelNotFound(body));
    }

    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        warn!(engine, status, body = %error_body, "Inference backend returned error");
        return Err(InferenceError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

#[async_trait]
impl InferenceEngine for OpenAiCompatEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, InferenceError> {
        let url = format!("{}/completions", self.base_url);
        let body = self.request_body(prompt, params, false);

        debug!(engine = %self.name, model = %self.model, prompt_chars = prompt.len(), "Sending completion request");

        let response = self
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(&self.name, response).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| InferenceError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(Generation {
            text: choice.text,
            usage: api_response.usage.map(Usage::from),
            model: api_response.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, InferenceError>>, InferenceError> {
        let url = format!("{}/completions", self.base_url);
        let body = self.request_body(prompt, params, true);

        debug!(engine = %self.name, model = %self.model, prompt_chars = prompt.len(), "Sending streaming request");

        let response = self
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(&self.name, response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let engine_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(InferenceError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&String::from_utf8_lossy(&bytes)) {
                    match parse_sse_line(&line) {
                        SseEvent::Skip => {}
                        SseEvent::Done => {
                            let _ = tx.send(Ok(StreamChunk { done: true, ..Default::default() })).await;
                            return;
                        }
                        SseEvent::Chunk(chunk) => {
                            let done = chunk.done;
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                            if done {
                                return;
                            }
                        }
                        SseEvent::Invalid { data, error } => {
                            trace!(engine = %engine_name, data = %data, error = %error, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk { done: true, ..Default::default() })).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, InferenceError> {
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let response = request.send().await.map_err(network_error)?;
        Ok(response.status().is_success())
    }
}

// --- SSE parsing ---

/// Splits an incoming byte stream into complete lines.
#[derive(Default)]
struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.find('\n') {
            lines.push(self.buffer[..line_end].trim_end_matches('\r').to_string());
            self.buffer.drain(..=line_end);
        }
        lines
    }
}

#[derive(Debug)]
enum SseEvent {
    Skip,
    Done,
    Chunk(StreamChunk),
    Invalid { data: String, error: String },
}

fn parse_sse_line(line: &str) -> SseEvent {
    // Skip empty lines, SSE comments, and non-data fields
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseEvent::Skip;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            let choice = resp.choices.into_iter().next();
            let finished = choice.as_ref().is_some_and(|c| c.finish_reason.is_some());
            let content = choice.map(|c| c.text).filter(|t| !t.is_empty());
            let usage = resp.usage.map(Usage::from);

            if content.is_none() && !finished && usage.is_none() {
                return SseEvent::Skip;
            }

            SseEvent::Chunk(StreamChunk {
                content,
                // Usage arrives last when the server reports it
                done: usage.is_some(),
                usage,
            })
        }
        Err(e) => SseEvent::Invalid {
            data: data.to_string(),
            error: e.to_string(),
        },
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}
