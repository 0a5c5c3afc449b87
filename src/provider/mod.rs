//! Provider abstraction for upstream completion APIs
//!
//! One uniform interface over both backends: OpenRouter (primary, any model,
//! user credential) and LLM7 (system provider, curated free tier). Callers
//! never branch on the concrete type; the completion router hands back a
//! `dyn Provider` and everything downstream speaks this trait.

mod llm7;
mod openrouter;
mod sse;

pub use llm7::Llm7Client;
pub use openrouter::OpenRouterClient;
pub use sse::{SseDecoder, SseFrame};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::WireMessage;

/// Token budget sent with every completion request
pub const MAX_COMPLETION_TOKENS: u32 = 4000;
/// Sampling temperature sent with every completion request
pub const COMPLETION_TEMPERATURE: f64 = 0.7;

/// One completion request, already in wire shape.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Provider-specific model name (aliasing already applied)
    pub model: String,
    pub messages: Vec<WireMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }
}

/// Events produced by a streaming completion.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text fragment
    Delta(String),
    /// Stream finished cleanly; the receiver sees no further events
    Done,
    /// Stream failed; terminal like Done
    Error(ProviderError),
}

/// Unified client trait for completion backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open a streaming completion. Pre-stream failures (connection, HTTP
    /// status) surface as an error here; failures after the stream opens
    /// arrive as `StreamEvent::Error`.
    async fn create_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError>;

    /// Non-streaming completion returning the final text.
    async fn create(&self, request: CompletionRequest) -> Result<String, ProviderError>;

    /// Probe whether the configured credential is accepted upstream.
    async fn validate_credential(&self) -> bool;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

// ============================================================================
// Shared chat-completions dialect (request body and response shapes)
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CompletionBody {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl CompletionBody {
    pub(crate) fn new(request: CompletionRequest, stream: bool) -> Self {
        Self {
            model: request.model,
            messages: request.messages,
            stream,
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: COMPLETION_TEMPERATURE,
        }
    }
}

/// Streamed chunk: `choices[0].delta.content` carries the fragment.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatStreamChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    pub delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Non-streaming body: `choices[0].message.content` carries the text.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Error envelope providers return, both nested and flat variants.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// Pull the human-readable message out of an upstream error body. Falls back
/// to the raw text when the body is not the JSON envelope.
pub(crate) fn extract_error_message(raw: &str, fallback: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(raw) {
        if let Some(message) = envelope.error.and_then(|e| e.message) {
            return message;
        }
        if let Some(message) = envelope.message {
            return message;
        }
    }
    if raw.is_empty() {
        fallback.to_string()
    } else {
        raw.to_string()
    }
}

/// A streamed body that was really a JSON error document. Providers
/// sometimes answer 200 OK and put the failure in the payload; the
/// accumulated text is checked after the stream ends.
pub(crate) fn embedded_stream_error(accumulated: &str) -> Option<String> {
    let trimmed = accumulated.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let envelope: ErrorEnvelope = serde_json::from_str(trimmed).ok()?;
    envelope
        .error
        .map(|e| e.message.unwrap_or_else(|| trimmed.to_string()))
}
