//! Server types for HTTP API
//!
//! Contains request bodies, response shapes, and the single-model SSE
//! events. Consensus events live in `crate::consensus` next to the
//! orchestrator that emits them.

use serde::{Deserialize, Serialize};

use crate::message::Attachment;

/// API version for capability detection
pub const API_VERSION: &str = "2025.8.1";

// ============================================================================
// Request bodies
// ============================================================================

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Existing conversation to continue; a fresh one is created when
    /// absent or not owned by the caller.
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Body of `POST /api/chat/consensus`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Body of `POST /api/generate-title`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTitleRequest {
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub assistant_response: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Body of `POST /api/validate-key`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

// ============================================================================
// SSE Event Types (single-model mode)
// ============================================================================

/// Events sent to the frontend on a single-model chat stream. The wire
/// shape is field-discriminated rather than tagged: the client keys off
/// `chunk`/`titleUpdate`/`done`/`error`. The stream ends by closing,
/// with no terminal frame.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatStreamEvent {
    /// One text fragment.
    Chunk { chunk: String },

    /// A title was synthesized for a fresh conversation.
    #[serde(rename_all = "camelCase")]
    TitleUpdate {
        title_update: bool,
        title: String,
        conversation_id: String,
    },

    /// The turn finished; terminal.
    #[serde(rename_all = "camelCase")]
    Done { done: bool, conversation_id: String },

    /// The turn failed; terminal. `error_content` is the rendered
    /// markdown the UI shows in place of the assistant message.
    #[serde(rename_all = "camelCase")]
    Error { error: String, error_content: String },
}

// ============================================================================
// Response shapes
// ============================================================================

/// One catalog entry as `GET /api/models` reports it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    /// Whether the caller's current credential state can run this model.
    pub available: bool,
    pub requires_api_key: bool,
    pub supports_images: bool,
    pub supports_pdf: bool,
    pub max_file_size_mb: u64,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}
