// src/error.rs
// Error taxonomy for routing policy and provider failures, plus the
// HTTP boundary type handlers return before a stream opens.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Request rejected before any stream opened. Maps to an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Message or attachments required")]
    MessageRequired,

    #[error("Model is required")]
    ModelRequired,

    #[error("At least one model is required")]
    ModelsRequired,

    /// System credential in play but the requested models are not free-tier.
    #[error(
        "Models {} require an OpenRouter API key. Please add your OpenRouter API key in settings, or choose different models.",
        .models.join(", ")
    )]
    UnsupportedModels { models: Vec<String> },

    #[error(
        "Model {model} requires an OpenRouter API key. Please add your OpenRouter API key in settings, or choose a free-tier model like Llama, DeepSeek, or Grok."
    )]
    UnsupportedModel { model: String },

    /// No user key and no system key configured.
    #[error(
        "AI service is not configured. Please add your OpenRouter API key in settings to use AI models, or contact the administrator."
    )]
    CredentialRequired,
}

impl RouteError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RouteError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Classified upstream failure. Carries the user-facing message; surfaced
/// in-band per model, never as an HTTP error once the stream is open.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    ModelUnavailable(String),

    #[error("{0}")]
    Upstream(String),
}

/// Standard API error response format
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
    pub error_code: Option<String>,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            error_code: Some("INTERNAL_ERROR".to_string()),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::BAD_REQUEST,
            error_code: Some("BAD_REQUEST".to_string()),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::UNAUTHORIZED,
            error_code: Some("UNAUTHORIZED".to_string()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        Self {
            message: err.to_string(),
            status_code: err.status_code(),
            error_code: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response_json = json!({
            "error": self.message,
            "status": self.status_code.as_u16()
        });

        if let Some(error_code) = self.error_code {
            response_json["error_code"] = json!(error_code);
        }

        (self.status_code, Json(response_json)).into_response()
    }
}
