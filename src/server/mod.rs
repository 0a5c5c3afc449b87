//! HTTP server for the chat frontend
//!
//! Exposes the completion core via REST/SSE endpoints:
//! - GET /api/status - Health check
//! - GET /api/models - Model catalog with per-caller availability
//! - POST /api/chat - SSE single-model streaming chat
//! - POST /api/chat/consensus - SSE consensus streaming chat
//! - POST /api/generate-title - Standalone title synthesis
//! - POST /api/validate-key - Provider key liveness probe

mod handlers;
mod stream;
pub mod types;

use anyhow::Result;
use axum::{
    Router,
    http::{HeaderMap, HeaderName, HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::consensus::{ConsensusOrchestrator, ConsensusSettings};
use crate::error::{ApiError, RouteError};
use crate::message::MessageFormatter;
use crate::router::{CompletionRouter, Credential};
use crate::store::ConversationStore;
use crate::title::TitleSynthesizer;

pub use types::API_VERSION;

// ============================================================================
// Server State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConversationStore>,
    pub router: Arc<CompletionRouter>,
    pub orchestrator: Arc<ConsensusOrchestrator>,
    pub titles: Arc<TitleSynthesizer>,
    pub formatter: MessageFormatter,
    pub consensus_settings: ConsensusSettings,
}

// ============================================================================
// Caller identity
// ============================================================================

/// Who is asking, as the upstream auth layer presents it in headers.
#[derive(Debug, Clone)]
pub(crate) enum Caller {
    /// Authenticated user id from `X-User-Id`.
    User(String),
    /// Guest bringing their own provider key in `X-Guest-Api-Key`.
    /// Nothing is persisted for guests.
    Guest { api_key: String },
}

impl Caller {
    pub(crate) fn user_id(&self) -> Option<&str> {
        match self {
            Caller::User(id) => Some(id),
            Caller::Guest { .. } => None,
        }
    }
}

/// Identify the caller from request headers. A non-empty guest key makes
/// the request a guest session even when a user id is also present.
pub(crate) fn identify(headers: &HeaderMap) -> Result<Caller, RouteError> {
    if let Some(api_key) = header_string(headers, "x-guest-api-key") {
        return Ok(Caller::Guest { api_key });
    }
    match header_string(headers, "x-user-id") {
        Some(user_id) => Ok(Caller::User(user_id)),
        None => Err(RouteError::Unauthorized),
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolve the credential for a caller: their own key when they have one,
/// the system credential when the operator configured one, else nothing.
pub(crate) async fn resolve_credential(
    state: &AppState,
    caller: &Caller,
) -> Result<Option<Credential>, ApiError> {
    match caller {
        Caller::Guest { api_key } => Ok(Some(Credential::UserSupplied(api_key.clone()))),
        Caller::User(user_id) => {
            let stored = state.store.user_api_key(user_id).await.map_err(|e| {
                error!("failed to load profile key: {}", e);
                ApiError::internal("Internal server error")
            })?;
            Ok(match stored {
                Some(key) => Some(Credential::UserSupplied(key)),
                None if state.router.has_system_provider() => Some(Credential::SystemDefault),
                None => None,
            })
        }
    }
}

// ============================================================================
// Routes
// ============================================================================

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-guest-api-key"),
        ]);

    // API version header on all responses
    let version_header = SetResponseHeaderLayer::if_not_present(
        HeaderName::from_static("x-api-version"),
        HeaderValue::from_static(API_VERSION),
    );

    Router::new()
        .route("/api/status", get(handlers::status_handler))
        .route("/api/models", get(handlers::models_handler))
        .route("/api/chat", post(stream::chat_handler))
        .route("/api/chat/consensus", post(stream::consensus_handler))
        .route("/api/generate-title", post(handlers::generate_title_handler))
        .route("/api/validate-key", post(handlers::validate_key_handler))
        .layer(version_header)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(bind_address: &str, state: AppState) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}
