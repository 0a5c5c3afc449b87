//! HTTP handlers for status, the model catalog, title synthesis, and
//! provider key validation.

use axum::{Json, extract::State, http::HeaderMap};
use serde_json::{Value, json};
use tracing::error;

use crate::error::ApiError;
use crate::provider::Provider;
use crate::router::Credential;

use super::types::{GenerateTitleRequest, ModelInfo, ModelsResponse, ValidateKeyRequest};
use super::{AppState, Caller, identify, resolve_credential};

/// Health check and status endpoint
pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "system_provider": state.router.has_system_provider(),
        "consensus_timeout_ms": state.consensus_settings.timeout.as_millis() as u64,
    }))
}

/// GET /api/models - the catalog with per-caller availability.
///
/// Anonymous callers are served too; they just see the keyless view.
pub async fn models_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ModelsResponse> {
    let credential = match identify(&headers) {
        Ok(caller) => resolve_credential(&state, &caller).await.ok().flatten(),
        Err(_) => None,
    };

    let has_user_key = matches!(credential, Some(Credential::UserSupplied(_)));
    let has_system = state.router.has_system_provider();

    let models = state
        .router
        .catalog()
        .models()
        .iter()
        .map(|descriptor| ModelInfo {
            id: descriptor.id,
            name: descriptor.display_name,
            available: has_user_key || (descriptor.free_tier && has_system),
            requires_api_key: !descriptor.free_tier,
            supports_images: descriptor.supports_images,
            supports_pdf: descriptor.supports_pdf,
            max_file_size_mb: descriptor.max_file_size_mb,
        })
        .collect();

    Json(ModelsResponse { models })
}

/// POST /api/generate-title - synthesize a title for an opening exchange.
///
/// Authenticated callers get the conversation row updated as well; for
/// guests the title is synthesized and returned without touching storage.
pub async fn generate_title_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateTitleRequest>,
) -> Result<Json<Value>, ApiError> {
    let caller = identify(&headers)?;

    let user_message = req.user_message.unwrap_or_default();
    let conversation_id = req.conversation_id.unwrap_or_default();
    if user_message.is_empty() || conversation_id.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }
    let assistant_response = req.assistant_response.unwrap_or_default();

    let credential = resolve_credential(&state, &caller).await?;
    let title = state
        .titles
        .summarize(&user_message, &assistant_response, credential.as_ref())
        .await;

    match caller {
        Caller::Guest { .. } => Ok(Json(json!({ "title": title }))),
        Caller::User(user_id) => {
            let found = state
                .store
                .find_conversation(&conversation_id, &user_id)
                .await
                .unwrap_or_else(|e| {
                    error!("conversation lookup failed: {}", e);
                    None
                });
            let Some(mut conversation) = found else {
                return Err(ApiError::internal("Failed to update title"));
            };

            state
                .store
                .update_conversation_title(&conversation_id, &title)
                .await
                .map_err(|e| {
                    error!("failed to update conversation title: {}", e);
                    ApiError::internal("Failed to update title")
                })?;

            conversation.title = title.clone();
            Ok(Json(json!({ "title": title, "conversation": conversation })))
        }
    }
}

/// POST /api/validate-key - probe whether a provider key is live.
pub async fn validate_key_handler(
    State(state): State<AppState>,
    Json(req): Json<ValidateKeyRequest>,
) -> Result<Json<Value>, ApiError> {
    let api_key = req.api_key.unwrap_or_default();
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(ApiError::bad_request("API key is required"));
    }

    let valid = state
        .router
        .primary_client(api_key)
        .validate_credential()
        .await;
    Ok(Json(json!({ "valid": valid })))
}
