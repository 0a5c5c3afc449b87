//! SSE streaming handlers for single-model and consensus chat.
//!
//! Both handlers follow the same shape: everything that can fail with an
//! HTTP status happens before the stream opens. Once streaming, failures
//! travel in-band as events and the response stays 200.

use std::convert::Infallible;

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::error;

use crate::consensus::{ConsensusContext, ConsensusFrame, ConsensusTarget};
use crate::error::{ApiError, RouteError};
use crate::message::{Attachment, ChatMessage, WireMessage};
use crate::provider::CompletionRequest;
use crate::task::{self, TaskUpdate};

use super::types::{ChatRequest, ChatStreamEvent, ConsensusRequest};
use super::{AppState, Caller, identify, resolve_credential};

/// POST /api/chat - stream one model's completion as SSE frames.
///
/// Frames are bare JSON objects: `{chunk}` while text arrives, one
/// `{titleUpdate}` for a fresh conversation, then `{done}`. A provider
/// failure becomes a final `{error}` frame. The stream ends by closing,
/// with no terminal sentinel.
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let caller = identify(&headers)?;

    let message = req.message.unwrap_or_default();
    if message.is_empty() && req.attachments.is_empty() {
        return Err(RouteError::MessageRequired.into());
    }
    let model = req.model.unwrap_or_default();
    if model.is_empty() {
        return Err(RouteError::ModelRequired.into());
    }

    let credential = resolve_credential(&state, &caller).await?;
    state.router.ensure_model_allowed(&model, credential.as_ref())?;

    let turn = prepare_conversation(
        &state,
        &caller,
        req.conversation_id,
        "guest",
        &model,
        &message,
        &req.attachments,
    )
    .await?;

    let content = state.formatter.format_turn(&message, &req.attachments).await;
    let mut wire = state.formatter.format_history(&turn.history).await;
    wire.push(WireMessage {
        role: "user".to_string(),
        content,
    });

    let resolution = state.router.resolve(&model, credential.as_ref())?;
    let request = CompletionRequest::new(resolution.provider_model, wire);
    let mut updates = task::spawn_completion(resolution.provider, request);

    let conversation_id = turn.conversation_id;
    let first_exchange = turn.first_exchange;

    let stream = async_stream::stream! {
        while let Some(update) = updates.recv().await {
            match update {
                TaskUpdate::Delta { delta, .. } => {
                    let event = ChatStreamEvent::Chunk { chunk: delta };
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().data(data));
                }
                TaskUpdate::Completed { text, .. } => {
                    if caller.user_id().is_some() {
                        if let Err(e) = state
                            .store
                            .save_message(&conversation_id, "assistant", &text)
                            .await
                        {
                            error!("failed to save assistant message: {}", e);
                        }
                    }

                    if first_exchange {
                        let title = state
                            .titles
                            .summarize(&message, &text, credential.as_ref())
                            .await;
                        if caller.user_id().is_some() {
                            if let Err(e) = state
                                .store
                                .update_conversation_title(&conversation_id, &title)
                                .await
                            {
                                error!("failed to update conversation title: {}", e);
                            }
                        }
                        let event = ChatStreamEvent::TitleUpdate {
                            title_update: true,
                            title,
                            conversation_id: conversation_id.clone(),
                        };
                        let data = serde_json::to_string(&event).unwrap_or_default();
                        yield Ok(Event::default().data(data));
                    }

                    let event = ChatStreamEvent::Done {
                        done: true,
                        conversation_id: conversation_id.clone(),
                    };
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().data(data));
                }
                TaskUpdate::Failed { error: reason, .. } => {
                    let rendered = format!("❌ **Error**: {reason}");
                    if caller.user_id().is_some() {
                        if let Err(e) = state
                            .store
                            .save_message(&conversation_id, "assistant", &rendered)
                            .await
                        {
                            error!("failed to save error message: {}", e);
                        }
                    }
                    let event = ChatStreamEvent::Error {
                        error: reason,
                        error_content: rendered,
                    };
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().data(data));
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// POST /api/chat/consensus - fan one prompt out to several models.
///
/// Events are tagged JSON (`consensus_start`, `consensus_update`, and so
/// on) and the stream ends with a literal `[DONE]` frame.
pub async fn consensus_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ConsensusRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let caller = identify(&headers)?;

    let message = req.message.unwrap_or_default();
    if message.is_empty() && req.attachments.is_empty() {
        return Err(RouteError::MessageRequired.into());
    }
    if req.models.is_empty() {
        return Err(RouteError::ModelsRequired.into());
    }

    let credential = resolve_credential(&state, &caller).await?;
    state
        .router
        .ensure_models_allowed(&req.models, credential.as_ref())?;

    let model_column = format!("consensus:{}", req.models.join(","));
    let turn = prepare_conversation(
        &state,
        &caller,
        req.conversation_id,
        "guest-consensus",
        &model_column,
        &message,
        &req.attachments,
    )
    .await?;

    let content = state.formatter.format_turn(&message, &req.attachments).await;
    let mut wire = state.formatter.format_history(&turn.history).await;
    wire.push(WireMessage {
        role: "user".to_string(),
        content,
    });

    // Route every model upfront so a bad request fails as HTTP, not as a
    // half-open session.
    let mut targets = Vec::with_capacity(req.models.len());
    for model in &req.models {
        let resolution = state.router.resolve(model, credential.as_ref())?;
        targets.push(ConsensusTarget {
            model: model.clone(),
            provider: resolution.provider,
            request: CompletionRequest::new(resolution.provider_model, wire.clone()),
        });
    }

    let ctx = ConsensusContext {
        conversation_id: turn.conversation_id,
        user_text: message,
        first_exchange: turn.first_exchange,
        store: caller.user_id().is_some().then(|| state.store.clone()),
        credential,
    };

    let (tx, mut rx) = mpsc::channel(100);
    state.orchestrator.run(targets, ctx, tx).await;

    let stream = async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            match frame {
                ConsensusFrame::Event(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().data(data));
                }
                ConsensusFrame::Final(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().data(data));
                    yield Ok(Event::default().data("[DONE]"));
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Everything the streaming phase needs to know about the conversation.
struct TurnContext {
    conversation_id: String,
    history: Vec<ChatMessage>,
    /// True when the conversation had no messages before this turn.
    first_exchange: bool,
}

/// Find or create the conversation for this turn and record the user
/// message. Guests get an ephemeral id and nothing is persisted.
async fn prepare_conversation(
    state: &AppState,
    caller: &Caller,
    requested_id: Option<String>,
    guest_prefix: &str,
    model_column: &str,
    message: &str,
    attachments: &[Attachment],
) -> Result<TurnContext, ApiError> {
    let requested_id = requested_id.filter(|id| !id.is_empty());

    let user_id = match caller {
        Caller::Guest { .. } => {
            let conversation_id = requested_id.unwrap_or_else(|| {
                format!("{guest_prefix}-{}", Utc::now().timestamp_millis())
            });
            return Ok(TurnContext {
                conversation_id,
                history: Vec::new(),
                first_exchange: true,
            });
        }
        Caller::User(user_id) => user_id,
    };

    // A lookup that fails or misses falls through to a fresh conversation.
    let existing = match &requested_id {
        Some(id) => state
            .store
            .find_conversation(id, user_id)
            .await
            .unwrap_or_else(|e| {
                error!("conversation lookup failed: {}", e);
                None
            }),
        None => None,
    };

    let (conversation_id, history) = match existing {
        Some(conversation) => {
            let history = state
                .store
                .load_history(&conversation.id)
                .await
                .unwrap_or_else(|e| {
                    error!("failed to load history: {}", e);
                    Vec::new()
                });
            (conversation.id, history)
        }
        None => {
            let created = state
                .store
                .create_conversation(user_id, "New Chat", model_column)
                .await
                .map_err(|e| {
                    error!("failed to create conversation: {}", e);
                    ApiError::internal("Failed to create conversation")
                })?;
            (created.id, Vec::new())
        }
    };

    let first_exchange = history.is_empty();

    let message_id = state
        .store
        .save_message(&conversation_id, "user", message)
        .await
        .map_err(|e| {
            error!("failed to save user message: {}", e);
            ApiError::internal("Failed to save user message")
        })?;

    if !attachments.is_empty() {
        if let Err(e) = state.store.save_attachments(&message_id, attachments).await {
            error!("failed to save attachments: {}", e);
        }
    }

    Ok(TurnContext {
        conversation_id,
        history,
        first_exchange,
    })
}
