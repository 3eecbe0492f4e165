use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    chat::{Correspondent, InboxEntry},
    error::Result,
    models::{
        conversation::{BroadcastTarget, Message},
        session::Session,
    },
    state::AppState,
};

/// The request payload for sending a message.
#[derive(Deserialize, Debug)]
pub struct SendMessageRequest {
    pub content: String,
}

/// The request payload for publishing a broadcast.
#[derive(Deserialize, Debug)]
pub struct BroadcastRequest {
    pub title: String,
    pub body: String,
    pub target: BroadcastTarget,
}

/// An opened conversation with its history.
#[derive(Serialize)]
pub struct ConversationResponse {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
}

pub async fn correspondents(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<Correspondent>>> {
    let correspondents = state.chat.correspondents(session.user_id()).await?;
    tracing::debug!("📋 Listed {} correspondents", correspondents.len());
    Ok(Json(correspondents))
}

pub async fn open_conversation(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<ConversationResponse>> {
    let (conversation_id, messages) = state
        .chat
        .open_conversation(session.user_id(), profile_id)
        .await?;
    Ok(Json(ConversationResponse {
        conversation_id,
        messages,
    }))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<InboxEntry>>> {
    let entries = state.chat.member_inbox(session.user_id()).await?;
    tracing::debug!("📋 Listed {} conversations", entries.len());
    Ok(Json(entries))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationResponse>> {
    let messages = state
        .chat
        .messages(session.user_id(), conversation_id)
        .await?;
    Ok(Json(ConversationResponse {
        conversation_id,
        messages,
    }))
}

/// Sends a message; a failed notification still answers `201` and reports
/// the failure in the body.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Response> {
    let outcome = state
        .chat
        .send_message(session.user_id(), conversation_id, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode> {
    state
        .chat
        .mark_read_as_member(session.user_id(), conversation_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Publishes a broadcast; like messages, a failed notification still
/// answers `201`.
pub async fn create_broadcast(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<BroadcastRequest>,
) -> Result<Response> {
    tracing::info!("📣 Broadcast by {}: {}", session.user_id(), payload.title);
    let outcome = state
        .chat
        .send_broadcast(&payload.title, &payload.body, payload.target)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}
