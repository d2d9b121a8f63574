use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use tracing::info;

use murmur_gateway::Identity;
use murmur_types::api::{ChatResponse, CreateChatRequest, CreateGroupChatRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /chats: the caller's direct chat with `other_user_id`.
/// Repeated calls, from either side, return the same chat.
pub async fn create_direct_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    let chat = state
        .with_store(move |store| Ok(store.find_or_create_direct_chat(user_id, req.other_user_id)?))
        .await?;

    Ok(Json(ChatResponse { chat }))
}

/// POST /chats/group
pub async fn create_group_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateGroupChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    let chat = state
        .with_store(move |store| Ok(store.create_group_chat(user_id, &req.participant_ids)?))
        .await?;

    info!(
        "{} created group chat {} with {} members",
        identity.username,
        chat.id,
        chat.participant_ids.len()
    );
    Ok(Json(ChatResponse { chat }))
}

/// GET /chats: chats the caller participates in, newest first.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    let chats = state
        .with_store(move |store| Ok(store.list_chats(user_id)?))
        .await?;

    Ok(Json(chats))
}
