use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use murmur_gateway::Identity;
use murmur_types::ChatError;
use murmur_types::api::{HistoryQuery, SendMessageRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /chats/{chat_id}/messages: history for a chat the caller belongs to.
/// Unknown chats and chats the caller is not in both answer 404.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query.clamped(state.history_limit);
    let user_id = identity.user_id;

    let messages = state
        .with_store(move |store| {
            let chat = store.get_chat(chat_id)?.ok_or(ChatError::ChatNotFound(chat_id))?;
            if !chat.has_participant(user_id) {
                return Err(ChatError::ChatNotFound(chat_id));
            }
            Ok(store.list_messages(chat_id, query)?)
        })
        .await?;

    debug!("{} fetched {} messages from chat {}", identity.username, messages.len(), chat_id);
    Ok(Json(messages))
}

/// POST /chats/{chat_id}/messages: same path as a gateway send: stored,
/// then pushed to everyone in the chat's room.
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.router.send(chat_id, identity.user_id, &req.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use murmur_db::MessageStore;
    use murmur_gateway::SessionHandle;
    use murmur_types::Message;
    use murmur_types::events::GatewayEvent;
    use serde_json::json;
    use uuid::Uuid;

    use crate::test_support::{call, get, json, post_json, state};

    #[tokio::test]
    async fn history_is_ascending_for_participants() {
        let (state, db) = state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let chat = db.find_or_create_direct_chat(a, b).unwrap();
        let first = db.create_message(chat.id, a, "first").unwrap();
        let second = db.create_message(chat.id, b, "second").unwrap();

        let (status, body) = call(&state, get(&format!("/chats/{}/messages", chat.id), b)).await;
        assert_eq!(status, StatusCode::OK);
        let messages: Vec<Message> = json(&body);
        assert_eq!(messages, vec![first, second]);
    }

    #[tokio::test]
    async fn history_respects_limit_and_cursor() {
        let (state, db) = state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let chat = db.find_or_create_direct_chat(a, b).unwrap();
        let sent: Vec<Message> = (0..4)
            .map(|i| db.create_message(chat.id, a, &format!("m{}", i)).unwrap())
            .collect();

        let uri = format!("/chats/{}/messages?limit=2&before={}", chat.id, sent[3].id);
        let (status, body) = call(&state, get(&uri, a)).await;
        assert_eq!(status, StatusCode::OK);
        let page: Vec<Message> = json(&body);
        assert_eq!(page, sent[1..3].to_vec());
    }

    #[tokio::test]
    async fn outsiders_and_unknown_chats_get_404() {
        let (state, db) = state();
        let chat = db.find_or_create_direct_chat(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        let (status, _) = call(&state, get(&format!("/chats/{}/messages", chat.id), Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            call(&state, get(&format!("/chats/{}/messages", Uuid::new_v4()), Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: serde_json::Value = json(&body);
        assert_eq!(err["error"], "ChatNotFound");
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_401() {
        let (state, db) = state();
        let chat = db.find_or_create_direct_chat(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let uri = format!("/chats/{}/messages", chat.id);

        let request = axum::http::Request::get(&uri).body(axum::body::Body::empty()).unwrap();
        let (status, _) = call(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = axum::http::Request::get(&uri)
            .header("authorization", "Bearer not-a-token")
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, _) = call(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rest_send_persists_and_pushes_live() {
        let (state, db) = state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let chat = db.find_or_create_direct_chat(a, b).unwrap();
        let (listener, mut rx) = SessionHandle::new(b, 4);
        state.router.join(&listener, chat.id).await;

        let (status, body) = call(
            &state,
            post_json(&format!("/chats/{}/messages", chat.id), a, json!({ "body": "over http" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let sent: Message = json(&body);
        assert_eq!(sent.sender_id, a);

        assert_eq!(rx.try_recv().unwrap(), GatewayEvent::ReceiveMessage(sent.clone()));
        assert_eq!(
            db.list_messages(chat.id, Default::default()).unwrap(),
            vec![sent]
        );
    }

    #[tokio::test]
    async fn rest_send_rejects_blank_body() {
        let (state, db) = state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let chat = db.find_or_create_direct_chat(a, b).unwrap();

        let (status, body) = call(
            &state,
            post_json(&format!("/chats/{}/messages", chat.id), a, json!({ "body": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: serde_json::Value = json(&body);
        assert_eq!(err["error"], "ValidationError");
        assert_eq!(db.count_messages(&chat.id.to_string()).unwrap(), 0);
    }
}
