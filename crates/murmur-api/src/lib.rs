pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// REST routes. Every route requires a bearer token.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chats", get(chats::list_chats).post(chats::create_direct_chat))
        .route("/chats/group", post(chats::create_group_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state)
}
