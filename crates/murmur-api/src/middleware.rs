use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use murmur_gateway::identity::bearer_token;
use murmur_types::ChatError;

use crate::error::ApiError;
use crate::state::AppState;

/// Resolve the bearer token into an [`Identity`](murmur_gateway::Identity)
/// request extension, or reject with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError(ChatError::Unauthorized))?;

    let identity = state.resolver.resolve(token)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
