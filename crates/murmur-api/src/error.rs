use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use murmur_types::ChatError;
use murmur_types::api::ErrorBody;

/// HTTP face of [`ChatError`].
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::ChatNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let body = ErrorBody {
            error: format!("{:?}", self.0.kind()),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
