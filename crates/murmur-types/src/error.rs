use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced to the caller of a chat operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("chat {0} not found")]
    ChatNotFound(Uuid),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("message could not be persisted: {0}")]
    Persistence(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::ChatNotFound(_) => ErrorKind::ChatNotFound,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }
}

/// Wire form of [`ChatError`], carried in gateway `Error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    ChatNotFound,
    ValidationError,
    PersistenceFailure,
}
