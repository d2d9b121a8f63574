use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;
use uuid::Uuid;

use murmur_types::ChatError;
use murmur_types::api::Claims;

/// Who is on the other end of a session or request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Maps a credential to a user. Tokens are issued elsewhere; this side only verifies.
pub trait IdentityResolver: Send + Sync + 'static {
    fn resolve(&self, token: &str) -> Result<Identity, ChatError>;
}

/// HS256 JWTs signed with the secret shared with the account service.
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, token: &str) -> Result<Identity, ChatError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Rejected token: {}", e);
            ChatError::Unauthorized
        })?;

        Ok(Identity {
            user_id: data.claims.sub,
            username: data.claims.username,
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
