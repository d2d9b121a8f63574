use std::sync::Arc;

use murmur_db::MessageStore;
use murmur_gateway::{IdentityResolver, MessageRouter};
use murmur_types::ChatError;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub router: MessageRouter,
    pub resolver: Arc<dyn IdentityResolver>,
    /// Upper bound on one history page.
    pub history_limit: u32,
}

impl AppStateInner {
    /// Run a blocking store call off the async runtime.
    pub async fn with_store<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&dyn MessageStore) -> Result<T, ChatError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.router.store();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| {
                tracing::error!("spawn_blocking join error: {}", e);
                ApiError(ChatError::Persistence("store task failed".into()))
            })?
            .map_err(ApiError)
    }
}
