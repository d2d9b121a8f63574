mod config;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use murmur_api::{AppState, AppStateInner};
use murmur_db::{Database, MessageStore};
use murmur_gateway::{GatewayConfig, GatewayState, IdentityResolver, JwtIdentityResolver, MessageRouter};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;
    let store: Arc<dyn MessageStore> = Arc::new(db);

    // Shared state
    let router = MessageRouter::new(store, config.send_timeout);
    let resolver: Arc<dyn IdentityResolver> = Arc::new(JwtIdentityResolver::new(&config.jwt_secret));

    let app_state: AppState = Arc::new(AppStateInner {
        router: router.clone(),
        resolver: resolver.clone(),
        history_limit: config.history_limit,
    });

    let gateway = GatewayState {
        router,
        resolver,
        config: GatewayConfig {
            session_queue: config.session_queue,
            ..GatewayConfig::default()
        },
    };

    let app = Router::new()
        .merge(murmur_api::routes(app_state))
        .merge(murmur_gateway::connection::routes(gateway))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Murmur server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
