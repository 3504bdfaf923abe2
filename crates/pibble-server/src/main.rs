mod config;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pibble_api::media::{MediaStorage, PUBLIC_PREFIX};
use pibble_api::state::{AppState, AppStateInner};
use pibble_db::Database;
use pibble_gateway::connection;
use pibble_gateway::dispatcher::Dispatcher;
use pibble_gateway::identity::IdentityResolver;
use pibble_gateway::session::SessionManager;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pibble=debug,pibble_gateway=debug,pibble_api=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;

    // Shared state
    let identity = IdentityResolver::new(Arc::new(db), config.admins.clone());
    let dispatcher = Dispatcher::new();
    let sessions = SessionManager::new(dispatcher.clone(), identity.clone(), config.public_persist_policy);
    let media = MediaStorage::new(config.upload_dir.clone()).await?;

    let app_state: AppState = Arc::new(AppStateInner {
        identity,
        dispatcher,
        media,
        max_upload_bytes: config.max_upload_bytes,
    });

    // Routes
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(sessions);

    let app = Router::new()
        .merge(pibble_api::router(app_state))
        .merge(ws_route)
        .route("/health", get(health))
        .nest_service(&format!("/{}", PUBLIC_PREFIX), ServeDir::new(&config.upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Pibble server listening on {}", addr);
    info!(
        "Public message persistence policy: {:?}, upload limit {} bytes",
        config.public_persist_policy, config.max_upload_bytes
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Pibble server stopped");
    Ok(())
}

async fn ws_upgrade(State(sessions): State<SessionManager>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, sessions))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
