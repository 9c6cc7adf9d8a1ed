use anyhow::{Context, Result};
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use cla_server::config::Config;
use cla_server::webhook::webhook_router;
use cla_server::{AppState, GitHubApp, SqliteSignatureStore};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "cla-bot",
        "version": cla_server::get_bot_version(),
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting CLA bot {}", cla_server::get_bot_version());

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let github_app = GitHubApp::new(
        config.github_app_id,
        config.github_private_key.clone(),
        &config.github_api_url,
    )?;

    let db_path = config.database_path();
    info!("Using signature database: {}", db_path.display());
    let signatures = SqliteSignatureStore::new(&db_path)
        .with_context(|| format!("Failed to open signature database {}", db_path.display()))?;

    info!("Checking pull requests against CLA version {}", config.cla_version);

    let app_state = Arc::new(AppState {
        sessions: Arc::new(github_app),
        signatures: Arc::new(signatures),
        webhook_secret: config.github_webhook_secret.clone(),
        cla_version: config.cla_version.clone(),
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
