//! Kiln API server.

use std::sync::Arc;

use kiln_api::{AppState, routes};
use kiln_config::ServerConfig;
use kiln_engine::{BuildRegistry, EventBus, GitChangeDetector, LogStore, SendGridNotifier};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!(
        definitions = %config.definitions_dir.display(),
        logs = %config.logs_dir.display(),
        max_concurrent = config.max_concurrent_builds,
        "starting kiln"
    );

    let notifier = SendGridNotifier::from_key_file(&config.sendgrid_key_file).await;
    let registry = BuildRegistry::new(
        config.definitions_dir.clone(),
        LogStore::new(config.logs_dir.clone()),
        config.max_concurrent_builds,
        Arc::new(GitChangeDetector),
        Arc::new(notifier),
        EventBus::default(),
    );

    // Load definitions, seed latest results, and bind cron triggers.
    registry.reload().await;

    let state = AppState::new(registry);
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!("starting server on {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
