use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ensemble_server::config::Config;
use ensemble_server::db::profiles::{JsonFileStore, ProfileStore};
use ensemble_server::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    tracing::info!(?config, "ensemble-server configured");

    // Profiles are served from memory and rewritten to disk in the background.
    let store = Arc::new(JsonFileStore::open(&config.users_file).await);
    let profiles: Arc<dyn ProfileStore> = store.clone();

    let state = AppState::new(config, profiles);

    let app = Router::new()
        .merge(ensemble_server::routes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "ensemble-server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    if let Err(err) = store.flush().await {
        tracing::error!(%err, "failed to flush profiles on shutdown");
    }
    tracing::info!("ensemble-server stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
