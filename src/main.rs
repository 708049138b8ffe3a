//! Pong Arena Back binary entrypoint wiring REST, WebSocket, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pong_arena_back::{
    config::AppConfig,
    dao::game_store::memory::MemoryGameStore,
    routes,
    services::session_reaper,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());
    start_storage(&app_state).await?;
    tokio::spawn(session_reaper::run(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Supervise CouchDB when it is configured, otherwise keep results in memory.
#[cfg(feature = "couch-store")]
async fn start_storage(state: &SharedState) -> anyhow::Result<()> {
    use pong_arena_back::{
        dao::{
            game_store::{
                GameStore,
                couchdb::{CouchConfig, CouchGameStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    let Some(config) = CouchConfig::from_env().context("reading CouchDB settings")? else {
        return start_memory_storage(state).await;
    };
    info!(base_url = %config.base_url, database = %config.database, "using CouchDB storage");
    tokio::spawn(storage_supervisor::run(state.clone(), "couchdb", move || {
        let config = config.clone();
        async move {
            let store = CouchGameStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "couch-store"))]
async fn start_storage(state: &SharedState) -> anyhow::Result<()> {
    start_memory_storage(state).await
}

async fn start_memory_storage(state: &SharedState) -> anyhow::Result<()> {
    warn!("no persistent storage configured; results live in memory only");
    state
        .install_game_store(Arc::new(MemoryGameStore::new()))
        .await;
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
