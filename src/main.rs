//! Live quiz backend entrypoint wiring REST, WebSocket, and quiz store layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::quiz_store::{InMemoryQuizStore, QuizStore};
use services::session_service;
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    install_quiz_store(&app_state).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

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
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the quiz store: MongoDB under supervision when `MONGO_URI` is set,
/// otherwise the in-memory store seeded from the optional quiz catalog.
async fn install_quiz_store(state: &SharedState) {
    if env::var_os("MONGO_URI").is_some() {
        #[cfg(feature = "mongo-store")]
        {
            spawn_mongo_supervisor(state.clone());
            return;
        }
        #[cfg(not(feature = "mongo-store"))]
        warn!("MONGO_URI is set but the `mongo-store` feature is disabled; using in-memory store");
    }

    let store = match state.config().quiz_catalog_path.as_deref() {
        Some(path) => match InMemoryQuizStore::load_catalog(path) {
            Ok(store) => {
                info!(path = %path.display(), quizzes = store.quiz_count(), "loaded quiz catalog");
                store
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to load quiz catalog; starting empty");
                InMemoryQuizStore::new()
            }
        },
        None => InMemoryQuizStore::new(),
    };
    state.install_quiz_store(Arc::new(store)).await;
    info!("using in-memory quiz store");
}

/// Keep a MongoDB quiz store connected in the background; the server stays in
/// degraded mode until the first connection succeeds.
#[cfg(feature = "mongo-store")]
fn spawn_mongo_supervisor(state: SharedState) {
    use dao::{
        quiz_store::mongodb::{MongoConfig, MongoQuizStore},
        storage::StorageError,
    };
    use services::storage_supervisor;

    tokio::spawn(storage_supervisor::run(state, || async {
        let config = MongoConfig::from_env().await?;
        let store = MongoQuizStore::connect(config).await?;
        Ok::<_, StorageError>(Arc::new(store) as Arc<dyn QuizStore>)
    }));
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

/// Wait for Ctrl+C or SIGTERM, then end every live session so open sockets close
/// and the server can drain.
async fn shutdown_signal(state: SharedState) {
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
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!(sessions = state.registry().active_count(), "shutting down");
    session_service::shutdown(&state).await;
}
