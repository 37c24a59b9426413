//! Poll Rooms Back binary entrypoint wiring REST, WebSocket and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poll_rooms_back::{
    config::{AppConfig, StoreBackend},
    dao::poll_store::InMemoryPollStore,
    routes,
    services::sweeper,
    state::{AppState, SharedState},
};

const DEFAULT_PORT: u16 = 5000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config.clone());

    match config.store() {
        StoreBackend::Memory => install_memory_store(&app_state).await,
        StoreBackend::Mongo => spawn_mongo_supervisor(&app_state).await,
    }
    tokio::spawn(sweeper::run(app_state.clone()));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

async fn install_memory_store(state: &SharedState) {
    warn!("using in-memory poll store; polls are lost on restart");
    state
        .set_poll_store(Arc::new(InMemoryPollStore::new()))
        .await;
}

#[cfg(feature = "mongo-store")]
async fn spawn_mongo_supervisor(state: &SharedState) {
    use poll_rooms_back::dao::{
        poll_store::{
            PollStore,
            mongodb::{MongoConfig, MongoPollStore},
        },
        storage::StorageError,
    };

    let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://127.0.0.1:27017".into());
    let db_name = env::var("MONGO_DB").ok();
    let timeout = state.config().storage_timeout();

    tokio::spawn(poll_rooms_back::services::storage_supervisor::run(
        state.clone(),
        move || {
            let uri = uri.clone();
            let db_name = db_name.clone();
            async move {
                let config = MongoConfig::from_uri(&uri, db_name.as_deref(), timeout)
                    .await
                    .map_err(StorageError::from)?;
                let store = MongoPollStore::connect(config)
                    .await
                    .map_err(StorageError::from)?;
                Ok(Arc::new(store) as Arc<dyn PollStore>)
            }
        },
    ));
}

#[cfg(not(feature = "mongo-store"))]
async fn spawn_mongo_supervisor(state: &SharedState) {
    warn!("built without the mongo-store feature; falling back to memory");
    install_memory_store(state).await;
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
