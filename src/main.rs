mod config;
mod db;
mod error;
mod handlers;
mod models;
mod records;
mod services;
mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::records::{open_record_store, RecordStore};
use crate::services::{EntityService, InboxService, Reconciler};
use crate::storage::{open_blob_store, BlobStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub entities: Arc<EntityService>,
    pub inbox: Arc<InboxService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aerodesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting AeroDesk...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize stores
    let records = open_record_store(&config.database).await?;
    let blobs = open_blob_store(&config.storage);

    let entities = Arc::new(EntityService::new(
        records.clone(),
        Reconciler::new(blobs.clone()),
        config.gallery.clone(),
    ));
    let inbox = Arc::new(InboxService::new(records.clone()));

    // Create app state
    let state = AppState {
        config: config.clone(),
        records,
        blobs,
        entities,
        inbox,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.server.max_upload_mb * 1024 * 1024;

    let api_routes = Router::new()
        // Entities
        .route(
            "/entities/:kind",
            get(handlers::entity::list_entities).post(handlers::entity::create_entity),
        )
        .route("/entities/:kind/stream", get(handlers::entity::stream_entities))
        .route(
            "/entities/:kind/:id",
            get(handlers::entity::get_entity)
                .put(handlers::entity::update_entity)
                .delete(handlers::entity::delete_entity),
        )
        // Inbox
        .route("/inbox/:kind", get(handlers::inbox::list_inbox))
        .route("/inbox/:kind/:id", delete(handlers::inbox::delete_inbox_item))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/blobs/*path", get(handlers::blob::get_blob))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
