use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod storage;

#[cfg(test)]
mod testing;

use config::Config;
use db::PgImageRepository;
use handlers::{health, images};
use services::ImageService;
use storage::PgBucket;

/// Schema of the blob bucket and the image metadata table
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Room for multipart boundaries and text fields on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub image_service: Arc<ImageService>,
}

fn create_router(state: AppState) -> Router {
    let images_path = format!("{}/images", state.config.server.api_prefix);
    let body_limit = state.config.storage.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let image_routes = Router::new()
        .route("/", get(images::list_images))
        .route(
            "/upload",
            post(images::upload_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/:file_id",
            get(images::stream_image).delete(images::delete_image),
        )
        .route("/:file_id/metadata", get(images::get_image_metadata));

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .nest(&images_path, image_routes)
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

// Graceful shutdown handler
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    shared::observability::init_logging(config.logging.clone())
        .context("Failed to initialize logging")?;

    info!("Starting Image Service v{}", env!("CARGO_PKG_VERSION"));

    let db_pool = shared::database::create_connection_pool(&config.database)
        .await
        .context("Failed to connect to database")?;

    MIGRATOR
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let repository = Arc::new(PgImageRepository::new(db_pool.clone()));
    let blobs = Arc::new(PgBucket::new(db_pool.clone(), &config.storage));
    info!(
        bucket = %config.storage.bucket,
        chunk_size = config.storage.chunk_size_bytes,
        "Blob bucket ready"
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        image_service: Arc::new(ImageService::new(repository, blobs)),
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!(
        "Image Service listening on {} (images under {}/images)",
        addr, config.server.api_prefix
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shared::database::close_connections(&db_pool).await;
    info!("Image Service shut down gracefully");
    Ok(())
}
