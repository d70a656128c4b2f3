use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Liveness probe at the server root
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Server is running!" }))
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let report = state.image_service.health().await;

    let (status, label) = if report.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(json!({
            "status": label,
            "service": "image-service",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "metadata_store": report.metadata_store,
                "blob_store": report.blob_store,
            },
        })),
    )
}
