//! Public health and version probes.

use axum::Json;
use serde_json::json;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "name": "strand",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
