use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

/// Health check (GET /health)
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let vendors: Vec<&str> = state
        .config
        .vendors
        .configured()
        .into_iter()
        .map(|v| v.as_str())
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "fhirVersion": "4.0.1",
        "vendors": vendors,
        "auth": if state.config.auth.enabled { "enabled" } else { "disabled" },
    }))
}
