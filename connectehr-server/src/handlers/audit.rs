use axum::{
    extract::State,
    response::Json,
    Extension,
};
use connectehr_core::Vendor;
use connectehr_store::AuditQuery;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    audit::{self, Access, AuditContext},
    error::ApiError,
    extract::Query,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct LogViewParams {
    pub patient_id: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogParams {
    pub patient_id: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

/// Record a view reported by the frontend (POST /{vendor}/audit/log-view)
pub async fn log_view(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    Query(params): Query<LogViewParams>,
) -> Result<Json<Value>, ApiError> {
    let access = Access {
        action: params.action.as_deref().unwrap_or("view"),
        resource_type: params.resource_type.as_deref().unwrap_or("Unknown"),
        resource_id: params.resource_id.as_deref(),
        patient_id: params.patient_id.as_deref(),
    };

    let id = audit::record_view(&state, &context, vendor, access).await?;
    Ok(Json(json!({ "status": "logged", "id": id })))
}

/// Read the audit trail back, newest first (GET /audit/logs, admin only)
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditLogParams>,
) -> Result<Json<Value>, ApiError> {
    let query = AuditQuery {
        patient_id: params.patient_id,
        user_id: params.user_id,
        limit: params.limit,
    };

    let entries = state.audit.lock().await.recent(&query)?;
    Ok(Json(json!({
        "total": entries.len(),
        "entries": entries,
    })))
}
