//! Searches made with the proxy's own backend-services token rather than
//! a user's vendor token

use axum::{
    extract::State,
    response::Json,
    Extension,
};
use connectehr_core::{bundle::summarize_patients, Vendor};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{fhir_client, vendor_settings};
use crate::{
    audit::{self, Access, AuditContext},
    backend_services::system_token,
    error::ApiError,
    extract::Query,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct SystemPatientParams {
    pub family: Option<String>,
    pub given: Option<String>,
    pub birthdate: Option<String>,
}

/// GET /{vendor}/system/patients?family[&given&birthdate]
pub async fn search_patients(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    Query(params): Query<SystemPatientParams>,
) -> Result<Json<Value>, ApiError> {
    let settings = vendor_settings(&state, vendor)?;

    let mut query = Vec::new();
    for (name, value) in [
        ("family", &params.family),
        ("given", &params.given),
        ("birthdate", &params.birthdate),
    ] {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            query.push((name, value));
        }
    }
    if !query.iter().any(|(name, _)| *name == "family") {
        return Err(ApiError::BadRequest(
            "Missing required parameter: family".to_string(),
        ));
    }

    let token = system_token(&state.http, &state.system_tokens, vendor, settings).await?;
    let bundle = fhir_client(&state, vendor)?
        .search("Patient", &query, &token)
        .await?;

    audit::log_access(&state, &context, vendor, Access::search("Patient", None));
    Ok(Json(json!({ "results": summarize_patients(&bundle) })))
}
