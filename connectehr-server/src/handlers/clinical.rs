//! Clinical reads relayed to the vendor FHIR server

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    Extension,
};
use connectehr_core::{
    bundle::{filter_by_category, filter_by_type, summarize_patients},
    vendor::{DIAGNOSTIC_SERVICE_SYSTEM, LOINC_SYSTEM, OBSERVATION_CATEGORY_SYSTEM},
    CoreError, DocumentKind, ReportCategory, Vendor,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{fhir_client, upstream_token};
use crate::{
    audit::{self, Access, AuditContext},
    error::ApiError,
    extract::Query,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct PatientSearchParams {
    pub name: Option<String>,
    #[serde(rename = "_id", alias = "patient_id")]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NameParams {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ObservationParams {
    pub patient: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientParams {
    pub patient: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    non_empty(value).ok_or_else(|| ApiError::BadRequest(format!("Missing required parameter: {}", name)))
}

/// Split a `system|code` token; a bare code gets `default_system`
fn split_token<'a>(token: &'a str, default_system: &'a str) -> (&'a str, &'a str) {
    match token.split_once('|') {
        Some((system, code)) if !system.is_empty() => (system, code),
        Some((_, code)) => (default_system, code),
        None => (default_system, token),
    }
}

/// Patient search returning the vendor Bundle (GET /{vendor}/patient)
pub async fn search_patient(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Query(params): Query<PatientSearchParams>,
) -> Result<Json<Value>, ApiError> {
    let name = non_empty(&params.name);
    let id = non_empty(&params.id);

    let mut query = Vec::new();
    if let Some(name) = name {
        query.push(("name", name));
    }
    if let Some(id) = id {
        query.push(("_id", id));
    }
    if query.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one search parameter (name or _id) is required".to_string(),
        ));
    }

    let token = upstream_token(&state, vendor, &headers)?;
    let bundle = fhir_client(&state, vendor)?
        .search("Patient", &query, &token)
        .await?;

    audit::log_access(&state, &context, vendor, Access::search("Patient", id));
    Ok(Json(bundle))
}

/// Patient search flattened to display rows (GET /{vendor}/patients)
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Query(params): Query<NameParams>,
) -> Result<Json<Value>, ApiError> {
    let name = required(&params.name, "name")?;
    let token = upstream_token(&state, vendor, &headers)?;
    let bundle = fhir_client(&state, vendor)?
        .search("Patient", &[("name", name)], &token)
        .await?;

    audit::log_access(&state, &context, vendor, Access::search("Patient", None));
    Ok(Json(json!({ "patients": summarize_patients(&bundle) })))
}

/// GET /{vendor}/patient/{id}
pub async fn read_patient(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    read(&state, vendor, &context, &headers, "Patient", &id).await
}

/// GET /{vendor}/practitioner?name
pub async fn search_practitioner(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Query(params): Query<NameParams>,
) -> Result<Json<Value>, ApiError> {
    let name = required(&params.name, "name")?;
    let token = upstream_token(&state, vendor, &headers)?;
    let bundle = fhir_client(&state, vendor)?
        .search("Practitioner", &[("name", name)], &token)
        .await?;

    audit::log_access(&state, &context, vendor, Access::search("Practitioner", None));
    Ok(Json(bundle))
}

/// GET /{vendor}/practitioner/{id}
pub async fn read_practitioner(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    read(&state, vendor, &context, &headers, "Practitioner", &id).await
}

async fn read(
    state: &Arc<AppState>,
    vendor: Vendor,
    context: &AuditContext,
    headers: &HeaderMap,
    resource_type: &str,
    id: &str,
) -> Result<Json<Value>, ApiError> {
    let token = upstream_token(state, vendor, headers)?;
    let resource = fhir_client(state, vendor)?
        .read(resource_type, id, &token)
        .await?;

    audit::log_access(state, context, vendor, Access::read(resource_type, id));
    Ok(Json(resource))
}

/// Observations of a patient, optionally narrowed to one category
/// (GET /{vendor}/observations?patient&category)
pub async fn observations(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Query(params): Query<ObservationParams>,
) -> Result<Json<Value>, ApiError> {
    let patient = required(&params.patient, "patient")?;
    let category = non_empty(&params.category);

    let mut query = vec![("patient", patient)];
    if let Some(category) = category {
        query.push(("category", category));
    }

    let token = upstream_token(&state, vendor, &headers)?;
    let bundle = fhir_client(&state, vendor)?
        .search("Observation", &query, &token)
        .await?;

    let bundle = match category {
        Some(category) => {
            let (system, code) = split_token(category, OBSERVATION_CATEGORY_SYSTEM);
            filter_by_category(&bundle, system, code)
        }
        None => bundle,
    };

    audit::log_access(&state, &context, vendor, Access::search("Observation", Some(patient)));
    Ok(Json(bundle))
}

/// GET /{vendor}/diagnostic-reports/{radiology|labs}?patient
pub async fn diagnostic_reports(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Path(category): Path<String>,
    Query(params): Query<PatientParams>,
) -> Result<Json<Value>, ApiError> {
    let category: ReportCategory = category
        .parse()
        .map_err(|e: CoreError| ApiError::NotFound(e.to_string()))?;
    let patient = required(&params.patient, "patient")?;
    let token_param = category.search_token();

    let token = upstream_token(&state, vendor, &headers)?;
    let bundle = fhir_client(&state, vendor)?
        .search(
            "DiagnosticReport",
            &[("patient", patient), ("category", token_param.as_str())],
            &token,
        )
        .await?;

    let filtered = filter_by_category(&bundle, DIAGNOSTIC_SERVICE_SYSTEM, category.code());
    audit::log_access(
        &state,
        &context,
        vendor,
        Access::search("DiagnosticReport", Some(patient)),
    );
    Ok(Json(filtered))
}

/// GET /{vendor}/document-references/{lab|radiology|clinical}?patient
pub async fn document_references(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Path(kind): Path<String>,
    Query(params): Query<PatientParams>,
) -> Result<Json<Value>, ApiError> {
    let kind: DocumentKind = kind
        .parse()
        .map_err(|e: CoreError| ApiError::NotFound(e.to_string()))?;
    let patient = required(&params.patient, "patient")?;
    let type_param = kind.search_token();

    let token = upstream_token(&state, vendor, &headers)?;
    let bundle = fhir_client(&state, vendor)?
        .search(
            "DocumentReference",
            &[("patient", patient), ("type", type_param.as_str())],
            &token,
        )
        .await?;

    let filtered = filter_by_type(&bundle, LOINC_SYSTEM, kind.loinc_code());
    audit::log_access(
        &state,
        &context,
        vendor,
        Access::search("DocumentReference", Some(patient)),
    );
    Ok(Json(filtered))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_token() {
        assert_eq!(
            split_token("laboratory", OBSERVATION_CATEGORY_SYSTEM),
            (OBSERVATION_CATEGORY_SYSTEM, "laboratory")
        );
        assert_eq!(
            split_token("http://example.org/cs|vital-signs", OBSERVATION_CATEGORY_SYSTEM),
            ("http://example.org/cs", "vital-signs")
        );
        assert_eq!(
            split_token("|vital-signs", OBSERVATION_CATEGORY_SYSTEM),
            (OBSERVATION_CATEGORY_SYSTEM, "vital-signs")
        );
    }

    fn patient_query(query: &str) -> PatientSearchParams {
        let uri: axum::http::Uri = format!("/patient?{}", query).parse().unwrap();
        axum::extract::Query::<PatientSearchParams>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_patient_id_alias() {
        assert_eq!(patient_query("patient_id=p1").id.as_deref(), Some("p1"));
        assert_eq!(patient_query("_id=p2").id.as_deref(), Some("p2"));

        let params = patient_query("name=%20%20");
        assert_eq!(non_empty(&params.name), None);
    }

    #[test]
    fn test_required() {
        assert!(matches!(required(&None, "patient"), Err(ApiError::BadRequest(_))));
        assert_eq!(required(&Some(" p1 ".to_string()), "patient").unwrap(), "p1");
    }
}
