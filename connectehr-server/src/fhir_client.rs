//! Upstream FHIR R4 calls on behalf of the browser

use axum::http::{header, StatusCode};
use connectehr_core::{normalize_binary, BinaryContent, Vendor};
use serde_json::Value;

use crate::error::ApiError;

pub const FHIR_JSON: &str = "application/fhir+json";

/// Upstream error bodies are cut to this many bytes before being relayed
const MAX_DETAIL_LEN: usize = 4096;

/// Media types a caller may request for a Binary download
const BINARY_ACCEPT_ALLOWED: &[&str] = &[
    "application/pdf",
    "text/plain",
    "text/html",
    "application/fhir+json",
    "application/fhir+xml",
    "application/json",
    "application/xml",
    "application/octet-stream",
    "*/*",
];

/// FHIR logical id: letters, digits, `-`, `.` and `_`
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 256
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

/// `Accept` sent upstream for a Binary read. Anything outside the
/// allow-list becomes `*/*`.
pub fn binary_accept(requested: Option<&str>) -> &str {
    let Some(requested) = requested.map(str::trim) else {
        return "*/*";
    };
    let lower = requested.to_ascii_lowercase();
    let allowed = BINARY_ACCEPT_ALLOWED.contains(&lower.as_str())
        || (lower.starts_with("image/") && lower.len() > "image/".len());
    if allowed { requested } else { "*/*" }
}

fn truncate(body: &str) -> &str {
    if body.len() <= MAX_DETAIL_LEN {
        return body;
    }
    let mut end = MAX_DETAIL_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Client for one vendor's FHIR base, sharing the application's connection pool
pub struct FhirClient<'a> {
    vendor: Vendor,
    base_url: &'a str,
    http: &'a reqwest::Client,
}

impl<'a> FhirClient<'a> {
    pub fn new(vendor: Vendor, base_url: &'a str, http: &'a reqwest::Client) -> Self {
        Self {
            vendor,
            base_url: base_url.trim_end_matches('/'),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Type-level search (`GET [base]/[type]?params`)
    pub async fn search(
        &self,
        resource_type: &str,
        params: &[(&str, &str)],
        token: &str,
    ) -> Result<Value, ApiError> {
        tracing::debug!(
            vendor = %self.vendor,
            resource_type,
            params = params.len(),
            "FHIR search"
        );

        let response = self
            .http
            .get(self.url(resource_type))
            .query(params)
            .bearer_auth(token)
            .header(header::ACCEPT, FHIR_JSON)
            .send()
            .await?;

        self.json_body(resource_type, response).await
    }

    /// Instance read (`GET [base]/[type]/[id]`)
    pub async fn read(&self, resource_type: &str, id: &str, token: &str) -> Result<Value, ApiError> {
        if !is_valid_id(id) {
            return Err(ApiError::BadRequest(format!("Invalid resource id: {}", id)));
        }

        tracing::debug!(vendor = %self.vendor, resource_type, id, "FHIR read");

        let response = self
            .http
            .get(self.url(&format!("{}/{}", resource_type, id)))
            .bearer_auth(token)
            .header(header::ACCEPT, FHIR_JSON)
            .send()
            .await?;

        self.json_body(resource_type, response).await
    }

    /// Binary read normalized to raw bytes
    pub async fn binary(
        &self,
        id: &str,
        token: &str,
        accept: Option<&str>,
    ) -> Result<BinaryContent, ApiError> {
        if !is_valid_id(id) {
            return Err(ApiError::BadRequest(format!("Invalid resource id: {}", id)));
        }

        let response = self
            .http
            .get(self.url(&format!("Binary/{}", id)))
            .bearer_auth(token)
            .header(header::ACCEPT, binary_accept(accept))
            .send()
            .await?;

        let response = self.check_status("Binary", response).await?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        let content = normalize_binary(content_type.as_deref(), &body)?;
        tracing::debug!(
            vendor = %self.vendor,
            id,
            content_type = %content.content_type,
            size = content.bytes.len(),
            "FHIR Binary read"
        );
        Ok(content)
    }

    async fn check_status(
        &self,
        resource_type: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            vendor = %self.vendor,
            resource_type,
            status = status.as_u16(),
            "Upstream FHIR request failed"
        );

        Err(ApiError::Upstream {
            status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            detail: format!(
                "{} FHIR {} request failed: {}",
                self.vendor.display_name(),
                resource_type,
                truncate(&body)
            ),
        })
    }

    async fn json_body(
        &self,
        resource_type: &str,
        response: reqwest::Response,
    ) -> Result<Value, ApiError> {
        let response = self.check_status(resource_type, response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ApiError::BadGateway(format!(
                "{} returned invalid JSON for {}: {}",
                self.vendor.display_name(),
                resource_type,
                e
            ))
        })
    }
}
