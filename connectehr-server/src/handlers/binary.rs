use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Extension,
};
use connectehr_core::{binary::DEFAULT_CONTENT_TYPE, Vendor};
use std::sync::Arc;

use super::{fhir_client, upstream_token};
use crate::{
    audit::{self, Access, AuditContext},
    error::ApiError,
    AppState,
};

/// File extension offered in `Content-Disposition` for a media type
pub fn extension_for(content_type: &str) -> &'static str {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match media_type.as_str() {
        "application/pdf" => "pdf",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/tiff" => "tiff",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/rtf" | "application/rtf" => "rtf",
        "application/xml" | "text/xml" | "application/fhir+xml" => "xml",
        "application/json" | "application/fhir+json" => "json",
        "application/dicom" => "dcm",
        _ => "bin",
    }
}

/// Download a document as raw bytes (GET /{vendor}/binary/{id})
pub async fn download(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let token = upstream_token(&state, vendor, &headers)?;
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());

    let content = fhir_client(&state, vendor)?
        .binary(&id, &token, accept)
        .await?;

    audit::log_access(&state, &context, vendor, Access::download(&id));

    let content_type = HeaderValue::from_str(&content.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    // id is restricted to [A-Za-z0-9._-] by the client, so it is header-safe
    let disposition = format!(
        "inline; filename=\"{}.{}\"",
        id,
        extension_for(&content.content_type)
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(content.bytes))
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("application/pdf"), "pdf");
        assert_eq!(extension_for("image/JPEG"), "jpg");
        assert_eq!(extension_for("text/plain; charset=utf-8"), "txt");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }
}
