//! Normalization of FHIR Binary reads to raw bytes
//!
//! A vendor may answer `GET Binary/{id}` either with a JSON Binary resource
//! carrying base64 content, or with the document bytes themselves. Both are
//! reduced to a [`BinaryContent`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Raw document bytes and their media type
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryContent {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum BinaryError {
    #[error("Binary resource is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Expected a Binary resource, got {0}")]
    WrongResourceType(String),

    #[error("Binary resource has no content")]
    MissingContent,

    #[error("Failed to decode Binary content: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl BinaryError {
    /// HTTP status this failure maps to
    pub fn status_code(&self) -> u16 {
        match self {
            BinaryError::MissingContent => 404,
            _ => 500,
        }
    }
}

/// True for `application/fhir+json` and `application/json`, ignoring
/// parameters such as `charset`.
pub fn is_json_media_type(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    media_type == "application/fhir+json" || media_type == "application/json"
}

/// Normalize an upstream Binary response body
pub fn normalize_binary(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<BinaryContent, BinaryError> {
    match content_type {
        Some(ct) if is_json_media_type(ct) => decode_binary_resource(body),
        Some(ct) if !ct.trim().is_empty() => Ok(BinaryContent {
            content_type: ct.trim().to_string(),
            bytes: body.to_vec(),
        }),
        _ => Ok(BinaryContent {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            bytes: body.to_vec(),
        }),
    }
}

fn decode_binary_resource(body: &[u8]) -> Result<BinaryContent, BinaryError> {
    let resource: Value = serde_json::from_slice(body)?;

    if let Some(rt) = resource.get("resourceType").and_then(Value::as_str)
        && rt != "Binary"
    {
        return Err(BinaryError::WrongResourceType(rt.to_string()));
    }

    // R4 uses `data`, DSTU2 used `content`
    let encoded = resource
        .get("data")
        .or_else(|| resource.get("content"))
        .and_then(Value::as_str)
        .ok_or(BinaryError::MissingContent)?;

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;

    let content_type = resource
        .get("contentType")
        .and_then(Value::as_str)
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    tracing::debug!(
        content_type = %content_type,
        size = bytes.len(),
        "Decoded inline Binary resource"
    );

    Ok(BinaryContent { content_type, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fhir_json_binary_is_decoded() {
        let body = json!({
            "resourceType": "Binary",
            "contentType": "application/pdf",
            "data": STANDARD.encode(b"%PDF-1.4 report")
        });
        let out = normalize_binary(
            Some("application/fhir+json; charset=utf-8"),
            body.to_string().as_bytes(),
        )
        .unwrap();
        assert_eq!(out.content_type, "application/pdf");
        assert_eq!(out.bytes, b"%PDF-1.4 report");
    }

    #[test]
    fn test_dstu2_content_field_with_line_breaks() {
        let encoded = STANDARD.encode(b"plain text note");
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        let body = json!({"resourceType": "Binary", "contentType": "text/plain", "content": wrapped});
        let out = normalize_binary(Some("application/json"), body.to_string().as_bytes()).unwrap();
        assert_eq!(out.content_type, "text/plain");
        assert_eq!(out.bytes, b"plain text note");
    }

    #[test]
    fn test_raw_binary_passes_through_unchanged() {
        let raw = [0x25, 0x50, 0x44, 0x46, 0x00, 0xff, 0x10];
        let out = normalize_binary(Some("application/pdf"), &raw).unwrap();
        assert_eq!(out.content_type, "application/pdf");
        assert_eq!(out.bytes, raw);
    }

    #[test]
    fn test_missing_content_type_defaults_to_octet_stream() {
        let out = normalize_binary(None, b"abc").unwrap();
        assert_eq!(out.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(out.bytes, b"abc");
    }

    #[test]
    fn test_missing_data_is_not_found() {
        let body = json!({"resourceType": "Binary", "contentType": "application/pdf"});
        let err = normalize_binary(Some("application/fhir+json"), body.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, BinaryError::MissingContent));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_bad_base64_is_server_error() {
        let body = json!({"resourceType": "Binary", "data": "not base64!!"});
        let err = normalize_binary(Some("application/fhir+json"), body.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, BinaryError::Decode(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_invalid_json_is_server_error() {
        let err = normalize_binary(Some("application/fhir+json"), b"{not json").unwrap_err();
        assert!(matches!(err, BinaryError::InvalidJson(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_operation_outcome_is_rejected() {
        let body = json!({"resourceType": "OperationOutcome", "issue": []});
        let err = normalize_binary(Some("application/fhir+json"), body.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, BinaryError::WrongResourceType(_)));
    }
}
