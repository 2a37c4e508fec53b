//! SMART on FHIR authorization-code flow types
//!
//! Building the authorize redirect and parsing the token endpoint reply.
//! The HTTP exchange itself lives in the server crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Parameters of a SMART `authorize` redirect
#[derive(Debug, Clone)]
pub struct AuthorizeRequest<'a> {
    pub authorize_url: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
    pub state: &'a str,
    /// FHIR base URL of the resource server (SMART `aud`)
    pub aud: &'a str,
    /// EHR launch context, when launched from inside the EHR
    pub launch: Option<&'a str>,
}

impl AuthorizeRequest<'_> {
    /// Render the full authorize URL with percent-encoded query parameters
    pub fn to_url(&self) -> String {
        let mut pairs = vec![
            ("response_type", "code"),
            ("client_id", self.client_id),
            ("redirect_uri", self.redirect_uri),
            ("scope", self.scope),
            ("state", self.state),
            ("aud", self.aud),
        ];
        if let Some(launch) = self.launch {
            pairs.push(("launch", launch));
        }

        append_query(self.authorize_url, &pairs)
    }
}

/// Append percent-encoded query parameters to a URL that may already
/// carry a query string.
pub fn append_query(base: &str, pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return base.to_string();
    }

    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}

/// Token endpoint response (RFC 6749 §5.1 plus SMART launch context)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// SMART launch context: patient in scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
    /// Vendor-specific extras (encounter, need_patient_banner, ...)
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AuthorizeRequest<'static> {
        AuthorizeRequest {
            authorize_url: "https://ehr.example.com/oauth2/authorize",
            client_id: "client-1",
            redirect_uri: "http://localhost:8000/epic/callback",
            scope: "openid fhirUser user/*.read",
            state: "abc123",
            aud: "https://ehr.example.com/api/FHIR/R4",
            launch: None,
        }
    }

    #[test]
    fn test_authorize_url_contains_smart_parameters() {
        let url = request().to_url();
        assert!(url.starts_with("https://ehr.example.com/oauth2/authorize?response_type=code&"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fepic%2Fcallback"));
        assert!(url.contains("scope=openid%20fhirUser%20user%2F%2A.read"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains("aud=https%3A%2F%2Fehr.example.com%2Fapi%2FFHIR%2FR4"));
        assert!(!url.contains("launch="));
    }

    #[test]
    fn test_authorize_url_appends_to_existing_query() {
        let mut req = request();
        req.authorize_url = "https://ehr.example.com/authorize?tenant=t1";
        req.launch = Some("xyz");
        let url = req.to_url();
        assert!(url.starts_with("https://ehr.example.com/authorize?tenant=t1&response_type=code"));
        assert!(url.ends_with("&launch=xyz"));
    }

    #[test]
    fn test_append_query() {
        assert_eq!(append_query("http://app/search", &[]), "http://app/search");
        assert_eq!(
            append_query("http://app/search?ehr=epic", &[("token", "a b&c")]),
            "http://app/search?ehr=epic&token=a%20b%26c"
        );
    }

    #[test]
    fn test_token_response_keeps_extras() {
        let json = serde_json::json!({
            "access_token": "tok",
            "expires_in": 3600,
            "patient": "p1",
            "encounter": "e1"
        });
        let token: TokenResponse = serde_json::from_value(json).unwrap();
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.patient.as_deref(), Some("p1"));
        assert_eq!(token.extra["encounter"], "e1");
    }

    #[test]
    fn test_token_response_requires_access_token() {
        let json = serde_json::json!({ "token_type": "Bearer" });
        assert!(serde_json::from_value::<TokenResponse>(json).is_err());
    }
}
