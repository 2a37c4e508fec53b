//! SMART authorization-code flow against the vendor token endpoint

use axum::http::StatusCode;
use connectehr_core::{AuthorizeRequest, TokenResponse, Vendor};
use serde_json::Value;

use crate::{config::VendorSettings, error::ApiError};

/// Vendor authorize URL carrying `state` and `aud`
pub fn authorize_url(settings: &VendorSettings, state: &str, launch: Option<&str>) -> String {
    AuthorizeRequest {
        authorize_url: &settings.authorize_url,
        client_id: &settings.client_id,
        redirect_uri: &settings.redirect_uri,
        scope: &settings.scopes,
        state,
        aud: &settings.fhir_base_url,
        launch,
    }
    .to_url()
}

/// Exchange an authorization code for an access token.
///
/// Confidential clients send the secret both as HTTP Basic and in the form.
pub async fn exchange_code(
    http: &reqwest::Client,
    vendor: Vendor,
    settings: &VendorSettings,
    code: &str,
) -> Result<TokenResponse, ApiError> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", settings.redirect_uri.as_str()),
        ("client_id", settings.client_id.as_str()),
    ];

    let mut request = http
        .post(&settings.token_url)
        .header(axum::http::header::ACCEPT, "application/json");
    if let Some(secret) = settings.client_secret.as_deref() {
        form.push(("client_secret", secret));
        request = request.basic_auth(&settings.client_id, Some(secret));
    }

    let response = request.form(&form).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if status != reqwest::StatusCode::OK {
        tracing::warn!(vendor = %vendor, status = status.as_u16(), "Token exchange failed");
        return Err(ApiError::Upstream {
            status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            detail: format!("Token exchange failed: {}", body),
        });
    }

    parse_token_response(&body)
}

/// Parse a 200 token endpoint body, which must carry `access_token`
pub fn parse_token_response(body: &str) -> Result<TokenResponse, ApiError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ApiError::BadGateway(format!("Token endpoint returned invalid JSON: {}", e)))?;

    if value
        .get("access_token")
        .and_then(Value::as_str)
        .is_none_or(str::is_empty)
    {
        return Err(ApiError::BadGateway(
            "Token endpoint response has no access_token".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| ApiError::BadGateway(format!("Unexpected token response: {}", e)))
}
