//! SMART Backend Services: system-level access tokens obtained with a
//! signed client assertion (`client_credentials` grant).

use axum::http::StatusCode;
use connectehr_core::Vendor;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::{
    config::{BackendServicesSettings, VendorSettings},
    error::ApiError,
    oauth::parse_token_response,
};

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a signed client assertion
const ASSERTION_TTL_SECS: u64 = 5 * 60;

/// Cached tokens are refreshed this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 300;

#[derive(Debug, Serialize, PartialEq)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub exp: u64,
}

pub fn assertion_claims(client_id: &str, token_url: &str, now: u64) -> AssertionClaims {
    AssertionClaims {
        iss: client_id.to_string(),
        sub: client_id.to_string(),
        aud: token_url.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        exp: now + ASSERTION_TTL_SECS,
    }
}

/// Sign the client assertion with the registered RSA private key (RS384)
pub fn sign_assertion(
    settings: &VendorSettings,
    backend: &BackendServicesSettings,
    now: u64,
) -> Result<String, ApiError> {
    let pem = std::fs::read(&backend.private_key_file).map_err(|e| {
        ApiError::Internal(format!(
            "Failed to read private key {}: {}",
            backend.private_key_file.display(),
            e
        ))
    })?;
    let key = EncodingKey::from_rsa_pem(&pem)
        .map_err(|e| ApiError::Internal(format!("Invalid RSA private key: {}", e)))?;

    let mut header = Header::new(Algorithm::RS384);
    header.kid = backend.key_id.clone();

    let claims = assertion_claims(&settings.client_id, &settings.token_url, now);
    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| ApiError::Internal(format!("Failed to sign client assertion: {}", e)))
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// System tokens per vendor
#[derive(Default)]
pub struct SystemTokenCache {
    tokens: HashMap<Vendor, CachedToken>,
}

impl SystemTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&self, vendor: Vendor) -> Option<String> {
        self.tokens
            .get(&vendor)
            .filter(|t| Instant::now() < t.refresh_at)
            .map(|t| t.access_token.clone())
    }

    fn store(&mut self, vendor: Vendor, access_token: String, expires_in: u64) {
        let lifetime = Duration::from_secs(expires_in).saturating_sub(REFRESH_MARGIN);
        self.tokens.insert(
            vendor,
            CachedToken {
                access_token,
                refresh_at: Instant::now() + lifetime,
            },
        );
    }
}

/// Return a cached system token or request a new one
pub async fn system_token(
    http: &reqwest::Client,
    cache: &RwLock<SystemTokenCache>,
    vendor: Vendor,
    settings: &VendorSettings,
) -> Result<String, ApiError> {
    let Some(backend) = settings.backend_services.as_ref() else {
        return Err(ApiError::NotConfigured(format!(
            "{} backend services are not configured",
            vendor.display_name()
        )));
    };

    if let Some(token) = cache.read().await.fresh(vendor) {
        return Ok(token);
    }

    let mut c = cache.write().await;
    if let Some(token) = c.fresh(vendor) {
        return Ok(token);
    }

    let now = chrono::Utc::now().timestamp() as u64;
    let assertion = sign_assertion(settings, backend, now)?;
    let form = [
        ("grant_type", "client_credentials"),
        ("client_assertion_type", CLIENT_ASSERTION_TYPE),
        ("client_assertion", assertion.as_str()),
        ("scope", backend.scopes.as_str()),
    ];

    let response = http.post(&settings.token_url).form(&form).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Upstream {
            status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            detail: format!("Backend services token request failed: {}", body),
        });
    }

    let token = parse_token_response(&body)?;
    let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
    tracing::info!(vendor = %vendor, expires_in, "Obtained backend services token");

    c.store(vendor, token.access_token.clone(), expires_in);
    Ok(token.access_token)
}
