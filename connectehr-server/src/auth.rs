use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    audit,
    config::{AuthSettings, UserAccount},
    error::ApiError,
    AppState,
};

pub const ROLE_PROVIDER: &str = "provider";
pub const ROLE_ADMIN: &str = "admin";

/// Roles allowed to read clinical data through the proxy
pub const CLINICAL_ROLES: &[&str] = &[ROLE_PROVIDER, ROLE_ADMIN];
/// Roles allowed to read the audit trail
pub const ADMIN_ROLES: &[&str] = &[ROLE_ADMIN];

/// Authenticated caller, inserted into request extensions by the role gate
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub subject: String,
    pub user_id: Option<String>,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_any_role(&self, allowed: &[&str]) -> bool {
        self.roles.iter().any(|r| allowed.contains(&r.as_str()))
    }
}

/// Claims of the locally issued application JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
}

/// Token handed out by the login endpoint
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// Sign a token for a configured account
pub fn issue_token(
    settings: &AuthSettings,
    account: &UserAccount,
    now: u64,
) -> Result<IssuedToken, ApiError> {
    let expires_in = (settings.token_ttl_minutes.max(1) as u64) * 60;
    let claims = JwtClaims {
        sub: account
            .email
            .clone()
            .unwrap_or_else(|| account.username.clone()),
        roles: account.roles.clone(),
        user_id: Some(account.id.clone()),
        exp: now + expires_in,
        iat: now,
    };

    let access_token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))?;

    Ok(IssuedToken {
        access_token,
        expires_in,
    })
}

/// Verify signature and expiry of a local JWT
pub fn decode_token(secret: &str, token: &str) -> Result<JwtClaims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = jsonwebtoken::decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => ApiError::Unauthorized("Token expired".to_string()),
        _ => ApiError::Unauthorized(format!("Invalid authentication token: {}", e)),
    })?;

    if data.claims.sub.trim().is_empty() {
        return Err(ApiError::Unauthorized("Missing subject in token".to_string()));
    }

    Ok(data.claims)
}

/// Extract and validate the `Authorization: Bearer <jwt>` header
pub fn authenticate(settings: &AuthSettings, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(ApiError::Unauthorized(
            "Authorization header is required".to_string(),
        ));
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::Unauthorized(
                "Invalid authorization header format. Expected 'Bearer <token>'".to_string(),
            )
        })?;

    let claims = decode_token(&settings.jwt_secret, token)?;
    Ok(AuthUser {
        subject: claims.sub,
        user_id: claims.user_id,
        roles: claims.roles,
    })
}

/// The caller needs at least one role of the allow-list
pub fn check_roles(user: &AuthUser, allowed: &[&str]) -> Result<(), ApiError> {
    if user.has_any_role(allowed) {
        return Ok(());
    }

    let held = if user.roles.is_empty() {
        "none".to_string()
    } else {
        user.roles.join(", ")
    };
    Err(ApiError::Forbidden(format!(
        "Access denied. Required roles: {}. Your roles: {}",
        allowed.join(", "),
        held
    )))
}

/// Role gate for clinical data routes (provider or admin)
pub async fn require_clinician(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, request, next, CLINICAL_ROLES).await
}

/// Role gate for administrative routes
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, request, next, ADMIN_ROLES).await
}

async fn gate(
    state: &AppState,
    mut request: Request,
    next: Next,
    allowed: &[&str],
) -> Result<Response, ApiError> {
    if !state.config.auth.enabled {
        return Ok(next.run(request).await);
    }

    let client_ip = audit::client_ip(request.extensions());

    let user = match authenticate(&state.config.auth, request.headers()) {
        Ok(user) => user,
        Err(e) => {
            audit::log_auth_attempt(&client_ip, None, false);
            return Err(e);
        }
    };

    if let Err(e) = check_roles(&user, allowed) {
        tracing::warn!(
            user_id = %user.subject,
            client_ip = %client_ip,
            roles = ?user.roles,
            path = %request.uri().path(),
            "Audit: insufficient role"
        );
        return Err(e);
    }

    audit::log_auth_attempt(&client_ip, Some(user.subject.as_str()), true);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
