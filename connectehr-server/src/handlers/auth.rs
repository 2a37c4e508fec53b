use axum::{
    extract::State,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    audit::{self, AuditContext},
    auth::issue_token,
    error::ApiError,
    extract::JsonBody,
    password::verify_login,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or e-mail address
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Exchange configured user credentials for a local JWT (POST /auth/login)
pub async fn login(
    State(state): State<Arc<AppState>>,
    context: AuditContext,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let account = state
        .config
        .auth
        .users
        .iter()
        .find(|u| u.matches_login(&request.username));

    // Argon2 is CPU bound; unknown users are verified against a dummy hash
    let stored_hash = account.map(|a| a.password_hash.clone());
    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || verify_login(&password, stored_hash.as_deref()))
        .await
        .map_err(|e| ApiError::Internal(format!("Password verification failed: {}", e)))?
        .unwrap_or_else(|e| {
            tracing::error!(
                user_id = account.map(|a| a.id.as_str()).unwrap_or("-"),
                "Stored password hash is malformed: {}",
                e
            );
            false
        });

    let Some(account) = account.filter(|_| verified) else {
        audit::log_auth_attempt(&context.client_ip, None, false);
        return Err(invalid());
    };

    let now = chrono::Utc::now().timestamp() as u64;
    let issued = issue_token(&state.config.auth, account, now)?;
    audit::log_auth_attempt(&context.client_ip, Some(account.username.as_str()), true);

    Ok(Json(LoginResponse {
        access_token: issued.access_token,
        token_type: "bearer".to_string(),
        expires_in: issued.expires_in,
    }))
}
