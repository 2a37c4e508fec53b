use axum::{
    extract::State,
    response::{IntoResponse, Json, Redirect, Response},
    Extension,
};
use connectehr_core::{append_query, Vendor};
use serde::Deserialize;
use std::sync::Arc;

use super::vendor_settings;
use crate::{audit::AuditContext, error::ApiError, extract::Query, oauth, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    /// EHR launch context for launches started inside the EHR
    pub launch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Start the authorization-code flow (GET /{vendor}/login)
pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    Query(params): Query<LoginParams>,
) -> Result<Redirect, ApiError> {
    let settings = vendor_settings(&state, vendor)?;
    let oauth_state = state
        .oauth_states
        .issue(vendor, Some(context.client_ip.as_str()))?;

    tracing::info!(
        vendor = %vendor,
        client_ip = %context.client_ip,
        launch = params.launch.is_some(),
        "Redirecting to {} authorization",
        vendor.display_name()
    );

    let url = oauth::authorize_url(settings, &oauth_state, params.launch.as_deref());
    Ok(Redirect::temporary(&url))
}

/// Authorization callback (GET /{vendor}/callback)
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Extension(vendor): Extension<Vendor>,
    context: AuditContext,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let settings = vendor_settings(&state, vendor)?;

    if let Some(error) = params.error.as_deref() {
        tracing::warn!(vendor = %vendor, error, "Authorization denied by vendor");
        return Err(ApiError::BadRequest(format!(
            "Authorization failed: {}",
            params.error_description.as_deref().unwrap_or(error)
        )));
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return Err(ApiError::BadRequest("Missing code".to_string()));
    };

    let Some(oauth_state) = params.state.as_deref().filter(|s| !s.is_empty()) else {
        return Err(ApiError::InvalidState);
    };
    if let Err(e) = state.oauth_states.consume(vendor, oauth_state) {
        tracing::warn!(
            vendor = %vendor,
            client_ip = %context.client_ip,
            "Audit: rejected OAuth callback with unknown state"
        );
        return Err(e);
    }

    let token = oauth::exchange_code(&state.http, vendor, settings, code).await?;
    tracing::info!(
        vendor = %vendor,
        client_ip = %context.client_ip,
        expires_in = ?token.expires_in,
        "Token exchange succeeded"
    );

    match settings.frontend_redirect.as_deref() {
        Some(frontend) => {
            let url = append_query(
                frontend,
                &[("token", token.access_token.as_str()), ("state", oauth_state)],
            );
            Ok(Redirect::temporary(&url).into_response())
        }
        None => Ok(Json(token).into_response()),
    }
}
