use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions},
};
use connectehr_core::Vendor;
use connectehr_store::NewAuditEntry;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::{auth::AuthUser, error::ApiError, AppState};

/// Subject recorded when the role gate is disabled
pub const ANONYMOUS: &str = "anonymous";

/// Audit context extracted from HTTP request
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub user_id: Option<String>,
    pub client_ip: String,
}

impl AuditContext {
    pub fn new(user_id: Option<String>, client_ip: String) -> Self {
        Self { user_id, client_ip }
    }

    pub fn subject(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuditContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .extensions
            .get::<AuthUser>()
            .map(|u| u.subject.clone());
        Ok(Self {
            user_id,
            client_ip: client_ip(&parts.extensions),
        })
    }
}

/// Peer address recorded by `into_make_service_with_connect_info`
pub fn client_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// One access to clinical data
#[derive(Debug, Clone, Copy)]
pub struct Access<'a> {
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<&'a str>,
    pub patient_id: Option<&'a str>,
}

impl<'a> Access<'a> {
    pub fn search(resource_type: &'a str, patient_id: Option<&'a str>) -> Self {
        Self {
            action: "search",
            resource_type,
            resource_id: None,
            patient_id,
        }
    }

    pub fn read(resource_type: &'a str, id: &'a str) -> Self {
        Self {
            action: "read",
            resource_type,
            resource_id: Some(id),
            patient_id: (resource_type == "Patient").then_some(id),
        }
    }

    pub fn download(id: &'a str) -> Self {
        Self {
            action: "download",
            resource_type: "Binary",
            resource_id: Some(id),
            patient_id: None,
        }
    }
}

fn new_entry(context: &AuditContext, vendor: Vendor, access: &Access<'_>) -> NewAuditEntry {
    NewAuditEntry {
        user_id: context.subject().to_string(),
        action: access.action.to_string(),
        resource_type: Some(access.resource_type.to_string()),
        resource_id: access.resource_id.map(str::to_string),
        patient_id: access.patient_id.map(str::to_string),
        ip_address: Some(context.client_ip.clone()),
        vendor: Some(vendor.as_str().to_string()),
    }
}

/// Log a successful access and persist it from a spawned task.
///
/// A failed write is logged and never fails the request.
pub fn log_access(
    state: &Arc<AppState>,
    context: &AuditContext,
    vendor: Vendor,
    access: Access<'_>,
) {
    tracing::info!(
        user_id = context.subject(),
        client_ip = %context.client_ip,
        vendor = %vendor,
        action = access.action,
        resource_type = access.resource_type,
        resource_id = access.resource_id.unwrap_or("N/A"),
        patient_id = access.patient_id.unwrap_or("N/A"),
        "Audit: {} {}",
        access.action,
        access.resource_type
    );

    if !state.config.audit.enabled {
        return;
    }

    let entry = new_entry(context, vendor, &access);
    let audit_log = Arc::clone(&state.audit);

    tokio::spawn(async move {
        let audit = audit_log.lock().await;
        if let Err(e) = audit.record(&entry) {
            tracing::error!("Failed to write audit log to database: {}", e);
        }
    });
}

/// Persist an access explicitly reported by the frontend, returning the row id
pub async fn record_view(
    state: &AppState,
    context: &AuditContext,
    vendor: Vendor,
    access: Access<'_>,
) -> Result<i64, ApiError> {
    let entry = new_entry(context, vendor, &access);
    let id = state.audit.lock().await.record(&entry)?;

    tracing::info!(
        user_id = context.subject(),
        client_ip = %context.client_ip,
        vendor = %vendor,
        action = access.action,
        audit_id = id,
        "Audit: frontend reported {}",
        access.action
    );

    Ok(id)
}

/// Log an authentication attempt
pub fn log_auth_attempt(client_ip: &str, user_id: Option<&str>, success: bool) {
    if success {
        tracing::info!(
            user_id = user_id.unwrap_or("unknown"),
            client_ip = %client_ip,
            status = "success",
            "Audit: Authentication successful"
        );
    } else {
        tracing::warn!(
            client_ip = %client_ip,
            status = "failed",
            "Audit: Authentication failed"
        );
    }
}
