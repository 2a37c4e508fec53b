pub mod audit;
pub mod auth;
pub mod binary;
pub mod clinical;
pub mod metadata;
pub mod oauth;
pub mod system;

use axum::http::HeaderMap;
use connectehr_core::Vendor;

use crate::{config::VendorSettings, error::ApiError, fhir_client::FhirClient, AppState};

/// Settings of a vendor mounted on the router
pub fn vendor_settings(state: &AppState, vendor: Vendor) -> Result<&VendorSettings, ApiError> {
    state.config.vendors.get(vendor).ok_or_else(|| {
        ApiError::NotConfigured(format!("{} is not configured", vendor.display_name()))
    })
}

pub fn fhir_client(state: &AppState, vendor: Vendor) -> Result<FhirClient<'_>, ApiError> {
    let settings = vendor_settings(state, vendor)?;
    Ok(FhirClient::new(vendor, &settings.fhir_base_url, &state.http))
}

/// Vendor access token to forward upstream.
///
/// With auth enabled `Authorization` carries the local JWT and the vendor
/// token travels in `Epic-Authorization` / `Cerner-Authorization`.
/// Without auth it is read from `Authorization`.
pub fn upstream_token(state: &AppState, vendor: Vendor, headers: &HeaderMap) -> Result<String, ApiError> {
    let header_name = if state.config.auth.enabled {
        vendor.token_header()
    } else {
        "Authorization"
    };

    let Some(value) = headers.get(header_name) else {
        return Err(ApiError::Unauthorized(format!(
            "{} header is required",
            header_name
        )));
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::Unauthorized(format!(
                "Invalid {} header format. Expected 'Bearer <token>'",
                header_name
            ))
        })
}
