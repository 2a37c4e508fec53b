use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use connectehr_core::{BinaryError, OperationOutcome};
use connectehr_store::StoreError;
use thiserror::Error;

/// Every failure a handler can surface, rendered as an OperationOutcome
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid state parameter")]
    InvalidState,

    #[error("{0}")]
    NotFound(String),

    /// Non-success answer from the vendor, relayed with its status
    #[error("{detail}")]
    Upstream { status: StatusCode, detail: String },

    #[error("Invalid response from upstream: {0}")]
    BadGateway(String),

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Binary(#[from] BinaryError),

    #[error("{0}")]
    NotConfigured(String),

    #[error("Audit store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) | ApiError::InvalidState => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { status, .. } => *status,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Transport(_) => StatusCode::BAD_GATEWAY,
            ApiError::Binary(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn outcome(&self) -> OperationOutcome {
        let message = self.to_string();
        match self {
            ApiError::Unauthorized(_) => OperationOutcome::unauthorized(message),
            ApiError::Forbidden(_) => OperationOutcome::forbidden(message),
            ApiError::BadRequest(_) | ApiError::InvalidState => OperationOutcome::invalid(message),
            ApiError::NotFound(_) => OperationOutcome::not_found(message),
            ApiError::Upstream { .. } | ApiError::BadGateway(_) | ApiError::Transport(_) => {
                OperationOutcome::upstream(message)
            }
            ApiError::Binary(BinaryError::MissingContent) => OperationOutcome::not_found(message),
            _ => OperationOutcome::exception(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }
        (status, Json(self.outcome())).into_response()
    }
}
