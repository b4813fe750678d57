use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::ErrorResponse;
use crate::store::StoreError;

/// Error taxonomy for the reconciliation engine.
///
/// A transient `Store` failure is the only variant that asks an external
/// provider to redeliver; everything else is a definitive rejection.
/// Duplicate deliveries are not errors at all, the ingest pipeline
/// acknowledges them with a normal response.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BillingError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            BillingError::SignatureInvalid(_) => (StatusCode::UNAUTHORIZED, "signature_error"),
            BillingError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
            BillingError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            BillingError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            BillingError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            BillingError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            BillingError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        }
    }

    /// True when the caller (a webhook provider) should retry delivery.
    pub fn is_transient(&self) -> bool {
        matches!(self, BillingError::Store(_))
    }
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(ErrorResponse::new(code, self.to_string()))).into_response()
    }
}
