//! Error replies of the transaction-request endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use solpay::{CheckoutError, ValidationError};

use crate::types::ErrorBody;

/// Body of every 500 reply. Details stay in the server log.
pub const INTERNAL_ERROR_MESSAGE: &str = "error creating transaction";

/// Errors that can occur while serving a transaction request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body is not the expected JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// Pricing, building or encoding failed.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Checkout(err.into())
    }
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Checkout(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            Self::Checkout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            #[cfg(feature = "telemetry")]
            tracing::error!(error = %self, "Transaction request failed");
            INTERNAL_ERROR_MESSAGE.to_owned()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}
