//! Application error type and its HTTP mapping.
//!
//! Every variant maps to a stable `reason` code that clients can switch on.
//! Messages for server-side failures are generic; the detail only goes to the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::licensing::Rejection;
use crate::models::LicenseStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("License rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("License database could not be decoded: {0}")]
    Decode(#[from] CryptoError),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Webhook signature invalid")]
    SignatureInvalid,

    #[error("Webhook merchant mismatch")]
    MerchantMismatch,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment gateway timed out")]
    GatewayTimeout,

    #[error("Notification failed: {0}")]
    NotifyFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl AppError {
    /// Machine-readable reason code returned to callers.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Rejected(rejection) => rejection.reason(),
            AppError::Decode(_) | AppError::Unavailable(_) => "DATABASE_UNAVAILABLE",
            AppError::SignatureInvalid => "SIGNATURE_INVALID",
            AppError::MerchantMismatch => "MERCHANT_MISMATCH",
            AppError::Gateway(_) => "GATEWAY_ERROR",
            AppError::GatewayTimeout => "GATEWAY_TIMEOUT",
            AppError::NotifyFailed(_) => "NOTIFY_FAILED",
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_)
            | AppError::SignatureInvalid
            | AppError::MerchantMismatch => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Rejected(Rejection::InvalidLicense) => StatusCode::NOT_FOUND,
            AppError::Rejected(_) => StatusCode::FORBIDDEN,
            AppError::Decode(_) | AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Gateway(_) | AppError::NotifyFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    fn public_message(&self) -> String {
        match self {
            AppError::InvalidRequest(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::Unauthorized => "Unauthorized".into(),
            AppError::Rejected(rejection) => rejection.to_string(),
            AppError::Decode(_) | AppError::Unavailable(_) => {
                "License database is temporarily unavailable".into()
            }
            AppError::SignatureInvalid => "Invalid signature".into(),
            AppError::MerchantMismatch => "Invalid merchant".into(),
            AppError::Gateway(_) => "Payment gateway error, please retry".into(),
            AppError::GatewayTimeout => "Payment gateway timed out, please retry".into(),
            AppError::NotifyFailed(_) => "Notification could not be delivered".into(),
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    reason: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<LicenseStatus>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Decode(err) => {
                tracing::error!(alert = true, error = %err, "License database failed to decode");
            }
            AppError::Unavailable(err) => {
                tracing::error!(error = %err, "Database connection unavailable");
            }
            AppError::Database(err) => tracing::error!(error = %err, "Database error"),
            AppError::Internal(err) => tracing::error!(error = %err, "Internal error"),
            AppError::Gateway(err) => tracing::warn!(error = %err, "Payment gateway error"),
            AppError::NotifyFailed(err) => tracing::warn!(error = %err, "Notifier error"),
            _ => {}
        }

        let status = match &self {
            AppError::Rejected(Rejection::Inactive(s)) => Some(*s),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            reason: self.reason(),
            message: self.public_message(),
            status,
        };

        (self.status(), axum::Json(body)).into_response()
    }
}
