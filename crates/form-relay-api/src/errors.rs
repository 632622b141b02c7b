//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use form_relay_core::{DispatchError, StoreError, SubmissionError, ValidationError};
use tracing::{error, warn};

/// Handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: malformed bodies, missing fields, missing credentials
/// - `404 Not Found`: no configuration at the requested path
/// - `500 Internal Server Error`: the CRM refused or never answered a record
///   creation, or an unexpected failure occurred
/// - `502 Bad Gateway`: a pass-through read against the CRM failed
///
/// Every error renders as `{"success": false, "error": "..."}`. Internal
/// failures are logged in full and reported with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    NotFound { message: String },

    /// Record creation failed; the message carries the CRM's explanation
    #[error("Failed to create custom object: {0}")]
    Submission(SubmissionError),

    /// Pass-through read failed
    #[error("CRM request failed: {0}")]
    Upstream(SubmissionError),

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Submission(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Submission(e) => Self::Submission(e),
            DispatchError::Internal(e) => Self::from(e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self::Internal {
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            Self::Internal { message } => {
                // Details stay in the server log
                error!(error = %message, "Internal server error occurred");
                "Internal server error occurred. Please try again later.".to_string()
            }
            Self::Submission(e) | Self::Upstream(e) => {
                error!(error = %e, status = ?e.status(), "CRM call failed");
                self.to_string()
            }
            _ => {
                warn!(status = %status, error = %self, "Request rejected");
                self.to_string()
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Initialization failed: {message}")]
    Initialization { message: String },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
