use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::services::webhook::WebhookError;

/// Error codes for categorizing errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ErrorCode {
    // Validation errors (3xxx)
    #[serde(rename = "VAL_3001")]
    InvalidInput,
    #[serde(rename = "VAL_3003")]
    InvalidFormat,
    #[serde(rename = "VAL_3009")]
    UnknownStep,

    // Resource errors (4xxx)
    #[serde(rename = "RES_4001")]
    NotFound,

    // External service errors (8xxx)
    #[serde(rename = "EXT_8001")]
    ExternalServiceUnavailable,
    #[serde(rename = "EXT_8002")]
    ExternalServiceTimeout,
    #[serde(rename = "EXT_8003")]
    ExternalServiceError,
    #[serde(rename = "EXT_8006")]
    ExternalServiceRejected,

    // Internal errors (9xxx)
    #[serde(rename = "INT_9998")]
    ConfigurationError,
    #[serde(rename = "INT_9999")]
    InternalServerError,
}

impl ErrorCode {
    /// Get numeric code
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::InvalidInput => 3001,
            ErrorCode::InvalidFormat => 3003,
            ErrorCode::UnknownStep => 3009,

            ErrorCode::NotFound => 4001,

            ErrorCode::ExternalServiceUnavailable => 8001,
            ErrorCode::ExternalServiceTimeout => 8002,
            ErrorCode::ExternalServiceError => 8003,
            ErrorCode::ExternalServiceRejected => 8006,

            ErrorCode::ConfigurationError => 9998,
            ErrorCode::InternalServerError => 9999,
        }
    }

    /// Get user-friendly message
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input provided",
            ErrorCode::InvalidFormat => "Invalid format provided",
            ErrorCode::UnknownStep => "Unknown strategy step",

            ErrorCode::NotFound => "The requested resource was not found",

            ErrorCode::ExternalServiceUnavailable => "Strategy workflow is currently unavailable",
            ErrorCode::ExternalServiceTimeout => "Strategy workflow request timed out",
            ErrorCode::ExternalServiceError => "Strategy workflow returned an error",
            ErrorCode::ExternalServiceRejected => "Strategy workflow rejected the request",

            ErrorCode::ConfigurationError => "Server configuration error",
            ErrorCode::InternalServerError => "An internal server error occurred",
        }
    }
}

/// Structured error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub request_id: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub code_number: u16,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{1}")]
    WithCode(ErrorCode, String),

    #[error("{1}")]
    WithCodeAndDetails(ErrorCode, String, String),
}

impl ApiError {
    /// Create error with specific error code
    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError::WithCode(code, message.into())
    }

    /// Create error with code and additional details
    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        ApiError::WithCodeAndDetails(code, message.into(), details.into())
    }

    /// Helper: Resource not found
    pub fn not_found(resource: &str) -> Self {
        ApiError::with_code(ErrorCode::NotFound, format!("{} not found", resource))
    }

    /// Get error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::WithCode(code, _) => *code,
            ApiError::WithCodeAndDetails(code, _, _) => *code,
        }
    }

    fn error_details(&self) -> Option<String> {
        match self {
            ApiError::WithCodeAndDetails(_, _, details) => Some(details.clone()),
            _ => None,
        }
    }

    /// Get status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::WithCode(code, _) | ApiError::WithCodeAndDetails(code, _, _) => {
                status_for_code(*code)
            }
        }
    }

    /// Log error with appropriate level
    fn log_error(&self, request_id: &str) {
        match self.status_code() {
            status if status.is_server_error() => {
                error!(
                    request_id = %request_id,
                    error = %self,
                    "Server error occurred"
                );
            }
            status if status.is_client_error() => {
                warn!(
                    request_id = %request_id,
                    error = %self,
                    "Client error occurred"
                );
            }
            _ => {}
        }
    }
}

fn status_for_code(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidInput | ErrorCode::InvalidFormat | ErrorCode::UnknownStep => {
            StatusCode::BAD_REQUEST
        }
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::ExternalServiceTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::ExternalServiceUnavailable
        | ErrorCode::ExternalServiceError
        | ErrorCode::ExternalServiceRejected => StatusCode::BAD_GATEWAY,
        ErrorCode::ConfigurationError | ErrorCode::InternalServerError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        let details = err.to_string();
        match err {
            WebhookError::NotConfigured { step } => ApiError::with_details(
                ErrorCode::ConfigurationError,
                format!("Step {} is not configured", step),
                details,
            ),
            WebhookError::Credential(_) => ApiError::with_details(
                ErrorCode::ConfigurationError,
                "Webhook credentials are invalid",
                details,
            ),
            WebhookError::Timeout { .. } => ApiError::with_details(
                ErrorCode::ExternalServiceTimeout,
                ErrorCode::ExternalServiceTimeout.message(),
                details,
            ),
            WebhookError::Http { status, .. } if (400..500).contains(&status) && status != 429 => {
                ApiError::with_details(
                    ErrorCode::ExternalServiceRejected,
                    ErrorCode::ExternalServiceRejected.message(),
                    details,
                )
            }
            WebhookError::Http { .. } | WebhookError::InvalidResponse { .. } => {
                ApiError::with_details(
                    ErrorCode::ExternalServiceError,
                    ErrorCode::ExternalServiceError.message(),
                    details,
                )
            }
            WebhookError::Transport { .. } => ApiError::with_details(
                ErrorCode::ExternalServiceUnavailable,
                ErrorCode::ExternalServiceUnavailable.message(),
                details,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let code = self.error_code();

        self.log_error(&request_id);

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code,
                code_number: code.code(),
                message: match &self {
                    ApiError::WithCode(_, msg) | ApiError::WithCodeAndDetails(_, msg, _) => {
                        msg.clone()
                    }
                },
                details: self.error_details(),
            },
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        match err {
            JsonRejection::JsonDataError(e) => ApiError::with_details(
                ErrorCode::InvalidInput,
                "Invalid input provided",
                e.body_text(),
            ),
            JsonRejection::JsonSyntaxError(_) => {
                ApiError::with_code(ErrorCode::InvalidFormat, "Invalid JSON format")
            }
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::with_code(ErrorCode::InvalidFormat, "JSON content type required")
            }
            other => ApiError::with_details(
                ErrorCode::InvalidInput,
                "Invalid request body format",
                other.body_text(),
            ),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        ApiError::with_details(ErrorCode::UnknownStep, "Unknown strategy step", err.body_text())
    }
}
