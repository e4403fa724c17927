//! Error types for the diagnostics endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::tools::{CommandValidationError, ExecutionFailure};

pub const MSG_MISSING_PARAMETER: &str = "Command parameter required";
pub const MSG_REJECTED: &str = "Invalid or unauthorized command";
pub const MSG_UNAUTHORIZED: &str = "Unauthorized";
pub const MSG_INTERNAL: &str = "Diagnostic command failed";

/// Errors that can end a diagnostics request.
///
/// Every variant maps to a fixed status and a caller-safe message. Details
/// carried by a variant are for server-side logs only.
#[derive(Debug, Error)]
pub enum DiagnosticError {
    /// The body has no usable `command` field.
    #[error("command parameter missing")]
    MissingParameter,

    /// The caller is not an authenticated administrator.
    #[error("caller is not an authorized admin")]
    Unauthorized,

    /// The command is not a whitelist member.
    #[error("rejected command: {0}")]
    RejectedCommand(#[from] CommandValidationError),

    /// `command` was present but not a string.
    #[error("command parameter is not a string")]
    NonStringCommand,

    /// A whitelisted command ran and failed. `message` is already sanitized.
    #[error("execution failed: {message}")]
    ExecutionFailure { message: String },

    /// Anything unanticipated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DiagnosticError {
    /// Map an executor failure to the error reported to the caller
    ///
    /// In-process failures are internal errors. Subprocess failures carry
    /// the sanitized message chosen by `expose_stderr`.
    pub fn from_execution(failure: ExecutionFailure, expose_stderr: bool) -> Self {
        match failure {
            ExecutionFailure::PureValue(err) => Self::Internal(format!("{err:#}")),
            failure => Self::ExecutionFailure {
                message: failure.public_message(expose_stderr),
            },
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// - Missing parameter, rejected command: 400 Bad Request
    /// - Unauthorized: 401 Unauthorized
    /// - Execution failure, internal: 500 Internal Server Error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter | Self::RejectedCommand(_) | Self::NonStringCommand => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ExecutionFailure { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the request outcome metric
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::MissingParameter => "missing_parameter",
            Self::Unauthorized => "unauthorized",
            Self::RejectedCommand(_) | Self::NonStringCommand => "rejected",
            Self::ExecutionFailure { .. } => "execution_failure",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message returned in the `error` field
    pub fn public_message(&self) -> &str {
        match self {
            Self::MissingParameter => MSG_MISSING_PARAMETER,
            Self::Unauthorized => MSG_UNAUTHORIZED,
            Self::RejectedCommand(_) | Self::NonStringCommand => MSG_REJECTED,
            Self::ExecutionFailure { message } => message.as_str(),
            Self::Internal(_) => MSG_INTERNAL,
        }
    }
}

impl IntoResponse for DiagnosticError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Body for a panic caught by the router's panic layer
pub fn internal_error_response() -> Response {
    DiagnosticError::Internal("handler panicked".to_string()).into_response()
}
