use serde::Serialize;
use thiserror::Error;

use crate::http::{Method, Response};

/// Standard error type for the Etude framework.
///
/// Router, guard and handler failures all travel as `EtudeError` up to the
/// [`Dispatcher`](crate::dispatch::Dispatcher), which is the only place that
/// turns them into responses. Startup-only variants (`DuplicateRoute`,
/// `InvalidPattern`, `UnknownHandler`, `Config`) never reach a client.
#[derive(Debug, Error)]
pub enum EtudeError {
    #[error("No route for {method} {path}")]
    RouteNotFound { method: Method, path: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("XSRF token missing or invalid")]
    XsrfInvalid,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The serialized `Set-Cookie` value would reach the 4096 byte ceiling.
    #[error("Cookie `{name}` is too large ({size} bytes, limit {limit})")]
    CookieTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("Invalid cookie `{name}`: {reason}")]
    InvalidCookie { name: String, reason: &'static str },

    #[error("Handler fault: {0}")]
    HandlerFault(String),

    #[error("Duplicate route: {method} {pattern}")]
    DuplicateRoute { method: Method, pattern: String },

    #[error("Invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },

    #[error("No handler registered under `{0}`")]
    UnknownHandler(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtudeError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EtudeError::RouteNotFound { .. } => 404,
            EtudeError::Unauthorized(_) => 401,
            EtudeError::XsrfInvalid => 403,
            EtudeError::Forbidden(_) => 403,
            EtudeError::BadRequest(_) => 400,
            EtudeError::UserExists(_) => 409,
            EtudeError::UserNotFound(_) => 404,
            EtudeError::CookieTooLarge { .. }
            | EtudeError::InvalidCookie { .. }
            | EtudeError::HandlerFault(_)
            | EtudeError::DuplicateRoute { .. }
            | EtudeError::InvalidPattern { .. }
            | EtudeError::UnknownHandler(_)
            | EtudeError::Config(_)
            | EtudeError::Internal(_)
            | EtudeError::Io(_) => 500,
        }
    }

    /// Get the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            EtudeError::RouteNotFound { .. } => "NOT_FOUND",
            EtudeError::Unauthorized(_) => "UNAUTHORIZED",
            EtudeError::XsrfInvalid => "XSRF_INVALID",
            EtudeError::Forbidden(_) => "FORBIDDEN",
            EtudeError::BadRequest(_) => "BAD_REQUEST",
            EtudeError::UserExists(_) => "CONFLICT",
            EtudeError::UserNotFound(_) => "NOT_FOUND",
            EtudeError::CookieTooLarge { .. } => "COOKIE_TOO_LARGE",
            EtudeError::InvalidCookie { .. } => "INVALID_COOKIE",
            EtudeError::HandlerFault(_) => "HANDLER_FAULT",
            EtudeError::DuplicateRoute { .. } => "DUPLICATE_ROUTE",
            EtudeError::InvalidPattern { .. } => "INVALID_PATTERN",
            EtudeError::UnknownHandler(_) => "UNKNOWN_HANDLER",
            EtudeError::Config(_) => "CONFIG_ERROR",
            EtudeError::Internal(_) | EtudeError::Io(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors that describe a bug or misconfiguration on the server
    /// side. Their details are logged but never sent to the client.
    pub fn is_server_fault(&self) -> bool {
        self.status_code() >= 500
    }

    /// Render this error as the response the client sees.
    pub fn to_response(&self) -> Response {
        let message = if self.is_server_fault() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.error_code(),
                message,
            },
        };

        match serde_json::to_vec(&body) {
            Ok(bytes) => Response::json(bytes).with_status(self.status_code()),
            Err(_) => Response::text("Internal Server Error").with_status(500),
        }
    }
}

/// Error envelope written to the response body.
///
/// ```json
/// { "success": false, "error": { "code": "XSRF_INVALID", "message": "..." } }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

/// Error detail for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}
