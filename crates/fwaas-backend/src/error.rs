//! Backend error types and status handling.
//!
//! The controller answers every request with an HTTP-style status. This
//! module turns those status codes into Rust's `Result` type.

use std::fmt;
use thiserror::Error;

/// Status codes returned by the controller's management API.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendStatus {
    Ok = 200,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    Conflict = 409,
    PreconditionFailed = 412,
    TooManyRequests = 429,
    InternalServerError = 500,
    ServiceUnavailable = 503,
    GatewayTimeout = 504,
}

impl BackendStatus {
    /// Creates a BackendStatus from a raw status code.
    ///
    /// Any 2xx code is success; unknown codes map to `InternalServerError`.
    pub fn from_code(code: u16) -> Self {
        match code {
            200..=299 => BackendStatus::Ok,
            400 => BackendStatus::BadRequest,
            403 => BackendStatus::Forbidden,
            404 => BackendStatus::NotFound,
            409 => BackendStatus::Conflict,
            412 => BackendStatus::PreconditionFailed,
            429 => BackendStatus::TooManyRequests,
            503 => BackendStatus::ServiceUnavailable,
            504 => BackendStatus::GatewayTimeout,
            _ => BackendStatus::InternalServerError,
        }
    }

    /// Returns the numeric status code.
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Returns true if the status indicates success.
    pub fn is_success(&self) -> bool {
        *self == BackendStatus::Ok
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> BackendResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(BackendError::from_status(self))
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendStatus::Ok => "OK",
            BackendStatus::BadRequest => "BAD_REQUEST",
            BackendStatus::Forbidden => "FORBIDDEN",
            BackendStatus::NotFound => "NOT_FOUND",
            BackendStatus::Conflict => "CONFLICT",
            BackendStatus::PreconditionFailed => "PRECONDITION_FAILED",
            BackendStatus::TooManyRequests => "TOO_MANY_REQUESTS",
            BackendStatus::InternalServerError => "INTERNAL_SERVER_ERROR",
            BackendStatus::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            BackendStatus::GatewayTimeout => "GATEWAY_TIMEOUT",
        };
        write!(f, "{} {}", self.code(), s)
    }
}

/// Error type for backend operations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The controller returned an error status.
    #[error("Backend request failed: {status}")]
    Status { status: BackendStatus },

    /// The requested object does not exist on the controller.
    #[error("Backend object not found: {object}")]
    NotFound { object: String },

    /// The object changed under us (revision mismatch).
    #[error("Stale revision for {object}")]
    StaleRevision { object: String },

    /// The controller rejected the request payload.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The controller could not be reached or is overloaded.
    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BackendError {
    /// Creates an error from a status code.
    pub fn from_status(status: BackendStatus) -> Self {
        match status {
            BackendStatus::Ok => Self::internal("from_status called with success status"),
            BackendStatus::NotFound => BackendError::NotFound {
                object: "unknown".to_string(),
            },
            BackendStatus::Conflict | BackendStatus::PreconditionFailed => {
                BackendError::StaleRevision {
                    object: "unknown".to_string(),
                }
            }
            BackendStatus::BadRequest => BackendError::InvalidRequest {
                message: format!("controller returned {}", status),
            },
            BackendStatus::ServiceUnavailable => BackendError::Unavailable {
                message: format!("controller returned {}", status),
            },
            _ => BackendError::Status { status },
        }
    }

    /// Creates a not found error.
    pub fn not_found(object: impl Into<String>) -> Self {
        BackendError::NotFound {
            object: object.into(),
        }
    }

    /// Creates a stale revision error.
    pub fn stale_revision(object: impl Into<String>) -> Self {
        BackendError::StaleRevision {
            object: object.into(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        BackendError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        BackendError::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        BackendError::Internal {
            message: message.into(),
        }
    }

    /// Returns the underlying status if this is a Status error.
    pub fn status(&self) -> Option<BackendStatus> {
        match self {
            BackendError::Status { status } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::StaleRevision { .. }
                | BackendError::Unavailable { .. }
                | BackendError::Status {
                    status: BackendStatus::TooManyRequests | BackendStatus::GatewayTimeout
                }
        )
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
