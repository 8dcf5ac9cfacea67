//! # Error Handling
//!
//! Centralized error types for trellis core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Validation errors (`InvalidIdentifier`, `InvalidJoinSpec`,
//! `InvalidArgument`) are produced while a statement is being built, before
//! any SQL reaches the connection. Driver errors carry the driver's own
//! message and code. The routing variants are never raised by the
//! dispatcher; they are turned into responses through [`Error::status_code`].

use thiserror::Error;

/// Result type alias for trellis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the trellis runtime
#[derive(Error, Debug)]
pub enum Error {
    /// A table, column, alias or order token failed the identifier allow-list
    #[error("Invalid identifier: {identifier:?}")]
    InvalidIdentifier {
        /// The rejected token
        identifier: String,
    },

    /// A join is missing its target table or its ON predicate
    #[error("Invalid join: {reason}")]
    InvalidJoinSpec {
        /// What was missing
        reason: String,
    },

    /// A builder was called with arguments it cannot turn into SQL
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected
        reason: String,
    },

    /// The shared connection could not be established
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Driver message
        message: String,
        /// Driver error code, if any
        code: Option<String>,
    },

    /// The driver refused to prepare a statement
    #[error("Prepare failed: {message}")]
    PrepareFailed {
        /// Driver message
        message: String,
        /// Driver error code, if any
        code: Option<String>,
    },

    /// Binding or executing a statement failed
    #[error("Execute failed: {message}")]
    ExecuteFailed {
        /// Driver message
        message: String,
        /// Driver error code, if any
        code: Option<String>,
    },

    /// Router failed to match the requested path
    #[error("No route found for path: {path}")]
    RouteNotFound {
        /// The path that wasn't matched
        path: String,
    },

    /// The request method has no route table
    #[error("Method not allowed: {method}")]
    MethodNotAllowed {
        /// The rejected method token
        method: String,
    },

    /// The submitted CSRF token did not match the session token
    #[error("Invalid CSRF token")]
    CsrfInvalid,

    /// The view collaborator failed to render
    #[error("View error: {message}")]
    View {
        /// Renderer message
        message: String,
    },

    /// The request body could not be read
    #[error("Bad request: {reason}")]
    BadRequest {
        /// What went wrong
        reason: String,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status used when this error is turned into a response
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::CsrfInvalid => 403,
            Self::BadRequest { .. } | Self::Json(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            _ => 500,
        }
    }

    /// Driver error code, for the three driver-level variants
    #[must_use]
    pub fn driver_code(&self) -> Option<&str> {
        match self {
            Self::ConnectionFailed { code, .. }
            | Self::PrepareFailed { code, .. }
            | Self::ExecuteFailed { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn connection(err: &sqlx::Error) -> Self {
        let (message, code) = driver_parts(err);
        Self::ConnectionFailed { message, code }
    }

    pub(crate) fn prepare(err: &sqlx::Error) -> Self {
        let (message, code) = driver_parts(err);
        Self::PrepareFailed { message, code }
    }

    pub(crate) fn execute(err: &sqlx::Error) -> Self {
        let (message, code) = driver_parts(err);
        Self::ExecuteFailed { message, code }
    }

    pub(crate) fn invalid_identifier(identifier: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
        }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

/// Split a sqlx error into the driver's own message and code
fn driver_parts(err: &sqlx::Error) -> (String, Option<String>) {
    match err {
        sqlx::Error::Database(db) => (
            db.message().to_string(),
            db.code().map(std::borrow::Cow::into_owned),
        ),
        other => (other.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_not_found_error() {
        let err = Error::RouteNotFound {
            path: "/unknown".to_string(),
        };
        assert!(err.to_string().contains("/unknown"));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_routing_statuses() {
        let err = Error::MethodNotAllowed {
            method: "TRACE".to_string(),
        };
        assert_eq!(err.status_code(), 405);
        assert_eq!(Error::CsrfInvalid.status_code(), 403);
    }

    #[test]
    fn test_invalid_identifier_message() {
        let err = Error::invalid_identifier("users; DROP TABLE x");
        assert!(err.to_string().contains("DROP TABLE"));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_driver_code() {
        let err = Error::ExecuteFailed {
            message: "UNIQUE constraint failed".to_string(),
            code: Some("2067".to_string()),
        };
        assert_eq!(err.driver_code(), Some("2067"));
        assert_eq!(Error::CsrfInvalid.driver_code(), None);
    }

    #[test]
    fn test_non_database_sqlx_error_has_no_code() {
        let err = Error::execute(&sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::ExecuteFailed { code: None, .. }));
    }
}
