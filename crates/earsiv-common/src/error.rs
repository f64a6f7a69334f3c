//! Unified error type for earsiv.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for HTTP handlers to derive a status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering the failure modes of the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "order", "invoice").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not authenticated.
    #[error("Unauthorized")]
    Unauthorized,

    /// Request data or stored configuration failed validation.
    #[error("{0}")]
    Validation(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A call to Etsy or Luca failed.
    #[error("{service} error: {message}")]
    Upstream {
        /// Name of the remote service.
        service: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized => 401,
            Error::Validation(_) => 400,
            Error::Database(_) => 500,
            Error::Io(_) => 500,
            Error::Upstream { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Error::Database(msg.into())
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Convenience constructor for [`Error::Upstream`].
    pub fn upstream(service: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Upstream {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Internal`].
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("order", "123");
        assert_eq!(err.to_string(), "order not found: 123");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn upstream_display() {
        let err = Error::upstream("Luca", "401 Unauthorized");
        assert_eq!(err.to_string(), "Luca error: 401 Unauthorized");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn validation_is_bad_request() {
        let err = Error::validation("No invoice ETTN found. Create invoice first.");
        assert_eq!(err.to_string(), "No invoice ETTN found. Create invoice first.");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(Error::Unauthorized.http_status(), 401);
        assert_eq!(Error::database("locked").http_status(), 500);
        assert_eq!(Error::internal("bug").http_status(), 500);
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.http_status(), 500);
    }
}
