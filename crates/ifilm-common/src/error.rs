//! Common error types used throughout ifilm.
//!
//! The variants follow the failure classes the proxy has to tell apart when it
//! answers an HTTP client: missing upstream configuration, upstream 404s,
//! internal consistency checks, other upstream failures, and storage failures.

/// Common error type for ifilm.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No upstream server credentials are available.
    #[error("Jellyfin is not configured: {0}")]
    NotConfigured(String),

    /// The upstream client slot exists but no connection has been set up.
    #[error("Jellyfin client is not initialized")]
    NotInitialized,

    /// The requested item was not found (upstream 404 or missing row).
    #[error("Item not found: {0}")]
    NotFound(String),

    /// An internal consistency check failed.
    #[error("Validation mismatch: {0}")]
    ValidationMismatch(String),

    /// The upstream server answered with a failure status or could not be reached.
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A unique constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotConfigured error.
    pub fn not_configured<S: Into<String>>(msg: S) -> Self {
        Self::NotConfigured(msg.into())
    }

    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new ValidationMismatch error.
    pub fn validation_mismatch<S: Into<String>>(msg: S) -> Self {
        Self::ValidationMismatch(msg.into())
    }

    /// Create a new Upstream error with the status the upstream returned.
    pub fn upstream<S: Into<String>>(status: u16, msg: S) -> Self {
        Self::Upstream {
            status,
            message: msg.into(),
        }
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new Conflict error.
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// True for both "no credentials" and "client not set up".
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::NotInitialized)
    }

    /// HTTP status code this error should be reported with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotConfigured(_) | Self::NotInitialized => 503,
            Self::NotFound(_) => 404,
            Self::ValidationMismatch(_) | Self::InvalidInput(_) => 400,
            Self::Conflict(_) => 409,
            // Anything outside the valid range is reported as a bad gateway.
            Self::Upstream { status, .. } if (400..600).contains(status) => *status,
            Self::Upstream { .. } => 502,
            Self::Database(_) | Self::Io(_) | Self::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::NotInitialized => "not_initialized",
            Self::NotFound(_) => "not_found",
            Self::ValidationMismatch(_) => "validation_mismatch",
            Self::Upstream { .. } => "upstream_error",
            Self::Database(_) => "database_error",
            Self::Conflict(_) => "conflict",
            Self::InvalidInput(_) => "invalid_input",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("movie abc");
        assert_eq!(err.to_string(), "Item not found: movie abc");

        let err = Error::NotInitialized;
        assert_eq!(err.to_string(), "Jellyfin client is not initialized");

        let err = Error::upstream(502, "bad gateway");
        assert_eq!(err.to_string(), "Upstream error (502): bad gateway");

        let err = Error::database("connection failed");
        assert_eq!(err.to_string(), "Database error: connection failed");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::not_configured("no server").http_status(), 503);
        assert_eq!(Error::NotInitialized.http_status(), 503);
        assert_eq!(Error::not_found("x").http_status(), 404);
        assert_eq!(Error::validation_mismatch("x").http_status(), 400);
        assert_eq!(Error::upstream(403, "x").http_status(), 403);
        assert_eq!(Error::upstream(0, "connect refused").http_status(), 502);
        assert_eq!(Error::conflict("dup").http_status(), 409);
        assert_eq!(Error::internal("x").http_status(), 500);
    }

    #[test]
    fn test_is_not_configured() {
        assert!(Error::NotInitialized.is_not_configured());
        assert!(Error::not_configured("x").is_not_configured());
        assert!(!Error::not_found("x").is_not_configured());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.code(), "io_error");
    }
}
