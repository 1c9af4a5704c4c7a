//! Error types for WCPS operations.
//!
//! Validation errors are raised by the query builder setters; transport and
//! decode errors are raised while executing a compiled query.

use thiserror::Error;

/// Main error type for WCPS operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A setter received a value of the wrong shape (e.g. a blank expression)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Variable declaration is not of the form `$name in (coverage)`
    #[error("Malformed variable declaration: {0}")]
    MalformedDeclaration(String),

    /// Subset attached to a variable that was never declared
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Expression references no variables, or variables that were never declared
    #[error("Undeclared variable: {0}")]
    UndeclaredVariable(String),

    /// Variable name declared twice in one query
    #[error("Duplicate variable: {0}")]
    DuplicateVariable(String),

    /// Output format outside of PNG, CSV and JPEG
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Service answered with a non-200 status
    #[error("Query rejected with status {status}: {message}")]
    QueryRejected {
        /// HTTP status code returned by the service
        status: u16,
        /// Response body, if any
        message: String,
    },

    /// Connection, DNS, TLS or timeout failure
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Specialized result type for WCPS operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::MalformedDeclaration(_) => "MALFORMED_DECLARATION",
            Self::UnknownVariable(_) => "UNKNOWN_VARIABLE",
            Self::UndeclaredVariable(_) => "UNDECLARED_VARIABLE",
            Self::DuplicateVariable(_) => "DUPLICATE_VARIABLE",
            Self::InvalidFormat(_) => "INVALID_FORMAT",
            Self::QueryRejected { .. } => "QUERY_REJECTED",
            Self::TransportFailure(_) => "TRANSPORT_FAILURE",
            Self::DecodeError(_) => "DECODE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
        }
    }

    /// Returns true if this error was raised while validating builder input,
    /// as opposed to while executing a query.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::MalformedDeclaration(_)
                | Self::UnknownVariable(_)
                | Self::UndeclaredVariable(_)
                | Self::DuplicateVariable(_)
                | Self::InvalidFormat(_)
        )
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TransportFailure(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::TransportFailure(format!("connection failed: {err}"))
        } else {
            Self::TransportFailure(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}
