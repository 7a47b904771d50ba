//! Error types for the media delivery service

use thiserror::Error;

/// Result type alias for media delivery operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Error types that can occur while delivering media objects
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Access to protected resource denied: {0}")]
    ProtectedResource(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid range header: {0}")]
    InvalidRange(String),

    #[error("Range not satisfiable for object of size {size:?}")]
    RangeUnsatisfiable { size: Option<u64> },

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::IoError(err.to_string())
    }
}

impl MediaError {
    /// Convert error to HTTP status code
    ///
    /// Key and policy errors are client errors resolved before any store
    /// access. Anything coming from the store or cache maps to 500.
    pub fn to_http_status(&self) -> u16 {
        match self {
            MediaError::InvalidKey(_) => 400,
            MediaError::ProtectedResource(_) => 403,
            MediaError::ObjectNotFound(_) => 404,
            MediaError::InvalidRange(_) => 416,
            MediaError::RangeUnsatisfiable { .. } => 416,
            MediaError::UpstreamFailure(_) => 500,
            MediaError::ConfigError(_) => 500,
            MediaError::IoError(_) => 500,
        }
    }

    /// Whether this error describes a problem with the client's request
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.to_http_status())
    }

    /// Create an UpstreamFailure from any displayable error
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        MediaError::UpstreamFailure(err.to_string())
    }
}
