use reqwest::StatusCode;

/// Error type for acquisition operations.
///
/// Every fallible component converts its failures into one of these
/// variants at its own boundary; no error crosses a media-item
/// boundary uncaught.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned status code {0}")]
    StatusCode(StatusCode),

    #[error("access denied by remote server: {0}")]
    AccessDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media size {actual_mb:.2}MB exceeds limit of {limit_mb}MB")]
    SizeExceeded { limit_mb: f64, actual_mb: f64 },

    #[error("cache root is not usable: {0}")]
    CacheUnavailable(String),

    #[error("response body is not media content: {0}")]
    InvalidContent(String),

    #[error("media item has no candidate URLs")]
    NoCandidates,
}

impl AcquireError {
    /// Whether this error is a transport-level failure (timeout,
    /// connection, DNS) as opposed to a definitive remote answer.
    pub fn is_network(&self) -> bool {
        matches!(self, AcquireError::Network(_))
    }

    pub fn is_access_denied(&self) -> bool {
        match self {
            AcquireError::AccessDenied(_) => true,
            AcquireError::StatusCode(status) => *status == StatusCode::FORBIDDEN,
            _ => false,
        }
    }
}
