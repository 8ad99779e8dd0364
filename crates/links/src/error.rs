use thiserror::Error;

/// Errors produced while routing or resolving a link.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no parser can handle URL: {0}")]
    Unsupported(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to resolve {url}: {reason}")]
    Resolve { url: String, reason: String },
}
