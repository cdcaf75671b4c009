//! Error types for the checker and the capture pipeline

use thiserror::Error;

/// Result type alias for checker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while checking a template
#[derive(Error, Debug)]
pub enum Error {
    /// Bad, missing or oversized upload (user-correctable)
    #[error("Invalid input: {0}")]
    InputError(String),

    /// The browser process could not be started; fatal for a capture run
    #[error("Browser engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The document could not be opened by the browser
    #[error("Navigation failed: {0}")]
    NavigationError(String),

    /// The rendering viewport could not be set
    #[error("Viewport change failed: {0}")]
    ViewportError(String),

    /// Rendering or rasterizing a viewport failed
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Raw screenshot bytes could not be decoded or re-encoded
    #[error("Image normalization failed: {0}")]
    NormalizeError(String),

    /// The document could not be parsed into a tree at all
    #[error("Failed to parse HTML: {0}")]
    ParseDegraded(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Persisting or reading a report or artifact failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A report or artifact does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller can fix this by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InputError(_) | Error::NotFound(_))
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CaptureError(err.to_string())
    }
}
