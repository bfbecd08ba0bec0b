//! Update error types.
//!
//! None of these are fatal: a failed check is logged and the next tick
//! starts over from scratch.

use std::path::Path;

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors that can occur while checking for, downloading or installing an
/// update.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The HTTP request failed before a response arrived.
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The update source answered with a non-2xx status.
    #[error("Update source responded with HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The remote version response could not be understood.
    #[error("Invalid version response: {0}")]
    InvalidResponse(String),

    /// The snapshot archive is corrupt or truncated.
    #[error("Snapshot archive error: {0}")]
    Archive(String),

    /// An archive entry would land outside the install directory.
    #[error("Refusing to install unsafe archive path {0}")]
    UnsafePath(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// The blocking install task did not complete.
    #[error("Install task failed: {0}")]
    Task(String),

    /// Filesystem error while installing or persisting the marker.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    pub fn request(url: impl Into<String>, error: &reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            message: error.to_string(),
        }
    }

    pub fn archive(message: impl std::fmt::Display) -> Self {
        Self::Archive(message.to_string())
    }

    pub fn unsafe_path(path: &Path) -> Self {
        Self::UnsafePath(path.display().to_string())
    }
}
