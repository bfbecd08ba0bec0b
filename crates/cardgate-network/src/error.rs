//! Delivery error types.

use std::time::Duration;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors from a single delivery attempt.
///
/// Every variant except `Client` is retried; none of them are fatal to the
/// process.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The collector answered with a non-2xx status.
    #[error("Collector responded with HTTP {status}")]
    Status { status: u16 },

    /// No response within the per-request timeout.
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Connection, TLS or protocol failure before a response arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl DeliveryError {
    /// Classify a `reqwest` failure.
    pub fn from_request(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout.as_millis() as u64)
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(error.to_string())
        }
    }
}
