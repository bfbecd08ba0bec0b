//! Error types for serial device operations.
//!
//! Every variant here is recoverable: the connection manager answers all of
//! them the same way, by tearing the stream down and retrying after the
//! reconnect interval.

use std::path::Path;

/// Result type alias for serial operations.
pub type Result<T> = std::result::Result<T, SerialError>;

/// Errors that can occur while finding, opening or reading a serial device.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// No attached device satisfied the discovery filter.
    #[error("No serial device found{filter}")]
    NoDevice { filter: String },

    /// The host's device listing could not be read.
    #[error("Device enumeration failed: {message}")]
    Enumeration { message: String },

    /// The device exists but could not be configured or opened.
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// The open stream failed or was closed by the device.
    #[error("Serial stream lost: {message}")]
    StreamLost { message: String },

    /// Attempted a transition the connection state machine does not allow.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerialError {
    /// Create a no-device error, describing the filter that was applied.
    pub fn no_device(filter: impl std::fmt::Display) -> Self {
        let filter = filter.to_string();
        Self::NoDevice {
            filter: if filter.is_empty() {
                String::new()
            } else {
                format!(" matching {filter}")
            },
        }
    }

    /// Create an enumeration error.
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::Enumeration {
            message: message.into(),
        }
    }

    /// Create an open error for a device path.
    pub fn open(path: &Path, message: impl Into<String>) -> Self {
        Self::Open {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Create a stream-lost error.
    pub fn stream_lost(message: impl Into<String>) -> Self {
        Self::StreamLost {
            message: message.into(),
        }
    }

    /// Whether the error came from discovery rather than an existing device.
    pub fn is_discovery_failure(&self) -> bool {
        matches!(self, Self::NoDevice { .. } | Self::Enumeration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_device_without_filter() {
        let error = SerialError::no_device("");
        assert_eq!(error.to_string(), "No serial device found");
        assert!(error.is_discovery_failure());
    }

    #[test]
    fn test_no_device_with_filter() {
        let error = SerialError::no_device("vendor=0403 product=6001");
        assert_eq!(
            error.to_string(),
            "No serial device found matching vendor=0403 product=6001"
        );
    }

    #[test]
    fn test_open_error() {
        let error = SerialError::open(Path::new("/dev/ttyUSB0"), "Permission denied");
        assert!(matches!(error, SerialError::Open { .. }));
        assert_eq!(
            error.to_string(),
            "Failed to open /dev/ttyUSB0: Permission denied"
        );
        assert!(!error.is_discovery_failure());
    }

    #[test]
    fn test_stream_lost_error() {
        let error = SerialError::stream_lost("device unplugged");
        assert_eq!(error.to_string(), "Serial stream lost: device unplugged");
    }
}
