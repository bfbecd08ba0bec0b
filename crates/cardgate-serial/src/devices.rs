//! Enum wrappers for platform backend dispatch.
//!
//! The connection manager holds one enumerator and one opener for its whole
//! lifetime. Wrapping the backends in enums keeps it a concrete type and lets
//! tests swap in mocks without generics leaking into the gateway.
//!
//! # Examples
//!
//! ```
//! use cardgate_serial::{AnyEnumerator, DeviceEnumerator};
//! use cardgate_serial::mock::MockEnumerator;
//!
//! let enumerator = AnyEnumerator::Mock(MockEnumerator::new());
//! assert!(enumerator.enumerate().unwrap().is_empty());
//! ```

use std::path::Path;

use crate::discovery::{DeviceCandidate, DeviceEnumerator};
use crate::error::Result;
use crate::mock::{MockEnumerator, MockOpener};
use crate::naming::NamingEnumerator;
use crate::port::{ByteStream, PortOpener, PortSettings, SerialPortOpener};
use crate::sysfs::SysfsEnumerator;

/// Enum wrapper for device enumeration backends.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyEnumerator {
    /// Linux: `/dev/serial/by-id` plus sysfs descriptors.
    Sysfs(SysfsEnumerator),

    /// macOS and others: `/dev` node naming conventions.
    Naming(NamingEnumerator),

    /// Test double.
    Mock(MockEnumerator),
}

impl AnyEnumerator {
    /// Backend for the platform this binary was built for.
    pub fn for_host() -> Self {
        if cfg!(target_os = "linux") {
            Self::Sysfs(SysfsEnumerator::new())
        } else {
            Self::Naming(NamingEnumerator::new())
        }
    }

    /// Short backend name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sysfs(_) => "sysfs",
            Self::Naming(_) => "naming",
            Self::Mock(_) => "mock",
        }
    }
}

impl DeviceEnumerator for AnyEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>> {
        match self {
            Self::Sysfs(backend) => backend.enumerate(),
            Self::Naming(backend) => backend.enumerate(),
            Self::Mock(backend) => backend.enumerate(),
        }
    }
}

/// Enum wrapper for port openers.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyOpener {
    /// Real devices through `serialport`.
    Native(SerialPortOpener),

    /// Test double.
    Mock(MockOpener),
}

impl Default for AnyOpener {
    fn default() -> Self {
        Self::Native(SerialPortOpener::new())
    }
}

impl PortOpener for AnyOpener {
    fn open(&self, path: &Path, settings: &PortSettings) -> Result<ByteStream> {
        match self {
            Self::Native(opener) => opener.open(path, settings),
            Self::Mock(opener) => opener.open(path, settings),
        }
    }
}
