//! Naming-convention enumeration backend (macOS and other Unixes).
//!
//! Without udev's by-id links, USB serial adapters are recognized by the
//! device node names their drivers create under `/dev`. USB IDs come from
//! `serialport`'s port listing when it knows the node.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serialport::SerialPortType;
use tracing::debug;

use crate::discovery::{DeviceCandidate, DeviceEnumerator};
use crate::error::{Result, SerialError};

/// Node name prefixes created by USB serial drivers.
pub const DEVICE_NAME_PREFIXES: [&str; 6] = [
    "cu.usbserial",
    "cu.usbmodem",
    "tty.usbserial",
    "tty.usbmodem",
    "ttyUSB",
    "ttyACM",
];

/// Enumerates serial devices by node name.
#[derive(Debug, Clone)]
pub struct NamingEnumerator {
    dev_dir: PathBuf,
    lookup_usb_ids: bool,
}

impl NamingEnumerator {
    pub fn new() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
            lookup_usb_ids: true,
        }
    }

    /// Enumerate another directory instead of `/dev`. USB ID lookup is
    /// disabled, since the host's port listing cannot describe it.
    pub fn with_dev_dir(dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
            lookup_usb_ids: false,
        }
    }

    fn usb_ids(&self) -> HashMap<String, (String, String)> {
        if !self.lookup_usb_ids {
            return HashMap::new();
        }

        match serialport::available_ports() {
            Ok(ports) => ports
                .into_iter()
                .filter_map(|port| match port.port_type {
                    SerialPortType::UsbPort(usb) => Some((
                        port.port_name,
                        (format!("{:04x}", usb.vid), format!("{:04x}", usb.pid)),
                    )),
                    _ => None,
                })
                .collect(),
            Err(e) => {
                debug!(error = %e, "USB descriptor lookup unavailable");
                HashMap::new()
            }
        }
    }
}

impl Default for NamingEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEnumerator for NamingEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>> {
        let entries = fs::read_dir(&self.dev_dir).map_err(|e| {
            SerialError::enumeration(format!("cannot read {}: {e}", self.dev_dir.display()))
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| DEVICE_NAME_PREFIXES.iter().any(|p| name.starts_with(p)))
            .collect();
        names.sort();

        let usb_ids = self.usb_ids();
        let candidates = names
            .into_iter()
            .map(|name| {
                let path = self.dev_dir.join(&name);
                let mut candidate = DeviceCandidate::new(&path).with_label(name);
                if let Some((vendor, product)) = usb_ids.get(path.to_string_lossy().as_ref()) {
                    candidate = candidate.with_usb_ids(vendor, product);
                }
                candidate
            })
            .collect();

        Ok(candidates)
    }
}
