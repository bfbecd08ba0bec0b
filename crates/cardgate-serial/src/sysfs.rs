//! Linux enumeration backend.
//!
//! udev publishes one symlink per USB serial adapter under
//! `/dev/serial/by-id`. Each link resolves to the real device node, and the
//! node's sysfs entry leads up the device tree to the USB device directory
//! carrying `idVendor` and `idProduct`:
//!
//! ```text
//! /dev/serial/by-id/usb-FTDI_FT232R-if00-port0 ──► /dev/ttyUSB0
//! /sys/class/tty/ttyUSB0/device ──► /sys/devices/.../1-1/1-1:1.0/ttyUSB0
//!                                                    ▲
//!                                        1-1/idVendor, 1-1/idProduct
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::discovery::{DeviceCandidate, DeviceEnumerator};
use crate::error::{Result, SerialError};

const BY_ID_DIR: &str = "/dev/serial/by-id";
const SYS_CLASS_TTY: &str = "/sys/class/tty";

/// Enumerates USB serial devices through udev's by-id links and sysfs.
#[derive(Debug, Clone)]
pub struct SysfsEnumerator {
    by_id_dir: PathBuf,
    sys_class_tty: PathBuf,
}

impl SysfsEnumerator {
    /// Enumerator over the host's real `/dev` and `/sys`.
    pub fn new() -> Self {
        Self::with_roots(BY_ID_DIR, SYS_CLASS_TTY)
    }

    /// Enumerator over alternative roots (used against fake trees in tests).
    pub fn with_roots(by_id_dir: impl Into<PathBuf>, sys_class_tty: impl Into<PathBuf>) -> Self {
        Self {
            by_id_dir: by_id_dir.into(),
            sys_class_tty: sys_class_tty.into(),
        }
    }

    /// Walk from the tty's sysfs device up to the first directory carrying
    /// USB descriptor files.
    fn usb_ids(&self, tty_name: &str) -> Option<(String, String)> {
        let device = fs::canonicalize(self.sys_class_tty.join(tty_name).join("device")).ok()?;

        device.ancestors().find_map(|dir| {
            let vendor = fs::read_to_string(dir.join("idVendor")).ok()?;
            let product = fs::read_to_string(dir.join("idProduct")).ok()?;
            Some((vendor.trim().to_string(), product.trim().to_string()))
        })
    }
}

impl Default for SysfsEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEnumerator for SysfsEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>> {
        let entries = match fs::read_dir(&self.by_id_dir) {
            Ok(entries) => entries,
            // udev removes the directory when the last adapter is unplugged.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SerialError::enumeration(format!(
                    "cannot read {}: {e}",
                    self.by_id_dir.display()
                )));
            }
        };

        let mut links: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect();
        links.sort();

        let mut candidates = Vec::with_capacity(links.len());
        for link in links {
            let device = match fs::canonicalize(&link) {
                Ok(device) => device,
                Err(e) => {
                    debug!(link = %link.display(), error = %e, "Skipping dangling by-id link");
                    continue;
                }
            };

            let mut candidate = DeviceCandidate::new(&device).with_label(file_name(&link));
            if let Some(name) = device.file_name().and_then(|n| n.to_str())
                && let Some((vendor, product)) = self.usb_ids(name)
            {
                candidate = candidate.with_usb_ids(&vendor, &product);
            }

            debug!(candidate = %candidate, "Found serial device");
            candidates.push(candidate);
        }

        Ok(candidates)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
