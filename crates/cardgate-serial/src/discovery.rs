//! Candidate device discovery.
//!
//! Enumeration is a single capability, [`DeviceEnumerator`], with one backend
//! per platform family:
//!
//! - [`SysfsEnumerator`](crate::SysfsEnumerator) (Linux): `/dev/serial/by-id`
//!   symlinks, with the USB descriptor read from sysfs
//! - [`NamingEnumerator`](crate::NamingEnumerator) (macOS and others):
//!   device-node naming conventions under `/dev`
//!
//! Backends only list what is attached. Choosing among the candidates is
//! [`select_candidate`], which applies the vendor/product filter and resolves
//! ambiguity deterministically: the first qualifying device in enumeration
//! order wins.
//!
//! # Examples
//!
//! ```
//! use cardgate_serial::{DeviceCandidate, DeviceFilter, select_candidate};
//!
//! let candidates = vec![
//!     DeviceCandidate::new("/dev/ttyUSB0").with_usb_ids("067b", "2303"),
//!     DeviceCandidate::new("/dev/ttyUSB1").with_usb_ids("0403", "6001"),
//! ];
//!
//! let filter = DeviceFilter::new(Some("0403"), Some("6001"));
//! let selection = select_candidate(&candidates, &filter).unwrap();
//! assert_eq!(selection.device.path.to_str(), Some("/dev/ttyUSB1"));
//! assert!(!selection.is_ambiguous());
//! ```

use std::fmt;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{Result, SerialError};

/// A serial device found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Path handed to the port opener.
    pub path: PathBuf,

    /// Human-readable label (by-id link name or device node name).
    pub label: Option<String>,

    /// USB vendor ID, lowercase hex, when known.
    pub vendor_id: Option<String>,

    /// USB product ID, lowercase hex, when known.
    pub product_id: Option<String>,
}

impl DeviceCandidate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            label: None,
            vendor_id: None,
            product_id: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the USB vendor and product IDs (stored lowercase).
    pub fn with_usb_ids(mut self, vendor_id: &str, product_id: &str) -> Self {
        self.vendor_id = Some(canonical_usb_id(vendor_id));
        self.product_id = Some(canonical_usb_id(product_id));
        self
    }
}

impl fmt::Display for DeviceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let (Some(vid), Some(pid)) = (&self.vendor_id, &self.product_id) {
            write!(f, " [{vid}:{pid}]")?;
        }
        Ok(())
    }
}

/// Vendor/product discovery filter.
///
/// Each configured ID must match (case-insensitively); an unset ID matches
/// anything. A device with unknown USB IDs never satisfies a set ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    vendor_id: Option<String>,
    product_id: Option<String>,
}

impl DeviceFilter {
    pub fn new(vendor_id: Option<&str>, product_id: Option<&str>) -> Self {
        Self {
            vendor_id: normalize_id(vendor_id),
            product_id: normalize_id(product_id),
        }
    }

    /// A filter that accepts every device.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vendor_id.is_none() && self.product_id.is_none()
    }

    pub fn matches(&self, candidate: &DeviceCandidate) -> bool {
        id_matches(self.vendor_id.as_deref(), candidate.vendor_id.as_deref())
            && id_matches(self.product_id.as_deref(), candidate.product_id.as_deref())
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(vid) = &self.vendor_id {
            parts.push(format!("vendor={vid}"));
        }
        if let Some(pid) = &self.product_id {
            parts.push(format!("product={pid}"));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Canonical form of a USB ID: four lowercase hex digits.
///
/// Accepts an optional `0x`/`0X` prefix and fewer than four digits. Values
/// that are not 16-bit hex are kept lowercased and only ever equal
/// themselves.
pub(crate) fn canonical_usb_id(id: &str) -> String {
    let id = id.trim();
    let digits = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);

    match u16::from_str_radix(digits, 16) {
        Ok(value) if !digits.starts_with('+') => format!("{value:04x}"),
        _ => digits.to_ascii_lowercase(),
    }
}

fn normalize_id(id: Option<&str>) -> Option<String> {
    id.map(canonical_usb_id).filter(|id| !id.is_empty())
}

fn id_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(wanted), Some(actual)) => wanted == actual,
        (Some(_), None) => false,
    }
}

/// Platform capability: list the serial devices currently attached.
///
/// Implementations return candidates in a stable order; selection relies on
/// it to stay deterministic across calls.
pub trait DeviceEnumerator {
    /// List attached candidate devices.
    ///
    /// # Errors
    ///
    /// Returns `SerialError::Enumeration` if the host listing is unreadable.
    /// An empty listing is not an error.
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>>;
}

/// Outcome of choosing a device among enumerated candidates.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    /// The chosen device.
    pub device: &'a DeviceCandidate,

    /// How many candidates satisfied the filter.
    pub matches: usize,
}

impl Selection<'_> {
    pub fn is_ambiguous(&self) -> bool {
        self.matches > 1
    }
}

/// Choose the first candidate satisfying `filter`.
///
/// Several qualifying devices are logged as ambiguous, never treated as an
/// error.
///
/// # Errors
///
/// Returns `SerialError::NoDevice` when nothing qualifies.
pub fn select_candidate<'a>(
    candidates: &'a [DeviceCandidate],
    filter: &DeviceFilter,
) -> Result<Selection<'a>> {
    let mut qualifying = candidates.iter().filter(|c| filter.matches(c));

    let device = qualifying
        .next()
        .ok_or_else(|| SerialError::no_device(filter))?;
    let matches = 1 + qualifying.count();

    let selection = Selection { device, matches };
    if selection.is_ambiguous() {
        warn!(
            matches,
            selected = %device,
            filter = %filter,
            "Multiple serial devices qualify, using the first"
        );
    }

    Ok(selection)
}
