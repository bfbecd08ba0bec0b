//! Mock device listing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::Result;
use crate::discovery::{DeviceCandidate, DeviceEnumerator};

/// Device listing controlled by the test.
///
/// Clones share state, so a test keeps one clone to attach and detach
/// devices while the connection manager owns another.
///
/// # Examples
///
/// ```
/// use cardgate_serial::{DeviceCandidate, DeviceEnumerator};
/// use cardgate_serial::mock::MockEnumerator;
///
/// let enumerator = MockEnumerator::new();
/// assert!(enumerator.enumerate().unwrap().is_empty());
///
/// enumerator.attach(DeviceCandidate::new("/dev/ttyUSB0"));
/// assert_eq!(enumerator.enumerate().unwrap().len(), 1);
/// assert_eq!(enumerator.call_count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockEnumerator {
    candidates: Arc<Mutex<Vec<DeviceCandidate>>>,
    calls: Arc<AtomicUsize>,
}

impl MockEnumerator {
    /// Create a listing with no devices attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a listing with the given devices, in enumeration order.
    pub fn with_candidates(candidates: Vec<DeviceCandidate>) -> Self {
        let enumerator = Self::new();
        enumerator.set_candidates(candidates);
        enumerator
    }

    /// Replace the attached devices.
    pub fn set_candidates(&self, candidates: Vec<DeviceCandidate>) {
        *self.candidates.lock().unwrap_or_else(PoisonError::into_inner) = candidates;
    }

    /// Attach one more device at the end of the enumeration order.
    pub fn attach(&self, candidate: DeviceCandidate) {
        self.candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(candidate);
    }

    /// Detach every device.
    pub fn clear(&self) {
        self.set_candidates(Vec::new());
    }

    /// Number of times `enumerate` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DeviceEnumerator for MockEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
