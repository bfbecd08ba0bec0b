//! Mock serial devices for testing and development.
//!
//! These stand in for the host's device listing and for real ports, so the
//! connection manager can be driven without hardware: tests decide which
//! devices are attached, which opens succeed, and what bytes, errors and
//! closes each port produces.

pub mod enumerator;
pub mod port;

pub use enumerator::MockEnumerator;
pub use port::{MockOpener, MockPort, MockPortHandle};
