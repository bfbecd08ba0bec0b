//! Serial device discovery, line framing and the reconnecting connection
//! manager for cardgate.
//!
//! # Architecture
//!
//! ```text
//! AnyEnumerator ──► select_candidate ──► AnyOpener ──► ByteStream
//!                                                          │
//!                    ConnectionManager ◄───────────────────┘
//!                         │  ScanLineCodec + CardNormalizer
//!                         ▼
//!                   mpsc<ScanEvent>
//! ```
//!
//! - [`discovery`]: candidate devices, vendor/product filter, selection
//! - [`sysfs`] / [`naming`]: platform enumeration backends
//! - [`port`]: opening devices and streaming their bytes
//! - [`codec`]: CR/LF line framing
//! - [`state`]: connection state machine
//! - [`manager`]: the task tying it all together
//! - [`mock`]: hardware-free test doubles

pub mod codec;
pub mod devices;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod mock;
pub mod naming;
pub mod port;
pub mod state;
pub mod sysfs;

pub use codec::ScanLineCodec;
pub use devices::{AnyEnumerator, AnyOpener};
pub use discovery::{DeviceCandidate, DeviceEnumerator, DeviceFilter, Selection, select_candidate};
pub use error::{Result, SerialError};
pub use manager::{ConnectionConfig, ConnectionManager};
pub use naming::NamingEnumerator;
pub use port::{ByteStream, PortOpener, PortSettings, SerialPortOpener};
pub use state::{ConnectionState, StateMachine, StateTransition};
pub use sysfs::SysfsEnumerator;
