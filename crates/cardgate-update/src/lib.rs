//! Self-update for cardgate.
//!
//! The [`UpdateSupervisor`] tracks the head of a pinned branch. When it moves,
//! the new source snapshot is written over the install directory, the version
//! marker is persisted, and the supervisor asks the process to exit so the
//! service manager restarts it on the new code.
//!
//! - [`marker`]: version marker and its file
//! - [`source`]: GitHub commit and tarball endpoints
//! - [`install`]: tarball extraction
//! - [`supervisor`]: timer-driven check cycle

pub mod error;
pub mod install;
pub mod marker;
pub mod source;
pub mod supervisor;

pub use error::{Result, UpdateError};
pub use install::install_snapshot;
pub use marker::{VersionMarker, VersionStore};
pub use source::GithubSource;
pub use supervisor::{CheckOutcome, SupervisorExit, UpdateConfig, UpdateSupervisor};
