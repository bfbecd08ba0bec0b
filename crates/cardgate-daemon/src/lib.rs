//! cardgate gateway daemon.
//!
//! Wires the serial connection manager, the delivery pipeline and the update
//! supervisor into one [`Gateway`], configured from a TOML file.

pub mod config;
pub mod gateway;
pub mod logging;
pub mod signals;

pub use config::{ConfigError, GatewayConfig, UpdateSection};
pub use gateway::{ExitReason, Gateway, GatewayError};
pub use logging::LogFormat;
