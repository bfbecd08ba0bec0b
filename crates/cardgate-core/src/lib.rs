pub mod constants;
pub mod error;
pub mod normalizer;
pub mod types;

pub use error::{Error, Result};
pub use normalizer::{CardFormat, CardNormalizer};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
