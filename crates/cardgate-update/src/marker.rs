//! Version marker and its on-disk store.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Opaque token identifying a code revision (a commit hash for GitHub
/// sources).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionMarker(String);

impl VersionMarker {
    /// Create a marker; returns `None` for a blank value.
    pub fn new(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(Self(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The locally persisted marker: one file holding one line.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted marker.
    ///
    /// A missing or blank file means no marker (first run).
    ///
    /// # Errors
    ///
    /// Any other read failure.
    pub fn load(&self) -> Result<Option<VersionMarker>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(VersionMarker::new(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist `marker`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Any write failure.
    pub fn store(&self, marker: &VersionMarker) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{marker}\n"))?;
        Ok(())
    }
}
