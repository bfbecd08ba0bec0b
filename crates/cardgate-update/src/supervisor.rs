//! Background self-update supervisor.
//!
//! # Check Cycle
//!
//! ```text
//! tick ──► latest_marker() ──► equal to local? ──yes──► wait for next tick
//!                                   │ no
//!                                   ▼
//!                          download_snapshot()
//!                                   ▼
//!                          install_snapshot()      (error: marker untouched,
//!                                   ▼               retried next tick)
//!                          persist new marker
//!                                   ▼
//!                     SupervisorExit::Restart ──► process exits, service
//!                                                 manager restarts it
//! ```
//!
//! The first check runs as soon as the supervisor starts.

use std::path::PathBuf;
use std::time::Duration;

use cardgate_core::constants::{
    DEFAULT_UPDATE_API_BASE, DEFAULT_UPDATE_BRANCH, DEFAULT_UPDATE_INTERVAL_SECS,
    DEFAULT_UPDATE_TIMEOUT_SECS, VERSION_MARKER_FILE,
};
use reqwest::Url;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{Result, UpdateError};
use crate::install::install_snapshot;
use crate::marker::{VersionMarker, VersionStore};
use crate::source::GithubSource;

/// Update supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfig {
    /// GitHub repository, `owner/name`.
    pub repository: String,

    /// Pinned branch whose head is tracked.
    pub branch: String,

    pub api_base: Url,

    /// Directory whose files are overwritten by each snapshot.
    pub install_dir: PathBuf,

    /// File holding the installed version marker.
    pub marker_path: PathBuf,

    pub check_interval: Duration,

    /// Upper bound on each HTTP request, snapshot download included.
    pub request_timeout: Duration,
}

impl UpdateConfig {
    /// Configuration with default branch, API base, marker path and interval.
    ///
    /// # Errors
    ///
    /// Never in practice; the default API base is a valid URL.
    pub fn new(repository: impl Into<String>, install_dir: impl Into<PathBuf>) -> Result<Self> {
        let install_dir = install_dir.into();
        let api_base = Url::parse(DEFAULT_UPDATE_API_BASE)
            .map_err(|e| UpdateError::Client(e.to_string()))?;

        Ok(Self {
            repository: repository.into(),
            branch: DEFAULT_UPDATE_BRANCH.to_string(),
            api_base,
            marker_path: install_dir.join(VERSION_MARKER_FILE),
            install_dir,
            check_interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_UPDATE_TIMEOUT_SECS),
        })
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The remote marker equals the installed one.
    UpToDate,

    /// A new snapshot was installed and its marker persisted.
    Updated {
        from: Option<VersionMarker>,
        to: VersionMarker,
    },
}

/// Why [`UpdateSupervisor::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    /// New code is on disk; the process should exit so it gets restarted.
    Restart(VersionMarker),

    /// Shutdown was requested.
    Shutdown,
}

/// Polls the update source and installs new revisions.
#[derive(Debug)]
pub struct UpdateSupervisor {
    source: GithubSource,
    store: VersionStore,
    install_dir: PathBuf,
    interval: Duration,
    current: Option<VersionMarker>,
}

impl UpdateSupervisor {
    /// Create a supervisor and read the persisted marker.
    ///
    /// An unreadable marker is treated as absent, which forces a reinstall on
    /// the first check.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::Client` if the HTTP client cannot be built.
    pub fn new(config: UpdateConfig) -> Result<Self> {
        let source = GithubSource::new(
            config.api_base,
            &config.repository,
            &config.branch,
            config.request_timeout,
        )?;
        let store = VersionStore::new(config.marker_path);

        let current = store.load().unwrap_or_else(|e| {
            warn!(path = %store.path().display(), error = %e, "Cannot read version marker, treating as absent");
            None
        });

        Ok(Self {
            source,
            store,
            install_dir: config.install_dir,
            interval: config.check_interval,
            current,
        })
    }

    /// Marker of the installed code, if known.
    pub fn current(&self) -> Option<&VersionMarker> {
        self.current.as_ref()
    }

    /// Run one check cycle.
    ///
    /// # Errors
    ///
    /// Any fetch, download, install or persist failure. The in-memory and
    /// persisted markers are only changed after a successful install.
    pub async fn check_once(&mut self) -> Result<CheckOutcome> {
        let remote = self.source.latest_marker().await?;
        if self.current.as_ref() == Some(&remote) {
            debug!(marker = %remote.short(), "Installed code is up to date");
            return Ok(CheckOutcome::UpToDate);
        }

        info!(
            from = self.current.as_ref().map(VersionMarker::short).unwrap_or("none"),
            to = %remote.short(),
            repository = %self.source.repository(),
            branch = %self.source.branch(),
            "New revision available, installing"
        );

        let snapshot = self.source.download_snapshot(&remote).await?;
        let install_dir = self.install_dir.clone();
        let files = tokio::task::spawn_blocking(move || install_snapshot(&snapshot, &install_dir))
            .await
            .map_err(|e| UpdateError::Task(e.to_string()))??;

        self.store.store(&remote)?;
        let from = self.current.replace(remote.clone());

        info!(marker = %remote.short(), files, "Update installed");
        Ok(CheckOutcome::Updated { from, to: remote })
    }

    /// Check on every tick until an update is installed or shutdown is
    /// requested.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SupervisorExit {
        info!(
            repository = %self.source.repository(),
            branch = %self.source.branch(),
            interval_secs = self.interval.as_secs(),
            current = self.current.as_ref().map(VersionMarker::short).unwrap_or("none"),
            "Update supervisor started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => return SupervisorExit::Shutdown,
                _ = ticker.tick() => {}
            }

            match self.check_once().await {
                Ok(CheckOutcome::Updated { to, .. }) => {
                    info!(marker = %to.short(), "Requesting restart to load new code");
                    return SupervisorExit::Restart(to);
                }
                Ok(CheckOutcome::UpToDate) => {}
                Err(e) => warn!(error = %e, "Update check failed, retrying next tick"),
            }
        }
    }
}

/// Resolve once `shutdown` holds `true` or its sender is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
