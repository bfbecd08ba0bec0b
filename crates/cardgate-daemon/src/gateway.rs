//! Process lifecycle: one owned struct holding every component.
//!
//! ```text
//!                    ┌──────────────────────┐   ScanEvent   ┌──────────────────┐
//!  serial device ──► │  ConnectionManager   │ ────────────► │ DeliveryPipeline │ ──► collector
//!                    └──────────────────────┘   (mpsc)      └──────────────────┘
//!                              ▲ stop
//!  signal ──────► Gateway ─────┤
//!                              ▼ stop
//!                    ┌──────────────────────┐
//!                    │   UpdateSupervisor   │ ── Restart ──► Gateway exits
//!                    └──────────────────────┘
//! ```
//!
//! Shutdown, whether from a signal or an installed update, stops the
//! connection manager (the device is released and the state becomes
//! `Closing`), stops the update supervisor, and abandons in-flight
//! deliveries.

use std::future::Future;

use cardgate_core::ScanEvent;
use cardgate_network::{DeliveryClient, DeliveryError, DeliveryPipeline};
use cardgate_serial::{AnyEnumerator, AnyOpener, ConnectionManager, ConnectionState};
use cardgate_update::{SupervisorExit, UpdateError, UpdateSupervisor, VersionMarker};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, GatewayConfig};

/// Scans buffered between the serial reader and the delivery pipeline.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot build delivery client: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Cannot build update supervisor: {0}")]
    Update(#[from] UpdateError),

    #[error("{component} task ended unexpectedly: {message}")]
    Task {
        component: &'static str,
        message: String,
    },
}

impl GatewayError {
    fn task(component: &'static str, joined: std::result::Result<(), JoinError>) -> Self {
        let message = match joined {
            Ok(()) => "returned before shutdown".to_string(),
            Err(e) => e.to_string(),
        };
        Self::Task { component, message }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Why the gateway stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// A shutdown signal arrived.
    Signal,

    /// New code was installed; the service manager should start it.
    UpdateInstalled(VersionMarker),
}

#[derive(Debug)]
pub struct Gateway {
    connection: ConnectionManager,
    events: mpsc::Receiver<ScanEvent>,
    pipeline: DeliveryPipeline,
    updater: Option<UpdateSupervisor>,
}

impl Gateway {
    /// Build every component from a validated configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let connection =
            ConnectionManager::new(config.connection_config(), config.device_id()?, events_tx)
                .with_normalizer(config.normalizer()?);
        let pipeline = DeliveryPipeline::new(DeliveryClient::new(config.delivery_config()?)?);
        let updater = config
            .update_config()?
            .map(UpdateSupervisor::new)
            .transpose()?;

        Ok(Self {
            connection,
            events,
            pipeline,
            updater,
        })
    }

    /// Replace the serial backends, typically with mocks.
    pub fn with_devices(mut self, enumerator: AnyEnumerator, opener: AnyOpener) -> Self {
        self.connection = self
            .connection
            .with_enumerator(enumerator)
            .with_opener(opener);
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    pub fn update_enabled(&self) -> bool {
        self.updater.is_some()
    }

    /// Run until `shutdown` resolves or an update is installed.
    ///
    /// Returns after the device is released and every background task has
    /// stopped.
    ///
    /// # Errors
    ///
    /// `GatewayError::Task` if the connection manager stops on its own.
    pub async fn run<F>(self, shutdown: F) -> Result<ExitReason>
    where
        F: Future<Output = ()>,
    {
        let Self {
            connection,
            mut events,
            mut pipeline,
            updater,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connection_task = tokio::spawn(connection.run(stop_rx.clone()));
        let mut update_task = updater.map(|updater| tokio::spawn(updater.run(stop_rx)));
        tokio::pin!(shutdown);

        info!(update = update_task.is_some(), "Gateway running");

        let outcome = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(ExitReason::Signal),
                joined = &mut connection_task => {
                    break Err(GatewayError::task("connection manager", joined));
                }
                exit = supervisor_exit(&mut update_task) => match exit {
                    Ok(SupervisorExit::Restart(marker)) => {
                        update_task = None;
                        break Ok(ExitReason::UpdateInstalled(marker));
                    }
                    Ok(SupervisorExit::Shutdown) => update_task = None,
                    Err(e) => {
                        error!(error = %e, "Update supervisor failed, self-update disabled");
                        update_task = None;
                    }
                },
                Some(event) = events.recv() => pipeline.dispatch(event),
                Some(outcome) = pipeline.next_finished() => {
                    debug!(
                        event_id = %outcome.event_id(),
                        delivered = outcome.is_delivered(),
                        attempts = outcome.attempts(),
                        in_flight = pipeline.in_flight(),
                        "Delivery finished"
                    );
                }
            }
        };

        info!("Gateway stopping");
        events.close();
        stop_tx.send_replace(true);

        // On error the connection task has already been joined.
        if outcome.is_ok()
            && let Err(e) = connection_task.await
        {
            warn!(error = %e, "Connection manager did not stop cleanly");
        }
        if let Some(task) = update_task {
            task.abort();
            let joined = task.await;
            if let Some(e) = abnormal_end(&joined) {
                debug!(error = %e, "Update supervisor ended abnormally");
            }
        }

        let abandoned = pipeline.abandon().await;
        let unsent = std::iter::from_fn(|| events.try_recv().ok()).count();
        if unsent > 0 {
            warn!(unsent, "Dropping scans not yet dispatched");
        }

        info!(abandoned, "Gateway stopped");
        outcome
    }
}

/// Wait for the update supervisor to return, or forever when there is none.
async fn supervisor_exit(
    task: &mut Option<JoinHandle<SupervisorExit>>,
) -> std::result::Result<SupervisorExit, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// The join error of a task that neither returned nor was cancelled.
fn abnormal_end<T>(joined: &std::result::Result<T, JoinError>) -> Option<&JoinError> {
    match joined {
        Err(e) if !e.is_cancelled() => Some(e),
        _ => None,
    }
}
