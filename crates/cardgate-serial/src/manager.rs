//! Device connection manager.
//!
//! The [`ConnectionManager`] owns the serial link for the life of the process.
//! It runs as a single task that finds a device, reads scan lines from it,
//! normalizes them and forwards the resulting events. Any failure takes the
//! link back to `Disconnected` and a fixed back-off later the cycle starts
//! over.
//!
//! # Architecture
//!
//! ```text
//!            ┌───────────── back-off ─────────────┐
//!            ▼                                    │
//!    ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//!    │ Disconnected │──►│ Discovering │──►│     Open     │
//!    └──────────────┘   └─────────────┘   └──────────────┘
//!                              │                 │ lines
//!                              └── failure ──┐   ▼
//!                                            │ ScanLineCodec ─► CardNormalizer ─► ScanEvent (mpsc)
//!                                            ▼
//!                                       Disconnected
//! ```
//!
//! The back-off is a plain `sleep` awaited inline by the task, so at most
//! one reconnect timer exists at any time, and a shutdown request cancels it
//! by winning the `select!`.
//!
//! # Examples
//!
//! ```
//! use cardgate_core::DeviceId;
//! use cardgate_serial::mock::{MockEnumerator, MockOpener};
//! use cardgate_serial::{AnyEnumerator, AnyOpener, ConnectionConfig, ConnectionManager, DeviceCandidate};
//! use tokio::sync::{mpsc, watch};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let enumerator = MockEnumerator::with_candidates(vec![DeviceCandidate::new("/dev/ttyUSB0")]);
//!     let opener = MockOpener::new();
//!     let port = opener.push_port();
//!
//!     let (events_tx, mut events) = mpsc::channel(8);
//!     let manager = ConnectionManager::new(
//!         ConnectionConfig::default(),
//!         DeviceId::new("gate-01").unwrap(),
//!         events_tx,
//!     )
//!     .with_enumerator(AnyEnumerator::Mock(enumerator))
//!     .with_opener(AnyOpener::Mock(opener));
//!
//!     let (stop_tx, stop_rx) = watch::channel(false);
//!     let task = tokio::spawn(manager.run(stop_rx));
//!
//!     port.send_line("111111").await.unwrap();
//!     let event = events.recv().await.unwrap();
//!     assert_eq!(event.card_id().as_str(), "000111111");
//!
//!     stop_tx.send(true).unwrap();
//!     task.await.unwrap();
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use bytes::BytesMut;
use cardgate_core::constants::{DEFAULT_BAUD_RATE, DEFAULT_RECONNECT_INTERVAL_MS};
use cardgate_core::{CardNormalizer, DeviceId, RawLine, ScanEvent};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, warn};

use crate::codec::ScanLineCodec;
use crate::devices::{AnyEnumerator, AnyOpener};
use crate::discovery::{DeviceEnumerator, DeviceFilter, select_candidate};
use crate::error::{Result, SerialError};
use crate::port::{ByteStream, PortOpener, PortSettings};
use crate::state::{ConnectionState, StateMachine};

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Pinned device path; when set, enumeration is skipped.
    pub serial_path: Option<PathBuf>,

    /// Vendor/product filter applied during enumeration.
    pub filter: DeviceFilter,

    pub baud_rate: u32,

    /// Fixed delay between connection attempts.
    pub reconnect_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            serial_path: None,
            filter: DeviceFilter::any(),
            baud_rate: DEFAULT_BAUD_RATE,
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
        }
    }
}

/// Why the read loop of one connection ended.
enum PumpExit {
    Lost(SerialError),
    Shutdown,
}

/// Owns the serial device and drives the connection state machine.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    enumerator: AnyEnumerator,
    opener: AnyOpener,
    normalizer: CardNormalizer,
    codec: ScanLineCodec,
    device_id: DeviceId,
    machine: StateMachine,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<ScanEvent>,
}

impl ConnectionManager {
    /// Create a manager using the host's enumeration backend and real ports.
    ///
    /// Normalized scans are sent on `events`.
    pub fn new(config: ConnectionConfig, device_id: DeviceId, events: mpsc::Sender<ScanEvent>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            config,
            enumerator: AnyEnumerator::for_host(),
            opener: AnyOpener::default(),
            normalizer: CardNormalizer::new(),
            codec: ScanLineCodec::new(),
            device_id,
            machine: StateMachine::new(),
            state_tx,
            events,
        }
    }

    pub fn with_enumerator(mut self, enumerator: AnyEnumerator) -> Self {
        self.enumerator = enumerator;
        self
    }

    pub fn with_opener(mut self, opener: AnyOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_normalizer(mut self, normalizer: CardNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_codec(mut self, codec: ScanLineCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Observe connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.current_state()
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// The first connection attempt is immediate; every later attempt waits
    /// the reconnect interval. Returns once the device is released and the
    /// state is `Closing`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            backend = self.enumerator.name(),
            pinned = self.config.serial_path.is_some(),
            filter = %self.config.filter,
            "Connection manager started"
        );

        let mut first_attempt = true;
        loop {
            if *shutdown.borrow() {
                break;
            }

            if !first_attempt {
                tokio::select! {
                    biased;
                    _ = stop_requested(&mut shutdown) => break,
                    _ = sleep(self.config.reconnect_interval) => {}
                }
            }
            first_attempt = false;

            self.set_state(ConnectionState::Discovering);
            let stream = match self.connect() {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_ms = self.config.reconnect_interval.as_millis() as u64,
                        "Serial connection attempt failed, retry scheduled"
                    );
                    self.set_state(ConnectionState::Disconnected);
                    continue;
                }
            };

            self.set_state(ConnectionState::Open);
            match self.pump_lines(stream, &mut shutdown).await {
                PumpExit::Lost(e) => {
                    warn!(
                        error = %e,
                        open_for_ms = self.machine.time_in_current_state().as_millis() as u64,
                        retry_in_ms = self.config.reconnect_interval.as_millis() as u64,
                        "Serial connection lost, retry scheduled"
                    );
                    self.set_state(ConnectionState::Disconnected);
                }
                PumpExit::Shutdown => break,
            }
        }

        self.set_state(ConnectionState::Closing);
        info!("Connection manager stopped");
    }

    /// Resolve the device path and open it.
    fn connect(&self) -> Result<ByteStream> {
        let path = match &self.config.serial_path {
            Some(path) => path.clone(),
            None => {
                let candidates = self.enumerator.enumerate()?;
                let selection = select_candidate(&candidates, &self.config.filter)?;
                info!(device = %selection.device, matches = selection.matches, "Serial device selected");
                selection.device.path.clone()
            }
        };

        let settings = PortSettings {
            baud_rate: self.config.baud_rate,
            ..PortSettings::default()
        };
        let stream = self.opener.open(&path, &settings)?;

        info!(path = %path.display(), baud_rate = settings.baud_rate, "Serial device opened");
        Ok(stream)
    }

    /// Read and process lines until the stream fails or shutdown is requested.
    ///
    /// The line buffer is local to one connection, so a partial line is never
    /// carried across a reconnect.
    async fn pump_lines(&mut self, mut stream: ByteStream, shutdown: &mut watch::Receiver<bool>) -> PumpExit {
        let mut buffer = BytesMut::with_capacity(256);
        self.codec.reset();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = stop_requested(shutdown) => return PumpExit::Shutdown,
                chunk = stream.next_chunk() => chunk,
            };

            match chunk {
                Ok(bytes) => buffer.extend_from_slice(&bytes),
                Err(e) => {
                    if !buffer.is_empty() {
                        debug!(discarded = buffer.len(), "Dropping partial line buffered before disconnect");
                    }
                    return PumpExit::Lost(e);
                }
            }

            loop {
                match self.codec.decode(&mut buffer) {
                    Ok(Some(line)) => self.handle_line(line).await,
                    Ok(None) => break,
                    Err(e) => return PumpExit::Lost(e),
                }
            }
        }
    }

    async fn handle_line(&self, line: RawLine) {
        if !self.machine.current_state().accepts_input() {
            return;
        }

        let Some((format, card_id)) = self.normalizer.classify(line.as_str()) else {
            warn!(line = %line, "Unrecognized card format, scan discarded");
            return;
        };

        let event = ScanEvent::new(card_id, self.device_id.clone());
        info!(
            card_id = %event.card_id(),
            format = %format,
            event_id = %event.id(),
            "Card scanned"
        );

        if self.events.send(event).await.is_err() {
            debug!("Event receiver closed, scan dropped");
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        match self.machine.transition_to(state) {
            Ok(transition) => {
                debug!(from = %transition.from, to = %transition.to, "Connection state changed");
                self.state_tx.send_replace(state);
            }
            Err(e) => error!(error = %e, "Connection state machine rejected transition"),
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
