//! Opening serial ports and streaming their bytes into the runtime.
//!
//! The device read is blocking, so [`SerialPortOpener`] moves it onto Tokio's
//! blocking pool. A pump thread reads with a short timeout and forwards each
//! chunk over a channel; the async side only ever sees a [`ByteStream`].
//!
//! ```text
//! ┌──────────────┐  io::Result<Bytes>  ┌────────────┐
//! │ blocking read│────── (mpsc) ──────►│ ByteStream │──► ConnectionManager
//! │ (pump thread)│                     └────────────┘
//! └──────────────┘
//! ```
//!
//! Dropping the `ByteStream` closes the channel; the pump notices on its next
//! read timeout and releases the device handle.

use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use cardgate_core::constants::DEFAULT_BAUD_RATE;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Result, SerialError};

/// Chunks buffered between the pump and the connection manager.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Size of a single blocking read.
const READ_CHUNK_SIZE: usize = 256;

/// Line parameters for an open attempt.
///
/// Framing is fixed at 8 data bits, no parity, 1 stop bit and no flow
/// control; only the speed varies between readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub baud_rate: u32,

    /// How long a blocking read waits before checking whether the stream was
    /// dropped.
    pub read_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(200),
        }
    }
}

/// Async end of an open device: a sequence of byte chunks.
#[derive(Debug)]
pub struct ByteStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl ByteStream {
    /// Create a stream together with the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<io::Result<Bytes>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Wait for the next chunk of bytes.
    ///
    /// # Errors
    ///
    /// Returns `SerialError::Io` when the device reports a read error and
    /// `SerialError::StreamLost` once the producing side has gone away.
    pub async fn next_chunk(&mut self) -> Result<Bytes> {
        match self.rx.recv().await {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(error)) => Err(SerialError::Io(error)),
            None => Err(SerialError::stream_lost("device stream closed")),
        }
    }
}

/// Capability: open a device path for reading.
pub trait PortOpener {
    /// Configure and open `path`.
    ///
    /// # Errors
    ///
    /// Returns `SerialError::Open` when the device cannot be configured or
    /// opened.
    fn open(&self, path: &Path, settings: &PortSettings) -> Result<ByteStream>;
}

/// Opens real devices through the `serialport` crate.
///
/// On Unix the port is put into raw, non-echoing mode and opened exclusively.
#[derive(Debug, Clone, Default)]
pub struct SerialPortOpener;

impl SerialPortOpener {
    pub fn new() -> Self {
        Self
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&self, path: &Path, settings: &PortSettings) -> Result<ByteStream> {
        let port = serialport::new(path.to_string_lossy(), settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| SerialError::open(path, e.to_string()))?;

        let (tx, stream) = ByteStream::channel(STREAM_CHANNEL_CAPACITY);
        let label = path.display().to_string();
        tokio::task::spawn_blocking(move || pump(port, tx, &label));

        Ok(stream)
    }
}

/// Blocking read loop; runs until the device fails or the stream is dropped.
fn pump<R: Read>(mut port: R, tx: mpsc::Sender<io::Result<Bytes>>, label: &str) {
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match port.read(&mut chunk) {
            Ok(0) => {
                let _ = tx.blocking_send(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "device returned end of file",
                )));
                break;
            }
            Ok(n) => {
                trace!(device = label, bytes = n, "Serial read");
                if tx.blocking_send(Ok(Bytes::copy_from_slice(&chunk[..n]))).is_err() {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                if tx.is_closed() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }

    debug!(device = label, "Serial read loop finished, releasing device");
}
