//! Mock serial ports and opener.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, SerialError};
use crate::port::{ByteStream, PortOpener, PortSettings};

/// Chunks a mock port buffers before `send_bytes` waits.
const MOCK_PORT_CAPACITY: usize = 32;

/// A simulated device whose byte stream is fed through a [`MockPortHandle`].
///
/// # Examples
///
/// ```
/// use cardgate_serial::mock::MockPort;
///
/// #[tokio::main]
/// async fn main() -> cardgate_serial::Result<()> {
///     let (mut stream, handle) = MockPort::new();
///
///     handle.send_line("111111").await?;
///     assert_eq!(&stream.next_chunk().await?[..], b"111111\r\n");
///
///     handle.close();
///     assert!(stream.next_chunk().await.is_err());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockPort;

impl MockPort {
    /// Create a stream and the handle that drives it.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (ByteStream, MockPortHandle) {
        let (tx, stream) = ByteStream::channel(MOCK_PORT_CAPACITY);
        (stream, MockPortHandle { tx })
    }
}

/// Handle for controlling a mock port.
///
/// Dropping the handle (or calling [`close`](Self::close)) looks like the
/// device disappearing.
#[derive(Debug, Clone)]
pub struct MockPortHandle {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl MockPortHandle {
    /// Deliver raw bytes as one read chunk.
    ///
    /// # Errors
    ///
    /// Returns `SerialError::StreamLost` if the reading side was dropped.
    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.tx
            .send(Ok(Bytes::copy_from_slice(bytes)))
            .await
            .map_err(|_| SerialError::stream_lost("mock port reader dropped"))
    }

    /// Deliver one CR/LF-terminated line.
    ///
    /// # Errors
    ///
    /// Returns `SerialError::StreamLost` if the reading side was dropped.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        self.send_bytes(format!("{line}\r\n").as_bytes()).await
    }

    /// Make the next read fail with an I/O error of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `SerialError::StreamLost` if the reading side was dropped.
    pub async fn fail(&self, kind: io::ErrorKind) -> Result<()> {
        self.tx
            .send(Err(io::Error::new(kind, "injected mock port failure")))
            .await
            .map_err(|_| SerialError::stream_lost("mock port reader dropped"))
    }

    /// Whether the reading side has released the port.
    pub fn is_released(&self) -> bool {
        self.tx.is_closed()
    }

    /// Close the port from the device side.
    pub fn close(self) {}
}

#[derive(Debug)]
enum OpenScript {
    Port(ByteStream),
    Fail(String),
}

#[derive(Debug, Default)]
struct OpenerState {
    script: VecDeque<OpenScript>,
    opened: Vec<PathBuf>,
    attempts: usize,
}

/// Port opener that hands out scripted results in order.
///
/// Each open attempt consumes the next scripted entry; once the script is
/// exhausted every attempt fails. Clones share state.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use cardgate_serial::{PortOpener, PortSettings};
/// use cardgate_serial::mock::MockOpener;
///
/// let opener = MockOpener::new();
/// let _handle = opener.push_port();
/// opener.push_failure("Permission denied");
///
/// let settings = PortSettings::default();
/// assert!(opener.open(Path::new("/dev/ttyUSB0"), &settings).is_ok());
/// assert!(opener.open(Path::new("/dev/ttyUSB0"), &settings).is_err());
/// assert!(opener.open(Path::new("/dev/ttyUSB0"), &settings).is_err());
/// assert_eq!(opener.attempts(), 3);
/// assert_eq!(opener.opened().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockOpener {
    state: Arc<Mutex<OpenerState>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful open and return the handle for that port.
    pub fn push_port(&self) -> MockPortHandle {
        let (stream, handle) = MockPort::new();
        self.lock().script.push_back(OpenScript::Port(stream));
        handle
    }

    /// Script a failed open.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.lock()
            .script
            .push_back(OpenScript::Fail(message.into()));
    }

    /// Paths successfully opened so far, in order.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.lock().opened.clone()
    }

    /// Number of open attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OpenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PortOpener for MockOpener {
    fn open(&self, path: &Path, _settings: &PortSettings) -> Result<ByteStream> {
        let mut state = self.lock();
        state.attempts += 1;

        match state.script.pop_front() {
            Some(OpenScript::Port(stream)) => {
                state.opened.push(path.to_path_buf());
                Ok(stream)
            }
            Some(OpenScript::Fail(message)) => Err(SerialError::open(path, message)),
            None => Err(SerialError::open(path, "No such file or directory")),
        }
    }
}
