//! Line framing for reader output.
//!
//! Card readers terminate every scan with CR, LF or both, depending on model
//! and firmware. The [`ScanLineCodec`] splits the byte stream at the earliest
//! terminator of either kind, so `\r\n`, `\n\r`, `\r` and `\n` all frame
//! correctly, and the empty lines produced by two-byte terminators are
//! skipped.
//!
//! ```text
//! buffer: 1 1 1 1 1 1 \r \n 6 0 1 7 ...
//!                     ^^ earliest terminator -> "111111"
//!                        ^^ empty line -> skipped
//! ```
//!
//! An unterminated line longer than the limit is dropped together with
//! everything up to its eventual terminator, so the tail of a garbage run is
//! never framed as a scan.
//!
//! # Usage
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//! use cardgate_serial::ScanLineCodec;
//!
//! let mut codec = ScanLineCodec::new();
//! let mut buffer = BytesMut::from(&b"111111\r\n6017"[..]);
//!
//! let line = codec.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(line.as_str(), "111111");
//!
//! // The partial second line stays buffered until its terminator arrives.
//! assert!(codec.decode(&mut buffer).unwrap().is_none());
//! assert_eq!(&buffer[..], b"6017");
//! ```

use bytes::{Buf, BytesMut};
use cardgate_core::RawLine;
use cardgate_core::constants::{LINE_TERMINATORS, MAX_LINE_LENGTH};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::error::SerialError;

/// Tokio decoder that yields one [`RawLine`] per terminated scan.
#[derive(Debug, Clone)]
pub struct ScanLineCodec {
    /// Longest unterminated line tolerated before the buffer is dropped.
    max_line_length: usize,

    /// Dropping an over-long line until its terminator shows up.
    discarding: bool,
}

impl ScanLineCodec {
    /// Create a codec with the default line length limit.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom line length limit.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            discarding: false,
        }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Whether the rest of an over-long line is still being dropped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Forget any line in progress; used when a new connection starts.
    pub fn reset(&mut self) {
        self.discarding = false;
    }
}

impl Default for ScanLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ScanLineCodec {
    type Item = RawLine;
    type Error = SerialError;

    /// Extract the next non-empty line from the buffer.
    ///
    /// Returns `Ok(None)` once no complete line remains; the unterminated
    /// tail is left in `src`. Never returns an error.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = src.iter().position(|b| LINE_TERMINATORS.contains(b)) else {
                if self.discarding {
                    src.clear();
                } else if src.len() > self.max_line_length {
                    warn!(
                        discarded = src.len(),
                        limit = self.max_line_length,
                        "Unterminated serial input exceeds line limit, discarding until next terminator"
                    );
                    src.clear();
                    self.discarding = true;
                }
                return Ok(None);
            };

            if self.discarding {
                src.advance(end + 1);
                self.discarding = false;
                continue;
            }

            let line = RawLine::from_bytes(&src[..end]);
            src.advance(end + 1);

            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }
}
