//! Core constants for the cardgate scan relay.
//!
//! This module defines the card-format constants used by the normalizer and
//! the operational defaults applied when a configuration key is omitted.
//!
//! # Card Formats
//!
//! Readers deliver one of three payload shapes, all belonging to the card
//! population identified by [`ISSUER_PREFIX`]:
//!
//! ```text
//! 1570=900000001=00=6017700001111110   delimited (track data)
//!                   ^^^^^^^^^            prefix + exchange/site bytes
//!                            ^^^^^^     card number
//!                                  ^    check digit
//! 6017700010001111                     long numeric ("mobile")
//! 111111                               short numeric
//! ```
//!
//! | Format | Canonical output | Example |
//! |--------|------------------|---------|
//! | Delimited | 9 digits, zero-padded | `000111111` |
//! | Long numeric | 16 digits, unchanged | `6017700010001111` |
//! | Short numeric | 9 digits, zero-padded | `000111111` |
//!
//! # Usage
//!
//! ```
//! use cardgate_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(ISSUER_PREFIX.len(), ISSUER_PREFIX_LENGTH);
//!
//! let backoff = Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS);
//! assert_eq!(backoff.as_secs(), 5);
//! ```

// ============================================================================
// Card Formats
// ============================================================================

/// Issuer prefix shared by every card the gateway serves.
pub const ISSUER_PREFIX: &str = "601770";

/// Length of [`ISSUER_PREFIX`].
pub const ISSUER_PREFIX_LENGTH: usize = 6;

/// Field separator used by delimited (track-style) payloads.
///
/// # Examples
///
/// ```
/// use cardgate_core::constants::FIELD_SEPARATOR;
///
/// let fields: Vec<&str> = "1570=900000001=00".split(FIELD_SEPARATOR).collect();
/// assert_eq!(fields, vec!["1570", "900000001", "00"]);
/// ```
pub const FIELD_SEPARATOR: char = '=';

/// Leading bytes stripped from the matching delimited field.
///
/// Covers the issuer prefix plus three exchange/site bytes.
pub const DELIMITED_HEADER_LENGTH: usize = 9;

/// Trailing check digit dropped from the matching delimited field.
pub const CHECK_DIGIT_LENGTH: usize = 1;

/// Width of the zero-padded canonical card identifier.
pub const SHORT_CARD_LENGTH: usize = 9;

/// Width of the long numeric ("mobile") card identifier.
pub const MOBILE_CARD_LENGTH: usize = 16;

// ============================================================================
// Serial Line
// ============================================================================

/// Default serial line speed.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Bytes that terminate one scan line.
pub const LINE_TERMINATORS: [u8; 2] = [b'\r', b'\n'];

/// Longest unterminated line kept in the receive buffer (bytes).
///
/// Readers send short lines; a buffer growing past this without a CR or LF
/// means the device is streaming noise, and the buffer is dropped.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Default delay before a reconnect attempt (milliseconds).
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5000;

// ============================================================================
// Delivery
// ============================================================================

/// Default number of delivery attempts per event.
pub const DEFAULT_SEND_RETRIES: u32 = 3;

/// Default delay between delivery attempts (milliseconds).
///
/// # Examples
///
/// ```
/// use cardgate_core::constants::{DEFAULT_SEND_RETRIES, DEFAULT_SEND_RETRY_DELAY_MS};
///
/// // Worst case wall time spent waiting between attempts for one event.
/// let waiting = (DEFAULT_SEND_RETRIES as u64 - 1) * DEFAULT_SEND_RETRY_DELAY_MS;
/// assert_eq!(waiting, 4000);
/// ```
pub const DEFAULT_SEND_RETRY_DELAY_MS: u64 = 2000;

/// Default timeout for one delivery request (milliseconds).
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Self-update
// ============================================================================

/// Default interval between remote version checks (seconds).
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 600;

/// Default branch tracked by the update supervisor.
pub const DEFAULT_UPDATE_BRANCH: &str = "main";

/// Default API base used to resolve version markers and snapshots.
pub const DEFAULT_UPDATE_API_BASE: &str = "https://api.github.com";

/// Upper bound on each update request, snapshot download included (seconds).
pub const DEFAULT_UPDATE_TIMEOUT_SECS: u64 = 60;

/// File name of the version marker inside the install directory.
pub const VERSION_MARKER_FILE: &str = ".version";
