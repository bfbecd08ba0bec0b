use crate::{
    Result,
    constants::{MOBILE_CARD_LENGTH, SHORT_CARD_LENGTH},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// One scan line as received from the reader.
///
/// Bytes before a CR/LF terminator, decoded lossily and trimmed of
/// surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine(String);

impl RawLine {
    /// Build a line from the bytes preceding a terminator.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        RawLine(String::from_utf8_lossy(bytes).trim().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of a canonical card identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardKind {
    /// 9-digit zero-padded card number.
    Short,
    /// 16-digit number carrying the issuer prefix.
    Mobile,
}

/// Canonical card identifier (9 or 16 decimal digits).
///
/// Only [`CardNormalizer`](crate::CardNormalizer) creates values of this type,
/// so every instance is either a 9-digit zero-padded number or a 16-digit
/// number beginning with the issuer prefix.
///
/// # Security
/// Comparison runs in constant time, as card numbers act as credentials.
#[derive(Debug, Clone, Eq)]
pub struct CardId(String);

impl CardId {
    pub(crate) fn from_canonical(digits: String) -> Self {
        debug_assert!(
            matches!(digits.len(), SHORT_CARD_LENGTH | MOBILE_CARD_LENGTH)
                && digits.bytes().all(|b| b.is_ascii_digit())
        );
        CardId(digits)
    }

    /// Get the card identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the short or the mobile shape.
    #[must_use]
    pub fn kind(&self) -> CardKind {
        if self.0.len() == MOBILE_CARD_LENGTH {
            CardKind::Mobile
        } else {
            CardKind::Short
        }
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for CardId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CardId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq<&str> for CardId {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Serialize for CardId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Static identifier of this gateway, embedded in every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier.
    ///
    /// # Errors
    /// Returns `Error::InvalidDeviceId` if the value is blank after trimming.
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::InvalidDeviceId("must not be empty".to_string()));
        }
        Ok(DeviceId(id.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

/// A successfully normalized scan, ready for delivery.
///
/// Serializes to the collector wire format:
///
/// ```json
/// {"id":"…uuid…","cardId":"000111111","deviceId":"gate-01","timestamp":"2025-05-10T12:46:06Z"}
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    id: Uuid,
    card_id: CardId,
    device_id: DeviceId,
    timestamp: DateTime<Utc>,
}

impl ScanEvent {
    /// Create an event for a card scanned now, with a fresh identifier.
    #[must_use]
    pub fn new(card_id: CardId, device_id: DeviceId) -> Self {
        Self::at(card_id, device_id, Utc::now())
    }

    /// Create an event with an explicit capture time.
    #[must_use]
    pub fn at(card_id: CardId, device_id: DeviceId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            device_id,
            timestamp,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn card_id(&self) -> &CardId {
        &self.card_id
    }

    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
