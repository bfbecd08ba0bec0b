//! Card payload normalization.
//!
//! Readers emit heterogeneous strings for the same card population. The
//! [`CardNormalizer`] classifies a scan line and produces the canonical
//! [`CardId`], trying each format in a fixed priority order and returning the
//! first match:
//!
//! 1. [`CardFormat::Delimited`]: track-style data split on `=`
//! 2. [`CardFormat::Mobile`]: 16 digits starting with the issuer prefix
//! 3. [`CardFormat::Short`]: 1 to 9 digits
//!
//! Anything else is "no match". Malformed scans are expected noise (partial
//! reads, key-mashing), so the normalizer never errors or panics on input.
//!
//! # Examples
//!
//! ```
//! use cardgate_core::CardNormalizer;
//!
//! let normalizer = CardNormalizer::new();
//!
//! let card = normalizer.normalize("1570=900000001=00=6017700001111110").unwrap();
//! assert_eq!(card.as_str(), "000111111");
//!
//! let card = normalizer.normalize("6017700010001111").unwrap();
//! assert_eq!(card.as_str(), "6017700010001111");
//!
//! assert!(normalizer.normalize("not-a-card").is_none());
//! ```

use crate::{
    CardId, Result,
    constants::{
        CHECK_DIGIT_LENGTH, DELIMITED_HEADER_LENGTH, FIELD_SEPARATOR, ISSUER_PREFIX,
        ISSUER_PREFIX_LENGTH, MOBILE_CARD_LENGTH, SHORT_CARD_LENGTH,
    },
    error::Error,
};

/// Payload format a scan line was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardFormat {
    /// Track-style fields separated by `=`.
    Delimited,
    /// Long numeric form, passed through unchanged.
    Mobile,
    /// Short numeric form, zero-padded.
    Short,
}

impl std::fmt::Display for CardFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delimited => write!(f, "delimited"),
            Self::Mobile => write!(f, "mobile"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Classifies scan lines and produces canonical card identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardNormalizer {
    issuer_prefix: String,
}

impl CardNormalizer {
    /// Create a normalizer for the default issuer prefix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            issuer_prefix: ISSUER_PREFIX.to_string(),
        }
    }

    /// Create a normalizer for a different card population.
    ///
    /// # Errors
    /// Returns `Error::InvalidIssuerPrefix` unless the prefix is exactly six
    /// decimal digits.
    pub fn with_issuer_prefix(prefix: &str) -> Result<Self> {
        if prefix.len() != ISSUER_PREFIX_LENGTH || !is_decimal(prefix) {
            return Err(Error::InvalidIssuerPrefix(format!(
                "expected {ISSUER_PREFIX_LENGTH} digits, got '{prefix}'"
            )));
        }
        Ok(Self {
            issuer_prefix: prefix.to_string(),
        })
    }

    #[must_use]
    pub fn issuer_prefix(&self) -> &str {
        &self.issuer_prefix
    }

    /// Normalize a scan line into a card identifier.
    ///
    /// Returns `None` when the line matches no known format.
    #[must_use]
    pub fn normalize(&self, line: &str) -> Option<CardId> {
        self.classify(line).map(|(_, card)| card)
    }

    /// Normalize a scan line and report which format matched.
    #[must_use]
    pub fn classify(&self, line: &str) -> Option<(CardFormat, CardId)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(card) = self.delimited(line) {
            return Some((CardFormat::Delimited, card));
        }
        if let Some(card) = self.mobile(line) {
            return Some((CardFormat::Mobile, card));
        }
        pad_short(line).map(|card| (CardFormat::Short, card))
    }

    fn delimited(&self, line: &str) -> Option<CardId> {
        if !line.contains(FIELD_SEPARATOR) {
            return None;
        }

        // Only the first field carrying the prefix is considered.
        let field = line
            .split(FIELD_SEPARATOR)
            .find(|field| field.starts_with(self.issuer_prefix.as_str()))?;

        // Byte offsets below are only valid on ASCII.
        if !field.is_ascii() || field.len() <= DELIMITED_HEADER_LENGTH + CHECK_DIGIT_LENGTH {
            return None;
        }

        let number = &field[DELIMITED_HEADER_LENGTH..field.len() - CHECK_DIGIT_LENGTH];
        pad_short(number)
    }

    fn mobile(&self, line: &str) -> Option<CardId> {
        if line.len() == MOBILE_CARD_LENGTH
            && is_decimal(line)
            && line.starts_with(self.issuer_prefix.as_str())
        {
            Some(CardId::from_canonical(line.to_string()))
        } else {
            None
        }
    }
}

impl Default for CardNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero-pad 1 to 9 decimal digits to the canonical width.
fn pad_short(digits: &str) -> Option<CardId> {
    if digits.is_empty() || digits.len() > SHORT_CARD_LENGTH || !is_decimal(digits) {
        return None;
    }
    Some(CardId::from_canonical(format!(
        "{digits:0>width$}",
        width = SHORT_CARD_LENGTH
    )))
}

fn is_decimal(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}
