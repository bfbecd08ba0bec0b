//! Property-based tests for card normalization.
//!
//! These tests use proptest to generate scan lines and verify that the
//! normalizer's output invariants hold for every input, not just the
//! documented examples.

use cardgate_core::constants::{ISSUER_PREFIX, MOBILE_CARD_LENGTH, SHORT_CARD_LENGTH};
use cardgate_core::{CardFormat, CardNormalizer};
use proptest::prelude::*;

/// Strategy for bare numeric scans of 1-9 digits.
fn short_digits() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9]{1,9}").expect("Failed to create short digits strategy")
}

/// Strategy for fields that never start with the issuer prefix.
fn filler_field() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-5]{0,12}").expect("Failed to create filler field strategy")
}

proptest! {
    /// Property: 1-9 digits always pad to 9 characters and keep their value.
    #[test]
    fn prop_short_form_pads_to_nine(digits in short_digits()) {
        let normalizer = CardNormalizer::new();
        let (format, card) = normalizer.classify(&digits).unwrap();

        prop_assert_eq!(format, CardFormat::Short);
        prop_assert_eq!(card.as_str().len(), SHORT_CARD_LENGTH);
        prop_assert!(card.as_str().ends_with(digits.as_str()));
        prop_assert!(card.as_str()[..SHORT_CARD_LENGTH - digits.len()].bytes().all(|b| b == b'0'));
    }

    /// Property: normalizing a short-form output again returns it unchanged.
    #[test]
    fn prop_short_form_output_is_fixed_point(digits in short_digits()) {
        let normalizer = CardNormalizer::new();
        let card = normalizer.normalize(&digits).unwrap();
        let again = normalizer.normalize(card.as_str()).unwrap();
        prop_assert_eq!(again, card);
    }

    /// Property: the middle span of a prefixed field becomes the card number.
    #[test]
    fn prop_delimited_extracts_middle_span(
        before in filler_field(),
        site in "[0-9]{3}",
        number in short_digits(),
        check in "[0-9]",
    ) {
        let line = format!("{before}={ISSUER_PREFIX}{site}{number}{check}=00");
        let normalizer = CardNormalizer::new();
        let (format, card) = normalizer.classify(&line).unwrap();

        prop_assert_eq!(format, CardFormat::Delimited);
        prop_assert_eq!(card.as_str(), format!("{number:0>9}"));
    }

    /// Property: prefixed 16-digit numbers pass through verbatim.
    #[test]
    fn prop_mobile_form_is_verbatim(rest in "[0-9]{10}") {
        let line = format!("{ISSUER_PREFIX}{rest}");
        let card = CardNormalizer::new().normalize(&line).unwrap();
        prop_assert_eq!(card.as_str(), line.as_str());
    }

    /// Property: output is always 9 digits or 16 prefixed digits, whatever the input.
    #[test]
    fn prop_output_shape_invariant(line in "[0-9=A-Za-z ]{0,40}") {
        if let Some(card) = CardNormalizer::new().normalize(&line) {
            let value = card.as_str();
            prop_assert!(value.bytes().all(|b| b.is_ascii_digit()));
            prop_assert!(
                value.len() == SHORT_CARD_LENGTH
                    || (value.len() == MOBILE_CARD_LENGTH && value.starts_with(ISSUER_PREFIX))
            );
        }
    }

    /// Property: anything containing a letter outside a delimited field never matches.
    #[test]
    fn prop_letters_never_match(digits in "[0-9]{0,8}", letter in "[A-Za-z]") {
        let line = format!("{digits}{letter}");
        prop_assert!(CardNormalizer::new().normalize(&line).is_none());
    }
}
