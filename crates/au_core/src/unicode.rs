//! Unicode validation and normalization for user-supplied text.
//!
//! All free text entering a workspace document passes through
//! [`validate_and_clean_unicode`] before any mutation: input is normalized
//! to NFC and scanned for disallowed code points. Single-line fields
//! (aliases, titles) reject all control characters; multi-line fields
//! (descriptions, markdown comments) additionally admit TAB, LF and CR.

use unicode_normalization::UnicodeNormalization;
use unicode_properties::{GeneralCategoryGroup, UnicodeGeneralCategory};

use crate::error::{AuError, Result};

/// Whether a scalar is part of the always-allowed set: printable Unicode
/// (letters, marks, numbers, punctuation, symbols) plus U+0020 SPACE.
///
/// An allowlist of general categories, so that format, private-use and
/// unassigned code points (zero-width joiners, BOMs, soft hyphens and the
/// like) are rejected rather than slipping through invisibly.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    matches!(
        c.general_category_group(),
        GeneralCategoryGroup::Letter
            | GeneralCategoryGroup::Mark
            | GeneralCategoryGroup::Number
            | GeneralCategoryGroup::Punctuation
            | GeneralCategoryGroup::Symbol
    )
}

/// Validate a byte string as UTF-8 and then clean it.
///
/// Entry point for content arriving as raw bytes (e.g. markdown comment
/// bodies); fails with an encoding error before any normalization.
pub fn validate_and_clean_bytes(input: &[u8], allow_multiline: bool) -> Result<String> {
    let s = std::str::from_utf8(input)
        .map_err(|_| AuError::invalid("text", "contains invalid utf8 bytes"))?;
    validate_and_clean_unicode(s, allow_multiline)
}

/// Normalize `input` to NFC and reject disallowed code points.
///
/// Returns the normalized string, or an error naming the byte position of
/// the first offending scalar. Idempotent on accepted input.
pub fn validate_and_clean_unicode(input: &str, allow_multiline: bool) -> Result<String> {
    let output: String = input.nfc().collect();

    for (ind, c) in output.char_indices() {
        let allowed = is_printable(c) || (allow_multiline && matches!(c, '\t' | '\n' | '\r'));
        if !allowed {
            return Err(AuError::invalid(
                "text",
                format!("disallowed character at position {ind}"),
            ));
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_text() {
        assert_eq!(
            validate_and_clean_unicode("hello world", false).unwrap(),
            "hello world"
        );
    }

    #[test]
    fn accepts_unicode_letters_and_symbols() {
        for input in ["héllo wörld", "日本語のテキスト", "emoji ☺ and € signs"] {
            assert!(validate_and_clean_unicode(input, false).is_ok());
        }
    }

    #[test]
    fn normalizes_to_nfc() {
        // 'e' followed by U+0301 COMBINING ACUTE ACCENT composes to U+00E9
        let decomposed = "Caf\u{0065}\u{0301}";
        let out = validate_and_clean_unicode(decomposed, false).unwrap();
        assert_eq!(out, "Caf\u{00e9}");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = validate_and_clean_unicode("Caf\u{0065}\u{0301} ☺", true).unwrap();
        let twice = validate_and_clean_unicode(&once, true).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_newline_in_single_line_mode() {
        let err = validate_and_clean_unicode("line one\nline two", false).unwrap_err();
        assert!(err.to_string().contains("position 8"), "got: {err}");
    }

    #[test]
    fn allows_newline_tab_and_cr_in_multiline_mode() {
        let input = "line one\n\tline two\r\n";
        assert_eq!(
            validate_and_clean_unicode(input, true).unwrap(),
            input.to_string()
        );
    }

    #[test]
    fn rejects_other_control_characters_even_in_multiline_mode() {
        assert!(validate_and_clean_unicode("null \u{0000} byte", true).is_err());
        assert!(validate_and_clean_unicode("bell \u{0007}", true).is_err());
        assert!(validate_and_clean_unicode("escape \u{001b}[0m", true).is_err());
    }

    #[test]
    fn rejects_invisible_format_characters() {
        // Cf: zero width space, zero width joiner, BOM, soft hyphen
        assert!(validate_and_clean_unicode("zero\u{200b}width", true).is_err());
        assert!(validate_and_clean_unicode("join\u{200d}er", true).is_err());
        assert!(validate_and_clean_unicode("\u{feff}bom", true).is_err());
        assert!(validate_and_clean_unicode("soft\u{00ad}hyphen", true).is_err());
    }

    #[test]
    fn rejects_private_use_and_unassigned_code_points() {
        assert!(validate_and_clean_unicode("private \u{e000}", true).is_err());
        assert!(validate_and_clean_unicode("unassigned \u{0378}", true).is_err());
    }

    #[test]
    fn rejects_invalid_utf8_bytes() {
        let err = validate_and_clean_bytes(&[0x66, 0x6f, 0xff, 0xfe], false).unwrap_err();
        assert!(err.to_string().contains("utf8"));
    }
}
