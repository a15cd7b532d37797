//! # Unicode Service
//!
//! Thin, pure wrappers over the external Unicode crates
//! (`unicode-general-category`, `unicode-normalization`), plus the
//! byte-level codepoint table used by byte-pair vocabularies.
//!
//! The tokenization schemes never classify or normalize codepoints
//! themselves; everything routes through this module.

use std::sync::OnceLock;

use unicode_general_category::{GeneralCategory, get_general_category};
use unicode_normalization::UnicodeNormalization;

use crate::types::TpHashMap;

/// UTF-8 encoding of U+FFFD REPLACEMENT CHARACTER.
pub const REPLACEMENT: &[u8] = "\u{FFFD}".as_bytes();

/// UTF-8 encoding of U+2581 LOWER ONE EIGHTH BLOCK, the whitespace sentinel.
pub const SPACE_SENTINEL: &[u8] = "\u{2581}".as_bytes();

/// Expected length of a UTF-8 sequence, judged from its first byte.
///
/// Continuation and invalid lead bytes report 1 so malformed input
/// advances byte by byte.
#[inline]
pub fn utf8_len(first_byte: u8) -> usize {
    const LOOKUP: [usize; 16] = [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 3, 4];
    LOOKUP[(first_byte >> 4) as usize]
}

/// Decode the codepoint starting at `offset`, if the bytes form a valid
/// UTF-8 sequence.
///
/// ## Returns
/// `Some((codepoint, consumed_bytes))` on success, `None` on malformed input.
pub fn next_codepoint(
    bytes: &[u8],
    offset: usize,
) -> Option<(char, usize)> {
    let rest = bytes.get(offset..)?;
    let first = *rest.first()?;
    let len = utf8_len(first).min(rest.len());
    let s = core::str::from_utf8(rest.get(..len)?).ok()?;
    let c = s.chars().next()?;
    Some((c, c.len_utf8()))
}

/// NFD-decompose `text` into a codepoint sequence.
pub fn nfd_codepoints(text: &str) -> impl Iterator<Item = char> + '_ {
    text.nfd()
}

/// Lowercase a single codepoint.
///
/// May expand to multiple codepoints for a handful of scripts.
pub fn lowercase(c: char) -> impl Iterator<Item = char> {
    c.to_lowercase()
}

/// True for codepoints in the category-C groups (control, format,
/// surrogate, private use, unassigned).
pub fn is_category_c(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
    )
}

/// True for codepoints in the punctuation groups.
pub fn is_punctuation(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::ConnectorPunctuation
            | GeneralCategory::DashPunctuation
            | GeneralCategory::OpenPunctuation
            | GeneralCategory::ClosePunctuation
            | GeneralCategory::InitialPunctuation
            | GeneralCategory::FinalPunctuation
            | GeneralCategory::OtherPunctuation
    )
}

/// True for codepoints in the symbol groups.
pub fn is_symbol(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::CurrencySymbol
            | GeneralCategory::ModifierSymbol
            | GeneralCategory::MathSymbol
            | GeneralCategory::OtherSymbol
    )
}

/// True for CJK ideograph codepoints, using the ranges BERT-style
/// wordpiece tokenizers isolate.
pub fn is_cjk_ideograph(c: char) -> bool {
    let cpt = c as u32;
    (0x04E00..=0x09FFF).contains(&cpt)
        || (0x03400..=0x04DBF).contains(&cpt)
        || (0x20000..=0x2A6DF).contains(&cpt)
        || (0x2A700..=0x2B73F).contains(&cpt)
        || (0x2B740..=0x2B81F).contains(&cpt)
        // the lower bound matches the HF implementation, not the block start
        || (0x2B920..=0x2CEAF).contains(&cpt)
        || (0x0F900..=0x0FAFF).contains(&cpt)
        || (0x2F800..=0x2FA1F).contains(&cpt)
}

/// True for the C-locale `isspace` set used during fragment stripping.
#[inline]
pub fn is_c_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0B | 0x0C | b'\r')
}

fn byte_codepoint_tables() -> &'static ([char; 256], TpHashMap<char, u8>) {
    static TABLES: OnceLock<([char; 256], TpHashMap<char, u8>)> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut forward = ['\0'; 256];
        let mut reverse = TpHashMap::default();
        let mut shifted = 0u32;
        for byte in 0..=255u8 {
            let printable = matches!(byte, 0x21..=0x7E | 0xA1..=0xAC | 0xAE..=0xFF);
            let c = if printable {
                char::from_u32(byte as u32).unwrap()
            } else {
                let c = char::from_u32(0x100 + shifted).unwrap();
                shifted += 1;
                c
            };
            forward[byte as usize] = c;
            reverse.insert(c, byte);
        }
        (forward, reverse)
    })
}

/// Map a raw byte to its byte-level vocabulary codepoint.
///
/// Printable Latin-1 bytes map to themselves; the rest are shifted into
/// the `U+0100` range, exactly as byte-level BPE vocabularies expect.
pub fn byte_to_codepoint(byte: u8) -> char {
    byte_codepoint_tables().0[byte as usize]
}

/// Invert [`byte_to_codepoint`].
pub fn codepoint_to_byte(c: char) -> Option<u8> {
    byte_codepoint_tables().1.get(&c).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_len() {
        assert_eq!(utf8_len(b'a'), 1);
        assert_eq!(utf8_len(0xC3), 2);
        assert_eq!(utf8_len(0xE2), 3);
        assert_eq!(utf8_len(0xF0), 4);
        // continuation byte
        assert_eq!(utf8_len(0x81), 1);
    }

    #[test]
    fn test_next_codepoint() {
        let bytes = "a\u{2581}b".as_bytes();
        assert_eq!(next_codepoint(bytes, 0), Some(('a', 1)));
        assert_eq!(next_codepoint(bytes, 1), Some(('\u{2581}', 3)));
        assert_eq!(next_codepoint(bytes, 4), Some(('b', 1)));
        assert_eq!(next_codepoint(bytes, 5), None);
        // truncated sequence
        assert_eq!(next_codepoint(&bytes[1..3], 0), None);
        // bare continuation byte
        assert_eq!(next_codepoint(&[0x81], 0), None);
    }

    #[test]
    fn test_byte_codepoint_roundtrip() {
        for byte in 0..=255u8 {
            let c = byte_to_codepoint(byte);
            assert_eq!(codepoint_to_byte(c), Some(byte), "byte {byte:#04x}");
        }
        assert_eq!(byte_to_codepoint(b'!'), '!');
        assert_eq!(byte_to_codepoint(b' '), '\u{120}');
        assert_eq!(codepoint_to_byte('\u{2581}'), None);
    }

    #[test]
    fn test_categories() {
        assert!(is_punctuation(','));
        assert!(!is_punctuation('a'));
        assert!(is_symbol('$'));
        assert!(is_category_c('\u{0007}'));
        assert!(is_cjk_ideograph('中'));
        assert!(!is_cjk_ideograph('a'));
        assert!(is_c_space(0x0B));
        assert!(!is_c_space(b'x'));
    }
}
