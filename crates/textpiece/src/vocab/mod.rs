//! # Vocabulary
//!
//! The immutable per-model token table plus everything derived from it
//! at load time: the text→id index, merge ranks, the special-token
//! fragmentation cache, compiled pretokenizer patterns, the unigram
//! model, and the optional id→piece cache.
//!
//! A [`Vocabulary`] is built once through [`VocabularyBuilder`] and never
//! mutated afterwards; tokenize/detokenize calls borrow it shared, so a
//! single instance serves arbitrarily many threads.

pub mod builder;

use strum::{Display, EnumString};

use crate::{
    errors::Result,
    scheme::{bytepair::PretokenizerVariant, unigram::UnigramModel},
    types::{TokenAttrs, TokenId, TokenScore, TpHashMap},
};

#[doc(inline)]
pub use builder::VocabularyBuilder;

/// The tokenization scheme a vocabulary was trained with.
#[derive(Debug, Display, EnumString, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// No scheme; tokenize/detokenize calls are invalid.
    #[default]
    None,
    /// SentencePiece-style score-greedy character-pair merging.
    CharPair,
    /// Rank-greedy byte-pair merging with regex pretokenization.
    BytePair,
    /// Greedy longest-match wordpiece.
    WordPiece,
    /// Viterbi unigram-LM segmentation.
    Unigram,
}

/// One row of the token table.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEntry {
    /// The token's byte string.
    pub text: Vec<u8>,
    /// Log probability (unigram) or merge priority (char-pair).
    pub score: TokenScore,
    /// Attribute bits.
    pub attrs: TokenAttrs,
}

/// Named sentinel-token slots.
///
/// Every slot is optional; whether an absent slot is an error depends on
/// the [`VocabFlags`] that reference it, checked at first use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecialIds {
    /// Beginning of sequence.
    pub bos: Option<TokenId>,
    /// End of sequence.
    pub eos: Option<TokenId>,
    /// Unknown-token placeholder.
    pub unk: Option<TokenId>,
    /// Padding.
    pub pad: Option<TokenId>,
    /// Classifier token (wordpiece).
    pub cls: Option<TokenId>,
    /// Separator token (wordpiece).
    pub sep: Option<TokenId>,
    /// Fill-in-middle prefix.
    pub prefix: Option<TokenId>,
    /// Fill-in-middle middle.
    pub middle: Option<TokenId>,
    /// Fill-in-middle suffix.
    pub suffix: Option<TokenId>,
    /// End of turn.
    pub eot: Option<TokenId>,
}

/// Behavior flags carried by the model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocabFlags {
    /// Insert the bos sentinel when tokenizing with `add_special`.
    pub add_bos: bool,
    /// Insert the eos sentinel when tokenizing with `add_special`.
    pub add_eos: bool,
    /// Prefix text with a space before char-pair/unigram tokenization.
    pub add_space_prefix: bool,
    /// Unigram: append rather than prepend the space prefix.
    pub treat_space_as_suffix: bool,
    /// Unigram: collapse runs of spaces during normalization.
    pub remove_extra_whitespace: bool,
    /// Replace spaces with the U+2581 sentinel during normalization.
    pub escape_whitespace: bool,
    /// Byte-pair: skip merging for words that are already whole tokens.
    pub ignore_merges: bool,
    /// Run the cosmetic space cleanup pass when detokenizing.
    pub clean_spaces_on_decode: bool,
}

impl Default for VocabFlags {
    fn default() -> Self {
        Self {
            add_bos: false,
            add_eos: false,
            add_space_prefix: true,
            treat_space_as_suffix: false,
            remove_extra_whitespace: false,
            escape_whitespace: true,
            ignore_merges: false,
            clean_spaces_on_decode: false,
        }
    }
}

/// Immutable per-model vocabulary.
///
/// Read-only after [`VocabularyBuilder::build`]; safe to share across
/// threads without locking.
#[derive(Debug)]
pub struct Vocabulary {
    pub(crate) scheme: Scheme,
    pub(crate) entries: Vec<TokenEntry>,
    pub(crate) text_to_id: TpHashMap<Vec<u8>, TokenId>,
    /// Left text → right text → rank. Nested so the hot merge loop can
    /// look up borrowed slices without building an owned pair key.
    pub(crate) merge_ranks: TpHashMap<Vec<u8>, TpHashMap<Vec<u8>, u32>>,
    pub(crate) specials: SpecialIds,
    pub(crate) flags: VocabFlags,

    /// Ids matched verbatim during fragmentation, longest text first.
    pub(crate) special_cache: Vec<TokenId>,
    /// Optional precomputed id→piece table; fully populated at build.
    pub(crate) piece_cache: Option<Vec<Vec<u8>>>,
    pub(crate) max_token_len: usize,
    /// Compiled pretokenizer expressions (byte-pair only).
    pub(crate) word_patterns: Vec<fancy_regex::Regex>,
    pub(crate) pretokenizer: PretokenizerVariant,
    pub(crate) unigram: Option<UnigramModel>,
}

impl Vocabulary {
    /// The vocabulary's tokenization scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The pretokenizer variant (meaningful for byte-pair only).
    pub fn pretokenizer(&self) -> PretokenizerVariant {
        self.pretokenizer
    }

    /// Number of token entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the token table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The table row for `id`.
    ///
    /// Panics if `id` is out of range; callers hold ids produced by this
    /// vocabulary.
    pub fn entry(
        &self,
        id: TokenId,
    ) -> &TokenEntry {
        &self.entries[id as usize]
    }

    /// The attribute bits for `id`.
    pub fn attrs(
        &self,
        id: TokenId,
    ) -> TokenAttrs {
        self.entry(id).attrs
    }

    /// The raw text for `id`.
    pub fn token_text(
        &self,
        id: TokenId,
    ) -> &[u8] {
        &self.entry(id).text
    }

    /// The score for `id`.
    pub fn token_score(
        &self,
        id: TokenId,
    ) -> TokenScore {
        self.entry(id).score
    }

    /// Look up the id for a byte string, if present.
    ///
    /// Duplicate texts resolve to the first-inserted entry.
    pub fn lookup_token(
        &self,
        text: &[u8],
    ) -> Option<TokenId> {
        self.text_to_id.get(text).copied()
    }

    /// Look up the merge rank for an adjacent pair of texts.
    ///
    /// Lower ranks merge earlier. Only meaningful for byte-pair
    /// vocabularies.
    pub fn merge_rank(
        &self,
        left: &[u8],
        right: &[u8],
    ) -> Option<u32> {
        self.merge_ranks.get(left)?.get(right).copied()
    }

    /// The named sentinel slots.
    pub fn specials(&self) -> &SpecialIds {
        &self.specials
    }

    /// The behavior flags.
    pub fn flags(&self) -> &VocabFlags {
        &self.flags
    }

    /// Ids matched verbatim during fragmentation, in match order.
    pub fn special_cache(&self) -> &[TokenId] {
        &self.special_cache
    }

    /// Longest token text, in bytes.
    pub fn max_token_len(&self) -> usize {
        self.max_token_len
    }

    /// True if `id` terminates generation (eos or eot).
    pub fn is_eog(
        &self,
        id: TokenId,
    ) -> bool {
        self.specials.eos == Some(id) || self.specials.eot == Some(id)
    }

    /// The token covering a single raw byte.
    ///
    /// Char-pair and unigram vocabularies use `<0xHH>` byte tokens with a
    /// single-character fallback; byte-pair and wordpiece vocabularies
    /// use the byte-level codepoint table.
    ///
    /// ## Returns
    /// The covering token id, or [`TextpieceError::ByteNotCovered`] for
    /// vocabularies without byte-level coverage.
    pub fn byte_to_token(
        &self,
        byte: u8,
    ) -> Result<TokenId> {
        let missing = || crate::errors::TextpieceError::ByteNotCovered { byte };
        match self.scheme {
            Scheme::CharPair | Scheme::Unigram => {
                const HEX: &[u8; 16] = b"0123456789ABCDEF";
                let tagged = [
                    b'<',
                    b'0',
                    b'x',
                    HEX[(byte >> 4) as usize],
                    HEX[(byte & 15) as usize],
                    b'>',
                ];
                self.lookup_token(&tagged)
                    .or_else(|| self.lookup_token(&[byte]))
                    .ok_or_else(missing)
            }
            Scheme::BytePair | Scheme::WordPiece => {
                let mut buf = [0u8; 4];
                let utf8 = crate::unicode::byte_to_codepoint(byte).encode_utf8(&mut buf);
                self.lookup_token(utf8.as_bytes()).ok_or_else(missing)
            }
            Scheme::None => panic!("byte_to_token called on a vocabulary with no scheme"),
        }
    }

    /// Decode a `<0xHH>` byte token back to its byte value.
    pub(crate) fn token_to_byte(
        &self,
        id: TokenId,
    ) -> Option<u8> {
        let text = self.token_text(id);
        if text.len() == 6 && text.starts_with(b"<0x") && text.ends_with(b">") {
            let hex = core::str::from_utf8(&text[3..5]).ok()?;
            u8::from_str_radix(hex, 16).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_display() {
        assert_eq!(Scheme::BytePair.to_string(), "BytePair");
        assert_eq!("Unigram".parse::<Scheme>().unwrap(), Scheme::Unigram);
        assert_eq!(Scheme::default(), Scheme::None);
    }

    #[test]
    fn test_byte_coverage_roundtrip() {
        // tagged byte tokens, the char-pair/unigram convention
        let mut builder = VocabularyBuilder::new(Scheme::CharPair);
        for byte in 0..=255u8 {
            builder.push_token(format!("<0x{byte:02X}>"), 0.0, TokenAttrs::BYTE);
        }
        let tagged = builder.build().unwrap();

        // byte-level codepoint tokens, the byte-pair convention
        let mut builder = VocabularyBuilder::new(Scheme::BytePair);
        for byte in 0..=255u8 {
            let mut utf8 = [0u8; 4];
            let text = crate::unicode::byte_to_codepoint(byte).encode_utf8(&mut utf8);
            builder.push_token(text.as_bytes(), 0.0, TokenAttrs::NORMAL);
        }
        let byte_level = builder.build().unwrap();

        let mut buf = [0u8; 4];
        for vocab in [&tagged, &byte_level] {
            for byte in 0..=255u8 {
                let id = vocab.byte_to_token(byte).unwrap();
                let n = vocab.token_to_piece(id, &mut buf, 0, false);
                assert_eq!((n, buf[0]), (1, byte), "byte {byte:#04x}");
            }
        }
    }

    #[test]
    fn test_byte_not_covered() {
        let mut builder = VocabularyBuilder::new(Scheme::CharPair);
        builder.push_token("<0x41>", 0.0, TokenAttrs::BYTE);
        let vocab = builder.build().unwrap();
        assert!(vocab.byte_to_token(b'A').is_ok());
        assert!(matches!(
            vocab.byte_to_token(b'B'),
            Err(crate::errors::TextpieceError::ByteNotCovered { byte: b'B' }),
        ));
    }

    #[test]
    fn test_vocabulary_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Vocabulary>();
    }

    #[test]
    fn test_flag_defaults() {
        let flags = VocabFlags::default();
        assert!(flags.add_space_prefix);
        assert!(flags.escape_whitespace);
        assert!(!flags.add_bos);
        assert!(!flags.clean_spaces_on_decode);
    }
}
