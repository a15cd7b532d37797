//! # WordPiece Scheme
//!
//! NFD normalization and lowercasing, punctuation/CJK isolation, then
//! greedy longest-match against the token table. A word that cannot be
//! fully covered maps to the unknown sentinel as a whole; no partial
//! emission.

use crate::{scheme::TokenSink, unicode, vocab::Vocabulary};

/// Per-fragment wordpiece tokenizer.
pub struct WordPieceTokenizer<'a> {
    vocab: &'a Vocabulary,
}

impl<'a> WordPieceTokenizer<'a> {
    /// Create a tokenizer borrowing the vocabulary.
    ///
    /// Panics if the vocabulary's scheme is not wordpiece; that pairing
    /// is a load-time configuration bug.
    pub fn new(vocab: &'a Vocabulary) -> Self {
        assert_eq!(
            vocab.scheme(),
            crate::vocab::Scheme::WordPiece,
            "wordpiece tokenizer requires a wordpiece vocabulary"
        );
        Self { vocab }
    }

    /// Tokenize one fragment, appending ids to `output`.
    ///
    /// Panics if the vocabulary declares no unk sentinel; wordpiece has
    /// no other degradation path.
    pub fn tokenize(
        &self,
        text: &[u8],
        output: &mut TokenSink,
    ) {
        let Some(unk) = self.vocab.specials().unk else {
            panic!("wordpiece tokenization requires an unk sentinel");
        };

        // malformed bytes decode to U+FFFD, which preprocessing drops
        let text = String::from_utf8_lossy(text);
        for word in preprocess(&text) {
            let mut prefixed = Vec::with_capacity(word.len() + unicode::SPACE_SENTINEL.len());
            prefixed.extend_from_slice(unicode::SPACE_SENTINEL);
            prefixed.extend_from_slice(word.as_bytes());

            let n = prefixed.len();
            let word_start = output.len();
            let mut i = 0;
            while i < n {
                let mut matched = false;
                // longest candidate first
                let mut j = n.min(i + self.vocab.max_token_len() + 1);
                while j > i {
                    if let Some(id) = self.vocab.lookup_token(&prefixed[i..j]) {
                        output.push(id);
                        matched = true;
                        i = j;
                        break;
                    }
                    j -= 1;
                }
                if !matched {
                    // no partial coverage; the whole word becomes unk
                    output.truncate(word_start);
                    break;
                }
            }

            if output.len() == word_start {
                output.push(unk);
            }
        }
    }
}

/// Split a fragment into scan words.
///
/// NFD-decomposes and lowercases, drops NUL, U+FFFD and category-C
/// codepoints, breaks on whitespace, and isolates punctuation, ASCII
/// symbols and CJK ideographs into single-character words.
fn preprocess(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();

    for c in unicode::nfd_codepoints(text) {
        if c.is_whitespace() {
            if !current.is_empty() {
                words.push(core::mem::take(&mut current));
            }
            continue;
        }
        if c == '\0' || c == '\u{FFFD}' || unicode::is_category_c(c) {
            continue;
        }

        let isolated = unicode::is_punctuation(c)
            || (c.is_ascii() && unicode::is_symbol(c))
            || unicode::is_cjk_ideograph(c);
        if isolated {
            if !current.is_empty() {
                words.push(core::mem::take(&mut current));
            }
            words.push(unicode::lowercase(c).collect());
        } else {
            current.extend(unicode::lowercase(c));
        }
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::{TokenAttrs, TokenId},
        vocab::{Scheme, SpecialIds, Vocabulary, VocabularyBuilder},
    };

    fn test_vocab() -> (Vocabulary, Vec<TokenId>) {
        let mut builder = VocabularyBuilder::new(Scheme::WordPiece);
        let ids = vec![
            builder.push_token("[UNK]", 0.0, TokenAttrs::UNKNOWN),
            builder.push_token("\u{2581}hello", 0.0, TokenAttrs::NORMAL),
            builder.push_token("\u{2581}wor", 0.0, TokenAttrs::NORMAL),
            builder.push_token("ld", 0.0, TokenAttrs::NORMAL),
            builder.push_token("\u{2581}中", 0.0, TokenAttrs::NORMAL),
        ];
        let vocab = builder
            .with_specials(SpecialIds {
                unk: Some(ids[0]),
                ..SpecialIds::default()
            })
            .build()
            .unwrap();
        (vocab, ids)
    }

    #[test]
    fn test_preprocess() {
        assert_eq!(preprocess("Hello World"), vec!["hello", "world"]);
        assert_eq!(preprocess("don't"), vec!["don", "'", "t"]);
        assert_eq!(preprocess("中中b"), vec!["中", "中", "b"]);
        assert_eq!(preprocess("  \t"), Vec::<String>::new());
    }

    #[test]
    fn test_greedy_longest_match() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        WordPieceTokenizer::new(&vocab).tokenize(b"Hello world", &mut output);
        assert_eq!(output, vec![ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn test_whole_word_unknown() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        // "wor" and "ld" match but the trailing "x" does not; the whole
        // word degrades, not just the tail
        WordPieceTokenizer::new(&vocab).tokenize(b"worldx", &mut output);
        assert_eq!(output, vec![ids[0]]);
    }

    #[test]
    fn test_cjk_isolation() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        WordPieceTokenizer::new(&vocab).tokenize("中中".as_bytes(), &mut output);
        assert_eq!(output, vec![ids[4], ids[4]]);
    }

    #[test]
    #[should_panic(expected = "wordpiece vocabulary")]
    fn test_rejects_mismatched_scheme() {
        let mut builder = VocabularyBuilder::new(Scheme::BytePair);
        builder.push_token("hi", 0.0, TokenAttrs::NORMAL);
        let vocab = builder.build().unwrap();
        let _ = WordPieceTokenizer::new(&vocab);
    }

    #[test]
    #[should_panic(expected = "unk sentinel")]
    fn test_missing_unk_panics() {
        let mut builder = VocabularyBuilder::new(Scheme::WordPiece);
        builder.push_token("x", 0.0, TokenAttrs::NORMAL);
        let vocab = builder.build().unwrap();
        WordPieceTokenizer::new(&vocab).tokenize(b"x", &mut Vec::new());
    }
}
