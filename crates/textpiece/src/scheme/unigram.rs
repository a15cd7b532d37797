//! # Unigram Scheme
//!
//! SentencePiece unigram-LM segmentation: a normalizer pass (optionally
//! driven by the model's precompiled charsmap), then a Viterbi search
//! over byte positions that maximizes the summed token log
//! probabilities. Bytes no token covers fall back to the unknown
//! sentinel at a score penalty, and consecutive unknowns collapse into
//! one.

use crate::{
    charsmap::PrecompiledCharsmap,
    errors::Result,
    scheme::TokenSink,
    trie::{ByteTrie, ROOT},
    types::{TokenAttrs, TokenId, TokenScore},
    unicode,
    vocab::{TokenEntry, Vocabulary},
};

/// Score penalty below the worst normal token for uncovered bytes.
const UNKNOWN_PENALTY: TokenScore = 10.0;

/// Load-time unigram state derived from the token table.
#[derive(Debug, Clone)]
pub(crate) struct UnigramModel {
    /// All matchable tokens (normal, user-defined, unused).
    token_trie: ByteTrie,
    /// User-defined tokens only; their raw text bypasses normalization.
    user_trie: ByteTrie,
    charsmap: Option<PrecompiledCharsmap>,
    unknown_score: TokenScore,
}

impl UnigramModel {
    /// Build the tries and normalizer from the raw token table.
    pub(crate) fn build(
        entries: &[TokenEntry],
        charsmap_blob: Option<&[u8]>,
    ) -> Result<Self> {
        let charsmap = charsmap_blob.map(PrecompiledCharsmap::parse).transpose()?;

        let mut token_trie = ByteTrie::default();
        let mut user_trie = ByteTrie::default();
        let mut min_score = TokenScore::MAX;

        for (id, entry) in entries.iter().enumerate() {
            let id = id as TokenId;
            if entry.attrs.intersects(TokenAttrs::NORMAL) {
                min_score = min_score.min(entry.score);
            }
            if entry.attrs.intersects(
                TokenAttrs::NORMAL | TokenAttrs::USER_DEFINED | TokenAttrs::UNUSED,
            ) {
                token_trie.insert(&entry.text, id);
            }
            if entry.attrs.intersects(TokenAttrs::USER_DEFINED) {
                user_trie.insert(&entry.text, id);
            }
        }

        if min_score == TokenScore::MAX {
            // degenerate table with no normal tokens
            min_score = 0.0;
        }

        Ok(Self {
            token_trie,
            user_trie,
            charsmap,
            unknown_score: min_score - UNKNOWN_PENALTY,
        })
    }
}

/// One Viterbi lattice cell: the best-known segmentation ending here.
#[derive(Debug, Clone, Copy)]
struct BestStep {
    token: TokenId,
    input_offset: usize,
    score_sum: TokenScore,
}

/// Per-fragment unigram tokenizer.
pub struct UnigramTokenizer<'a> {
    vocab: &'a Vocabulary,
    model: &'a UnigramModel,
}

impl<'a> UnigramTokenizer<'a> {
    /// Create a tokenizer borrowing the vocabulary.
    ///
    /// Panics unless the vocabulary was built with the unigram scheme.
    pub fn new(vocab: &'a Vocabulary) -> Self {
        let Some(model) = vocab.unigram.as_ref() else {
            panic!("unigram tokenization requires a unigram vocabulary");
        };
        Self { vocab, model }
    }

    /// Tokenize one fragment, appending ids to `output`.
    ///
    /// Panics if the vocabulary declares no unk sentinel.
    pub fn tokenize(
        &self,
        text: &[u8],
        output: &mut TokenSink,
    ) -> Result<()> {
        let Some(unk) = self.vocab.specials().unk else {
            panic!("unigram tokenization requires an unk sentinel");
        };

        let normalized = self.normalize(text)?;
        let size = normalized.len();
        if size == 0 {
            return Ok(());
        }

        let mut best = vec![
            BestStep {
                token: unk,
                input_offset: 0,
                score_sum: -TokenScore::MAX,
            };
            size + 1
        ];
        best[0].score_sum = 0.0;

        let mut input_offset = 0;
        while input_offset < size {
            let n_units = unicode::utf8_len(normalized[input_offset]).min(size - input_offset);
            let current = best[input_offset];
            // whether any matched token covers exactly this codepoint
            let mut codepoint_covered = false;

            let mut node = ROOT;
            let mut prefix_offset = input_offset;
            while prefix_offset < size {
                let Some(next) = self.model.token_trie.child(node, normalized[prefix_offset])
                else {
                    break;
                };
                node = next;
                prefix_offset += 1;

                if let Some(token) = self.model.token_trie.token(node) {
                    codepoint_covered |= prefix_offset - input_offset == n_units;
                    // user-defined tokens score as 0 regardless of table value
                    let token_score = if self.vocab.attrs(token).intersects(TokenAttrs::USER_DEFINED)
                    {
                        0.0
                    } else {
                        f64::from(self.vocab.token_score(token))
                    };
                    let challenger = f64::from(current.score_sum) + token_score;
                    if challenger > f64::from(best[prefix_offset].score_sum) {
                        best[prefix_offset] = BestStep {
                            token,
                            input_offset,
                            score_sum: challenger as TokenScore,
                        };
                    }
                }
            }

            if !codepoint_covered {
                let end = input_offset + n_units;
                let challenger =
                    f64::from(current.score_sum) + f64::from(self.model.unknown_score);
                if challenger > f64::from(best[end].score_sum) {
                    best[end] = BestStep {
                        token: unk,
                        input_offset,
                        score_sum: challenger as TokenScore,
                    };
                }
            }

            input_offset += n_units;
        }

        // backtrack from the end, collapsing consecutive unknowns
        let start = output.len();
        let mut step = best[size];
        let mut prev_unknown = false;
        loop {
            let is_unknown = step.token == unk;
            if !(prev_unknown && is_unknown) {
                output.push(step.token);
            }
            if step.input_offset == 0 {
                break;
            }
            prev_unknown = is_unknown;
            step = best[step.input_offset];
        }
        output[start..].reverse();
        Ok(())
    }

    /// Run the normalizer pass over one fragment.
    ///
    /// Space handling follows the vocabulary flags: the whitespace
    /// sentinel substitution, the optional space prefix or suffix, and
    /// optional collapsing of space runs.
    fn normalize(
        &self,
        bytes: &[u8],
    ) -> Result<Vec<u8>> {
        let flags = self.vocab.flags();
        let space: &[u8] = if flags.escape_whitespace {
            unicode::SPACE_SENTINEL
        } else {
            b" "
        };
        let shall_prepend = !flags.treat_space_as_suffix && flags.add_space_prefix;
        let shall_append = flags.treat_space_as_suffix && flags.add_space_prefix;
        let shall_merge = flags.remove_extra_whitespace;

        let mut normalized = Vec::with_capacity(bytes.len() * 3);
        let mut is_space_prepended = false;
        let mut processing_non_ws = false;

        let mut offset = 0;
        while offset < bytes.len() {
            let (chunk, consumed) = self.normalize_prefix(bytes, offset)?;
            for &c in chunk {
                if c != b' ' {
                    if !processing_non_ws {
                        processing_non_ws = true;
                        if (shall_prepend && !is_space_prepended) || shall_merge {
                            normalized.extend_from_slice(space);
                            is_space_prepended = true;
                        }
                    }
                    normalized.push(c);
                } else {
                    processing_non_ws = false;
                    if !shall_merge {
                        normalized.extend_from_slice(space);
                    }
                }
            }
            offset += consumed;
        }

        if shall_append {
            normalized.extend_from_slice(space);
        }
        Ok(normalized)
    }

    /// Normalize the shortest meaningful prefix at `offset`.
    ///
    /// User-defined token text passes through untouched; otherwise the
    /// precompiled charsmap's longest replacement rule applies; otherwise
    /// a valid UTF-8 sequence passes through; otherwise one malformed
    /// byte becomes U+FFFD.
    ///
    /// ## Returns
    /// `(normalized_bytes, consumed_input_bytes)`.
    fn normalize_prefix<'s>(
        &'s self,
        bytes: &'s [u8],
        offset: usize,
    ) -> Result<(&'s [u8], usize)> {
        let rest = &bytes[offset..];

        let user_len = self.model.user_trie.longest_prefix_len(rest);
        if user_len > 0 {
            return Ok((&rest[..user_len], user_len));
        }

        if let Some(charsmap) = &self.model.charsmap {
            if let Some((len, replacement)) = charsmap.longest_match(rest)? {
                return Ok((replacement, len));
            }
        }

        match unicode::next_codepoint(bytes, offset) {
            Some((_, len)) => Ok((&rest[..len], len)),
            None => Ok((unicode::REPLACEMENT, 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{Scheme, SpecialIds, VocabularyBuilder};

    fn test_vocab() -> (Vocabulary, Vec<TokenId>) {
        let mut builder = VocabularyBuilder::new(Scheme::Unigram);
        let ids = vec![
            builder.push_token("<unk>", 0.0, TokenAttrs::UNKNOWN),
            builder.push_token("\u{2581}", -3.0, TokenAttrs::NORMAL),
            builder.push_token("\u{2581}hello", -5.0, TokenAttrs::NORMAL),
            builder.push_token("\u{2581}he", -2.0, TokenAttrs::NORMAL),
            builder.push_token("llo", -1.5, TokenAttrs::NORMAL),
            builder.push_token("a", -1.0, TokenAttrs::NORMAL),
            builder.push_token("b", -1.0, TokenAttrs::NORMAL),
            builder.push_token("\u{2581}a", -1.0, TokenAttrs::NORMAL),
            builder.push_token("<mask>", 0.0, TokenAttrs::USER_DEFINED),
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
    fn test_viterbi_beats_greedy() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        UnigramTokenizer::new(&vocab)
            .tokenize(b"hello", &mut output)
            .unwrap();
        // "▁he"+"llo" sums to -3.5, better than "▁hello" at -5.0
        assert_eq!(output, vec![ids[3], ids[4]]);
    }

    #[test]
    fn test_consecutive_unknowns_collapse() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        UnigramTokenizer::new(&vocab)
            .tokenize(b"a zz", &mut output)
            .unwrap();
        // both 'z' bytes are uncovered; one unk token results
        assert_eq!(output, vec![ids[7], ids[1], ids[0]]);
    }

    #[test]
    fn test_user_defined_passthrough() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        UnigramTokenizer::new(&vocab)
            .tokenize(b"a<mask>b", &mut output)
            .unwrap();
        assert_eq!(output, vec![ids[7], ids[8], ids[6]]);
    }

    #[test]
    fn test_empty_input() {
        let (vocab, _) = test_vocab();
        let mut output = Vec::new();
        UnigramTokenizer::new(&vocab).tokenize(b"", &mut output).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_normalize_space_handling() {
        let (vocab, _) = test_vocab();
        let tokenizer = UnigramTokenizer::new(&vocab);
        // default flags: prefix space, escape to U+2581
        assert_eq!(
            tokenizer.normalize(b"a b").unwrap(),
            "\u{2581}a\u{2581}b".as_bytes(),
        );
        // inner runs are preserved without remove_extra_whitespace
        assert_eq!(
            tokenizer.normalize(b"a  b").unwrap(),
            "\u{2581}a\u{2581}\u{2581}b".as_bytes(),
        );
    }

    #[test]
    fn test_normalize_merges_extra_whitespace() {
        let mut builder = VocabularyBuilder::new(Scheme::Unigram);
        let unk = builder.push_token("<unk>", 0.0, TokenAttrs::UNKNOWN);
        builder.push_token("a", -1.0, TokenAttrs::NORMAL);
        let vocab = builder
            .with_specials(SpecialIds {
                unk: Some(unk),
                ..SpecialIds::default()
            })
            .with_flags(crate::vocab::VocabFlags {
                remove_extra_whitespace: true,
                ..crate::vocab::VocabFlags::default()
            })
            .build()
            .unwrap();

        let tokenizer = UnigramTokenizer::new(&vocab);
        assert_eq!(
            tokenizer.normalize(b"a  a").unwrap(),
            "\u{2581}a\u{2581}a".as_bytes(),
        );
    }

    #[test]
    fn test_malformed_utf8_replaced() {
        let (vocab, _) = test_vocab();
        let tokenizer = UnigramTokenizer::new(&vocab);
        let normalized = tokenizer.normalize(&[b'a', 0xFF]).unwrap();
        let mut expected = "\u{2581}a".as_bytes().to_vec();
        expected.extend_from_slice(unicode::REPLACEMENT);
        assert_eq!(normalized, expected);
    }
}
