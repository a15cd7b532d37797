//! # Byte-Pair Scheme
//!
//! Rank-greedy merging over regex-pretokenized words. The pretokenizer
//! expression lists are reproduced verbatim per vocabulary variant;
//! bit-exact compatibility with the trained model depends on them.

use std::collections::BinaryHeap;
use std::ops::Range;

use core::cmp::Reverse;

use strum::{Display, EnumString};

use crate::{
    scheme::{NO_SYMBOL, Symbol, TokenSink, chain_indexes, char_symbols},
    unicode,
    vocab::Vocabulary,
};

/// Named pretokenizer variant, selecting a fixed expression list.
///
/// Model families sharing an expression list are folded together under
/// the first name.
#[derive(Debug, Display, EnumString, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PretokenizerVariant {
    /// GPT-2 style splitting with punctuation and digit-triple passes.
    #[default]
    Default,
    /// Llama 3 (also DBRX, Smaug).
    Llama3,
    /// DeepSeek LLM.
    DeepseekLlm,
    /// DeepSeek Coder.
    DeepseekCoder,
    /// Falcon.
    Falcon,
    /// StarCoder (also Refact, Command-R, SmolLM, CodeShell): digits
    /// split first, one at a time.
    Starcoder,
    /// GPT-2 (also MPT, OLMo, Jais): the bare contraction/letter/digit
    /// run splitter.
    Gpt2,
    /// Qwen 2 (also StableLM 2): Llama 3 minus digit grouping.
    Qwen2,
    /// Poro.
    Poro,
    /// ChatGLM 4.
    Chatglm4,
    /// Viking.
    Viking,
    /// Tekken (Mistral NeMo).
    Tekken,
}

impl PretokenizerVariant {
    /// The ordered expression list for this variant.
    ///
    /// Each expression is applied in turn; both the matches and the gaps
    /// produced by earlier expressions are re-split by later ones.
    pub fn expressions(&self) -> &'static [&'static str] {
        match self {
            Self::Llama3 => &[
                r"(?:'[sS]|'[tT]|'[rR][eE]|'[vV][eE]|'[mM]|'[lL][lL]|'[dD])|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+",
            ],
            Self::DeepseekLlm => &[
                "[\r\n]",
                r"\s?[A-Za-zµÀ-ÖØ-öø-ƺƼ-ƿǄ-ʓʕ-ʯͰ-ͳͶͷͻ-ͽͿΆΈ-ΊΌΎ-ΡΣ-ϵϷ-ҁҊ-ԯԱ-ՖႠ-ჅᎠ-Ᏽᏸ-ᏽᲐ-ᲺᲽ-Ჿᴀ-ᴫᵫ-ᵷᵹ-ᶚḀ-ἕἘ-Ἕἠ-ὅὈ-Ὅὐ-ὗὙὛὝὟ-ώᾀ-ᾴᾶ-ᾼιῂ-ῄῆ-ῌῐ-ΐῖ-Ίῠ-Ῥῲ-ῴῶ-ῼℂℇℊ-ℓℕℙ-ℝℤΩℨK-ℭℯ-ℴℹℼ-ℿⅅ-ⅉⅎↃↄⰀ-ⱻⱾ-ⳤⳫ-ⳮⳲⳳꙀ-ꙭꚀ-ꚛꜢ-ꝯꝱ-ꞇꞋ-ꞎꭰ-ꮿﬀ-ﬆﬓ-ﬗＡ-Ｚａ-ｚ𐐀-𐑏𐒰-𐓓𐓘-𐓻𐲀-𐲲𐳀-𐳲𑢠-𑣟𞤀-𞥃]+",
                r"\s?[!-/:-~！-／：-～‘-‟　-。]+",
                r"\s+$",
                r"[一-龥ࠀ-一가-퟿]+",
                r"\p{N}+",
            ],
            Self::DeepseekCoder => &[
                "[\r\n]",
                r"\s?\p{L}+",
                r"\s?\p{P}+",
                r"[一-龥ࠀ-一가-퟿]+",
                r"\p{N}",
            ],
            Self::Falcon => &[
                r"[\p{P}\$\+<=>\^~\|`]+",
                r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)",
                "[0-9][0-9][0-9]",
            ],
            Self::Starcoder => &[
                r"\p{N}",
                r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)",
            ],
            Self::Gpt2 => &[
                r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)",
            ],
            Self::Qwen2 => &[
                r"(?:'[sS]|'[tT]|'[rR][eE]|'[vV][eE]|'[mM]|'[lL][lL]|'[dD])|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+",
            ],
            Self::Poro => &[r" ?[^(\s|.,!?…。，、।۔،)]+"],
            Self::Chatglm4 => &[
                r"(?:'[sS]|'[tT]|'[rR][eE]|'[vV][eE]|'[mM]|'[lL][lL]|'[dD])|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+",
            ],
            Self::Viking => &[r" ?[^(\s|.,!?…。，、।۔،)]+", r"\p{N}"],
            Self::Tekken => &[
                r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*|\p{N}| ?[^\s\p{L}\p{N}]+[\r\n/]*|\s*[\r\n]+|\s+(?!\S)|\s+",
            ],
            Self::Default => &[
                r"[\p{P}\$\+<=>\^~\|]+",
                r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)",
                r"\p{N}+",
                "[0-9][0-9][0-9]",
            ],
        }
    }
}

/// Split one fragment into pretokenized word ranges.
///
/// Applies each compiled expression in order; every piece produced so
/// far (match or gap) is re-split by the next expression. A regex
/// runtime failure stops splitting the affected piece rather than
/// failing the call.
pub(crate) fn split_words(
    patterns: &[fancy_regex::Regex],
    text: &str,
) -> Vec<Range<usize>> {
    let mut pieces = vec![0..text.len()];

    for pattern in patterns {
        let mut next = Vec::with_capacity(pieces.len());
        for range in pieces {
            let segment = &text[range.clone()];
            let mut last = 0;
            for found in pattern.find_iter(segment) {
                let Ok(found) = found else {
                    break;
                };
                if found.start() > last {
                    next.push(range.start + last..range.start + found.start());
                }
                if found.end() > found.start() {
                    next.push(range.start + found.start()..range.start + found.end());
                }
                last = found.end();
            }
            if last < segment.len() {
                next.push(range.start + last..range.end);
            }
        }
        pieces = next;
    }

    pieces
}

/// Byte-level encode a word: each raw byte becomes the UTF-8 form of
/// its table codepoint, matching how byte-pair token texts are stored.
fn encode_byte_level(
    bytes: &[u8],
    out: &mut Vec<u8>,
) {
    let mut buf = [0u8; 4];
    for &b in bytes {
        let c = unicode::byte_to_codepoint(b);
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }
}

/// Candidate merge, ordered `(rank asc, left index asc)` under
/// [`Reverse`]. The recorded concatenated text detects stale entries.
#[derive(Eq, PartialEq)]
struct MergeEntry {
    rank: u32,
    left: i32,
    right: i32,
    text: Vec<u8>,
}

impl Ord for MergeEntry {
    fn cmp(
        &self,
        other: &Self,
    ) -> core::cmp::Ordering {
        self.rank
            .cmp(&other.rank)
            .then(self.left.cmp(&other.left))
    }
}

impl PartialOrd for MergeEntry {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-fragment byte-pair tokenizer state.
pub struct BytePairTokenizer<'a> {
    vocab: &'a Vocabulary,
    symbols: Vec<Symbol>,
    final_symbols: Vec<Symbol>,
    work_queue: BinaryHeap<Reverse<MergeEntry>>,
}

impl<'a> BytePairTokenizer<'a> {
    /// Create a tokenizer borrowing the vocabulary.
    ///
    /// Panics if the vocabulary's scheme is not byte-pair; that pairing
    /// is a load-time configuration bug.
    pub fn new(vocab: &'a Vocabulary) -> Self {
        assert_eq!(
            vocab.scheme(),
            crate::vocab::Scheme::BytePair,
            "byte-pair tokenizer requires a byte-pair vocabulary"
        );
        Self {
            vocab,
            symbols: Vec::new(),
            final_symbols: Vec::new(),
            work_queue: BinaryHeap::new(),
        }
    }

    /// Tokenize one fragment, appending ids to `output`.
    ///
    /// Words are byte-level encoded after pretokenization; every lookup
    /// below happens in the encoded space the token table uses.
    pub fn tokenize(
        &mut self,
        text: &[u8],
        output: &mut TokenSink,
    ) {
        let mut encoded = Vec::with_capacity(text.len() * 2);
        let mut words = Vec::new();
        match core::str::from_utf8(text) {
            Ok(s) => {
                for range in split_words(&self.vocab.word_patterns, s) {
                    let start = encoded.len();
                    encode_byte_level(&text[range], &mut encoded);
                    words.push(start..encoded.len());
                }
            }
            // pretokenization is codepoint-based; a fragment that is
            // not valid UTF-8 merges as one word
            Err(_) => {
                encode_byte_level(text, &mut encoded);
                words.push(0..encoded.len());
            }
        }
        let bytes = encoded.as_slice();

        let mut final_prev = NO_SYMBOL;
        self.final_symbols.clear();

        for word in words {
            self.work_queue.clear();
            self.symbols.clear();

            let word_bytes = &bytes[word.clone()];
            if self.vocab.flags().ignore_merges && self.vocab.lookup_token(word_bytes).is_some() {
                self.symbols.push(Symbol {
                    prev: NO_SYMBOL,
                    next: NO_SYMBOL,
                    start: word.start,
                    len: word.len(),
                });
            } else {
                let mut word_symbols = char_symbols(word_bytes);
                for symbol in &mut word_symbols {
                    symbol.start += word.start;
                }
                self.symbols = word_symbols;
            }

            for i in 1..self.symbols.len() {
                self.try_add_bigram(bytes, i as i32 - 1, i as i32);
            }

            while let Some(Reverse(entry)) = self.work_queue.pop() {
                let left_sym = self.symbols[entry.left as usize];
                let right_sym = self.symbols[entry.right as usize];

                if left_sym.len == 0 || right_sym.len == 0 {
                    continue;
                }
                // outdated entry: one side has since merged with another
                let current: Vec<u8> = [left_sym.text(bytes), right_sym.text(bytes)].concat();
                if current != entry.text {
                    continue;
                }

                self.symbols[entry.left as usize].len += right_sym.len;
                self.symbols[entry.right as usize].len = 0;
                self.symbols[entry.left as usize].next = right_sym.next;
                if right_sym.next != NO_SYMBOL {
                    self.symbols[right_sym.next as usize].prev = entry.left;
                }

                let left_prev = self.symbols[entry.left as usize].prev;
                let left_next = self.symbols[entry.left as usize].next;
                self.try_add_bigram(bytes, left_prev, entry.left);
                self.try_add_bigram(bytes, entry.left, left_next);
            }

            // append surviving symbols to the global chain in order
            for index in 0..self.symbols.len() {
                let mut symbol = self.symbols[index];
                if symbol.len == 0 {
                    continue;
                }
                symbol.prev = final_prev;
                symbol.next = NO_SYMBOL;
                if final_prev != NO_SYMBOL {
                    self.final_symbols[final_prev as usize].next = self.final_symbols.len() as i32;
                }
                self.final_symbols.push(symbol);
                final_prev = self.final_symbols.len() as i32 - 1;
            }
        }

        for index in chain_indexes(&self.final_symbols).collect::<Vec<_>>() {
            let symbol = self.final_symbols[index];
            if symbol.len == 0 {
                continue;
            }
            let text = symbol.text(bytes);
            match self.vocab.lookup_token(text) {
                Some(id) => output.push(id),
                None => {
                    // single-byte fallback; bytes without a single-byte
                    // token are dropped (known gap in byte-level-less
                    // vocabularies)
                    for &byte in text {
                        if let Some(id) = self.vocab.lookup_token(&[byte]) {
                            output.push(id);
                        }
                    }
                }
            }
        }
    }

    fn try_add_bigram(
        &mut self,
        bytes: &[u8],
        left: i32,
        right: i32,
    ) {
        if left == NO_SYMBOL || right == NO_SYMBOL {
            return;
        }

        let left_text = self.symbols[left as usize].text(bytes);
        let right_text = self.symbols[right as usize].text(bytes);

        let Some(rank) = self.vocab.merge_rank(left_text, right_text) else {
            return;
        };

        self.work_queue.push(Reverse(MergeEntry {
            rank,
            left,
            right,
            text: [left_text, right_text].concat(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::{TokenAttrs, TokenId},
        vocab::{Scheme, VocabularyBuilder, Vocabulary},
    };

    fn compile(variant: PretokenizerVariant) -> Vec<fancy_regex::Regex> {
        variant
            .expressions()
            .iter()
            .map(|e| fancy_regex::Regex::new(e).unwrap())
            .collect()
    }

    fn words(
        variant: PretokenizerVariant,
        text: &str,
    ) -> Vec<&str> {
        split_words(&compile(variant), text)
            .into_iter()
            .map(|r| &text[r])
            .collect()
    }

    #[test]
    fn test_gpt2_word_split() {
        assert_eq!(
            words(PretokenizerVariant::Gpt2, "Hello there, world!"),
            vec!["Hello", " there", ",", " world", "!"],
        );
        // no digit grouping in this variant; the run stays one word
        assert_eq!(
            words(PretokenizerVariant::Gpt2, "it's 1234"),
            vec!["it", "'s", " 1234"],
        );
    }

    #[test]
    fn test_llama3_digit_triples() {
        assert_eq!(
            words(PretokenizerVariant::Llama3, "12345"),
            vec!["123", "45"],
        );
        assert_eq!(
            words(PretokenizerVariant::Llama3, "I'LL go"),
            vec!["I", "'LL", " go"],
        );
    }

    #[test]
    fn test_starcoder_single_digits() {
        assert_eq!(
            words(PretokenizerVariant::Starcoder, "a12"),
            vec!["a", "1", "2"],
        );
    }

    #[test]
    fn test_trailing_whitespace_lookahead() {
        // `\s+(?!\S)` keeps the last pre-word space attached to the word
        assert_eq!(
            words(PretokenizerVariant::Gpt2, "a  b "),
            vec!["a", " ", " b", " "],
        );
    }

    fn test_vocab() -> (Vocabulary, Vec<TokenId>) {
        let mut builder = VocabularyBuilder::new(Scheme::BytePair);
        let ids = vec![
            builder.push_token("h", 0.0, TokenAttrs::NORMAL),
            builder.push_token("e", 0.0, TokenAttrs::NORMAL),
            builder.push_token("l", 0.0, TokenAttrs::NORMAL),
            builder.push_token("o", 0.0, TokenAttrs::NORMAL),
            builder.push_token("he", 0.0, TokenAttrs::NORMAL),
            builder.push_token("ll", 0.0, TokenAttrs::NORMAL),
            builder.push_token("hell", 0.0, TokenAttrs::NORMAL),
            builder.push_token("hello", 0.0, TokenAttrs::NORMAL),
        ];
        builder.push_merge("h", "e");
        builder.push_merge("l", "l");
        builder.push_merge("he", "ll");
        builder.push_merge("hell", "o");
        (
            builder.with_pretokenizer(PretokenizerVariant::Gpt2).build().unwrap(),
            ids,
        )
    }

    #[test]
    fn test_rank_greedy_merge() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        BytePairTokenizer::new(&vocab).tokenize(b"hello", &mut output);
        assert_eq!(output, vec![ids[7]]);
    }

    #[test]
    fn test_unmergeable_falls_back_to_singles() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        BytePairTokenizer::new(&vocab).tokenize(b"eh", &mut output);
        // no "e"+"h" merge rule exists
        assert_eq!(output, vec![ids[1], ids[0]]);
    }

    #[test]
    fn test_uncovered_bytes_dropped() {
        let (vocab, ids) = test_vocab();
        let mut output = Vec::new();
        BytePairTokenizer::new(&vocab).tokenize(b"hz", &mut output);
        // 'z' has no single-byte token and is silently dropped
        assert_eq!(output, vec![ids[0]]);
    }

    #[test]
    fn test_determinism() {
        let (vocab, _) = test_vocab();
        let mut first = Vec::new();
        let mut second = Vec::new();
        BytePairTokenizer::new(&vocab).tokenize(b"hello hello", &mut first);
        BytePairTokenizer::new(&vocab).tokenize(b"hello hello", &mut second);
        assert_eq!(first, second);
    }
}
