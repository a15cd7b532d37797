//! # Char-Pair Scheme
//!
//! SentencePiece-style score-greedy merging: adjacent character pairs
//! whose concatenation is a known token compete on `(score desc, left
//! index asc)` until no merge applies. Whitespace escaping has already
//! happened by the time a fragment reaches this tokenizer.

use std::collections::BinaryHeap;

use crate::{
    errors::Result,
    scheme::{NO_SYMBOL, Symbol, TokenSink, chain_indexes, char_symbols},
    types::{TokenScore, TpHashMap},
    vocab::Vocabulary,
};

/// Candidate merge of two adjacent symbols.
///
/// Max-heap priority: higher score first, then the pair appearing
/// earlier in the text. `size` is the recorded combined byte length,
/// used for lazy stale-entry detection on pop.
struct Bigram {
    left: i32,
    right: i32,
    score: TokenScore,
    size: usize,
}

impl PartialEq for Bigram {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.cmp(other) == core::cmp::Ordering::Equal
    }
}

impl Eq for Bigram {}

impl Ord for Bigram {
    fn cmp(
        &self,
        other: &Self,
    ) -> core::cmp::Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(core::cmp::Ordering::Equal)
            .then_with(|| other.left.cmp(&self.left))
    }
}

impl PartialOrd for Bigram {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-fragment char-pair tokenizer state.
pub struct CharPairTokenizer<'a> {
    vocab: &'a Vocabulary,
    symbols: Vec<Symbol>,
    work_queue: BinaryHeap<Bigram>,
    /// Merged text → the symbol pair it was recorded from, for
    /// backtracking resolution of spans that merged through
    /// intermediate tokens.
    rev_merge: TpHashMap<Vec<u8>, (i32, i32)>,
}

impl<'a> CharPairTokenizer<'a> {
    /// Create a tokenizer borrowing the vocabulary.
    ///
    /// Panics if the vocabulary's scheme is not char-pair; that pairing
    /// is a load-time configuration bug.
    pub fn new(vocab: &'a Vocabulary) -> Self {
        assert_eq!(
            vocab.scheme(),
            crate::vocab::Scheme::CharPair,
            "char-pair tokenizer requires a char-pair vocabulary"
        );
        Self {
            vocab,
            symbols: Vec::new(),
            work_queue: BinaryHeap::new(),
            rev_merge: TpHashMap::default(),
        }
    }

    /// Tokenize one fragment, appending ids to `output`.
    pub fn tokenize(
        &mut self,
        text: &[u8],
        output: &mut TokenSink,
    ) -> Result<()> {
        self.symbols = char_symbols(text);
        self.work_queue.clear();
        self.rev_merge.clear();

        for i in 1..self.symbols.len() {
            self.try_add_bigram(text, i as i32 - 1, i as i32);
        }

        while let Some(bigram) = self.work_queue.pop() {
            let left_sym = self.symbols[bigram.left as usize];
            let right_sym = self.symbols[bigram.right as usize];

            // a side was consumed by an earlier merge; stale entry
            if left_sym.len == 0
                || right_sym.len == 0
                || left_sym.len + right_sym.len != bigram.size
            {
                continue;
            }

            // merge the right symbol into the left one
            self.symbols[bigram.left as usize].len += right_sym.len;
            self.symbols[bigram.right as usize].len = 0;
            self.symbols[bigram.left as usize].next = right_sym.next;
            if right_sym.next != NO_SYMBOL {
                self.symbols[right_sym.next as usize].prev = bigram.left;
            }

            let left_prev = self.symbols[bigram.left as usize].prev;
            let left_next = self.symbols[bigram.left as usize].next;
            self.try_add_bigram(text, left_prev, bigram.left);
            self.try_add_bigram(text, bigram.left, left_next);
        }

        for index in chain_indexes(&self.symbols).collect::<Vec<_>>() {
            self.resegment(text, index as i32, output)?;
        }
        Ok(())
    }

    /// Resolve one final chain symbol into output ids.
    ///
    /// Known tokens emit directly; recorded merge results re-resolve
    /// each half through the backtracking map (iteratively, with an
    /// explicit stack); anything else degrades to byte-fallback tokens.
    fn resegment(
        &self,
        bytes: &[u8],
        index: i32,
        output: &mut TokenSink,
    ) -> Result<()> {
        let mut stack = vec![index];
        while let Some(index) = stack.pop() {
            let symbol = self.symbols[index as usize];
            let text = symbol.text(bytes);

            if let Some(id) = self.vocab.lookup_token(text) {
                output.push(id);
                continue;
            }

            if let Some(&(left, right)) = self.rev_merge.get(text) {
                // left resolves first
                stack.push(right);
                stack.push(left);
                continue;
            }

            for &byte in text {
                output.push(self.vocab.byte_to_token(byte)?);
            }
        }
        Ok(())
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

        let left_sym = self.symbols[left as usize];
        let right_sym = self.symbols[right as usize];
        let text = &bytes[left_sym.start..left_sym.start + left_sym.len + right_sym.len];

        let Some(id) = self.vocab.lookup_token(text) else {
            return;
        };
        if id as usize >= self.vocab.len() {
            return;
        }

        self.work_queue.push(Bigram {
            left,
            right,
            score: self.vocab.token_score(id),
            size: text.len(),
        });
        self.rev_merge.insert(text.to_vec(), (left, right));
    }
}
