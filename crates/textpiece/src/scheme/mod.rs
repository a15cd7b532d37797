//! # Scheme Tokenizers
//!
//! One module per tokenization algorithm. Each tokenizer consumes one
//! raw-text fragment at a time and appends token ids; the dispatcher in
//! [`crate::tokenizer`] owns fragment iteration and sentinel handling.

pub mod bytepair;
pub mod charpair;
pub mod unigram;
pub mod wordpiece;

use crate::types::TokenId;

/// Sentinel handle for "no neighbor" in symbol chains.
pub(crate) const NO_SYMBOL: i32 = -1;

/// One node of a doubly-linked symbol chain.
///
/// Symbols live in a dense arena and link by index; a merge grows the
/// left symbol's `len`, zeroes the right one's, and relinks neighbors in
/// O(1). `start`/`len` index the fragment's byte text.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Symbol {
    pub prev: i32,
    pub next: i32,
    pub start: usize,
    pub len: usize,
}

impl Symbol {
    /// The symbol's current byte text within `bytes`.
    #[inline]
    pub fn text<'a>(
        &self,
        bytes: &'a [u8],
    ) -> &'a [u8] {
        &bytes[self.start..self.start + self.len]
    }
}

/// Split fragment bytes into one symbol per UTF-8 character, linked in
/// order. Malformed sequences become single-byte symbols.
pub(crate) fn char_symbols(bytes: &[u8]) -> Vec<Symbol> {
    let mut symbols = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let len = crate::unicode::utf8_len(bytes[offset]).min(bytes.len() - offset);
        let index = symbols.len() as i32;
        symbols.push(Symbol {
            prev: index - 1,
            next: if offset + len == bytes.len() {
                NO_SYMBOL
            } else {
                index + 1
            },
            start: offset,
            len,
        });
        offset += len;
    }
    symbols
}

/// Walk a symbol chain from its head, yielding live symbol indexes.
pub(crate) fn chain_indexes(symbols: &[Symbol]) -> impl Iterator<Item = usize> + '_ {
    let mut cursor = if symbols.is_empty() { NO_SYMBOL } else { 0 };
    core::iter::from_fn(move || {
        if cursor == NO_SYMBOL {
            return None;
        }
        let index = cursor as usize;
        cursor = symbols[index].next;
        Some(index)
    })
}

/// Shared output type for the per-fragment tokenizers.
pub(crate) type TokenSink = Vec<TokenId>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_symbols() {
        let bytes = "a\u{00e9}b".as_bytes();
        let symbols = char_symbols(bytes);
        assert_eq!(symbols.len(), 3);
        assert_eq!(symbols[0].text(bytes), b"a");
        assert_eq!(symbols[1].text(bytes), "\u{00e9}".as_bytes());
        assert_eq!(symbols[2].text(bytes), b"b");
        assert_eq!(symbols[0].prev, NO_SYMBOL);
        assert_eq!(symbols[2].next, NO_SYMBOL);

        assert_eq!(chain_indexes(&symbols).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_char_symbols_truncated_tail() {
        // lead byte promising 3 bytes, only 1 available
        let bytes = &[b'x', 0xE2];
        let symbols = char_symbols(bytes);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[1].len, 1);
    }
}
