//! # Special-Token Fragmenter
//!
//! Pre-pass that carves raw input around vocabulary-declared special
//! tokens before any scheme runs, so that a multi-codepoint special
//! token is never split by pretokenization or double-counted.
//!
//! Fragments reference half-open byte ranges of the original input;
//! nothing is copied here.

use core::ops::Range;

use crate::{
    types::{TokenAttrs, TokenId},
    unicode::is_c_space,
    vocab::Vocabulary,
};

/// One piece of the fragmented input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A raw-text byte range of the original input, still to be
    /// tokenized by the active scheme.
    Span(Range<usize>),
    /// A special token matched verbatim; replaces its own text.
    Token(TokenId),
}

/// Split `text` around the vocabulary's special tokens.
///
/// Tokens are matched in the vocabulary's declared order (longest text
/// first); each token repeatedly claims its left-most occurrence within
/// the spans carved so far. With `parse_special == false`, control and
/// unknown tokens are skipped but user-defined tokens still match.
///
/// Concatenating the produced spans and token texts in order
/// reconstructs `text` byte-for-byte, except around tokens with strip
/// attributes, which drop adjacent whitespace.
///
/// ## Returns
/// The ordered fragment list; empty input yields an empty list.
pub fn fragment(
    vocab: &Vocabulary,
    text: &str,
    parse_special: bool,
) -> Vec<Fragment> {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return Vec::new();
    }

    let mut fragments = vec![Fragment::Span(0..bytes.len())];

    for &special_id in vocab.special_cache() {
        let entry = vocab.entry(special_id);

        if !parse_special
            && entry
                .attrs
                .intersects(TokenAttrs::CONTROL | TokenAttrs::UNKNOWN)
        {
            continue;
        }
        if entry.text.is_empty() {
            continue;
        }

        let mut carved = Vec::with_capacity(fragments.len());
        for frag in fragments {
            match frag {
                Fragment::Token(id) => carved.push(Fragment::Token(id)),
                Fragment::Span(range) => {
                    carve_span(bytes, range, special_id, entry, &mut carved);
                }
            }
        }
        fragments = carved;
    }

    fragments
}

/// Repeatedly split one raw span around occurrences of a single special
/// token, honoring its strip attributes.
fn carve_span(
    bytes: &[u8],
    range: Range<usize>,
    special_id: TokenId,
    entry: &crate::vocab::TokenEntry,
    out: &mut Vec<Fragment>,
) {
    let token_text = entry.text.as_slice();
    let mut rest = range;

    loop {
        let found = bytes[rest.clone()]
            .windows(token_text.len())
            .position(|w| w == token_text);
        let Some(pos) = found else {
            if !rest.is_empty() {
                out.push(Fragment::Span(rest));
            }
            return;
        };

        let match_start = rest.start + pos;
        let match_end = match_start + token_text.len();

        // left remainder, shrunk over trailing whitespace for lstrip
        let mut left_end = match_start;
        if entry.attrs.intersects(TokenAttrs::LSTRIP) {
            while left_end > rest.start && is_c_space(bytes[left_end - 1]) {
                left_end -= 1;
            }
        }
        if left_end > rest.start {
            out.push(Fragment::Span(rest.start..left_end));
        }

        out.push(Fragment::Token(special_id));

        // right remainder, shrunk over leading whitespace for rstrip
        let mut right_start = match_end;
        if entry.attrs.intersects(TokenAttrs::RSTRIP) {
            while right_start < rest.end && is_c_space(bytes[right_start]) {
                right_start += 1;
            }
        }
        if right_start >= rest.end {
            return;
        }
        rest = right_start..rest.end;
    }
}
