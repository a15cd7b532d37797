//! # Detokenize
//!
//! The decode entry points on [`Vocabulary`]: single-token pieces with
//! the caller-buffer contract, full-sequence decoding, and the cosmetic
//! space cleanup pass some byte-pair models expect.

use crate::{
    types::{TokenAttrs, TokenId},
    unicode,
    vocab::{Scheme, Vocabulary},
};

/// Copy a piece into `buf`, skipping up to `lstrip` leading spaces.
///
/// Returns the copied length, or the negated required length when the
/// buffer is too small.
fn try_copy(
    mut piece: &[u8],
    buf: &mut [u8],
    lstrip: usize,
) -> i32 {
    let mut stripped = 0;
    while stripped < lstrip && piece.first() == Some(&b' ') {
        piece = &piece[1..];
        stripped += 1;
    }
    if piece.len() > buf.len() {
        return -(piece.len() as i32);
    }
    buf[..piece.len()].copy_from_slice(piece);
    piece.len() as i32
}

/// Replace every U+2581 whitespace sentinel with a space byte.
fn unescape_whitespace(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut offset = 0;
    while offset < bytes.len() {
        if bytes[offset..].starts_with(unicode::SPACE_SENTINEL) {
            out.push(b' ');
            offset += unicode::SPACE_SENTINEL.len();
        } else {
            out.push(bytes[offset]);
            offset += 1;
        }
    }
    out
}

/// Invert the byte-level codepoint encoding of a byte-pair token.
///
/// Codepoints outside the byte-level table render as a
/// `[UNK_BYTE_0x..<token text>]` marker instead of being dropped.
fn decode_byte_level(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut offset = 0;
    while offset < text.len() {
        match unicode::next_codepoint(text, offset) {
            Some((c, len)) => {
                match unicode::codepoint_to_byte(c) {
                    Some(byte) => out.push(byte),
                    None => {
                        out.extend_from_slice(b"[UNK_BYTE_0x");
                        let mut utf8 = [0u8; 4];
                        for b in c.encode_utf8(&mut utf8).as_bytes() {
                            out.extend_from_slice(format!("{b:02x}").as_bytes());
                        }
                        out.extend_from_slice(text);
                        out.push(b']');
                    }
                }
                offset += len;
            }
            None => {
                out.push(text[offset]);
                offset += 1;
            }
        }
    }
    out
}

/// Cosmetic cleanup over decoded text, in place.
///
/// Three passes: drop spaces before sentence punctuation, tighten
/// `" ' "` runs, and drop the space before the contraction suffixes
/// `'s`, `'m`, `'re`, `'ve` (but not `'t`, `'d`, `'ll`).
///
/// Returns the cleaned length.
fn clean_spaces(text: &mut [u8]) -> usize {
    // pass 1: spaces before ? ! . ,
    let total1 = text.len();
    let mut total = usize::from(total1 != 0);
    for i in 1..total1 {
        let x = text[i];
        if text[i - 1] == b' ' && matches!(x, b'?' | b'!' | b'.' | b',') {
            total -= 1;
        }
        text[total] = x;
        total += 1;
    }

    // pass 2: a lone apostrophe between spaces keeps neither
    let total2 = total;
    total = usize::from(total2 != 0);
    let mut i = 1;
    while i < total2 {
        let x = text[i];
        if x == b'\'' && i + 1 < total2 && text[i - 1] == b' ' && text[i + 1] == b' ' {
            total -= 1;
            text[total] = x;
            total += 1;
            i += 2;
            continue;
        }
        text[total] = x;
        total += 1;
        i += 1;
    }

    // pass 3: contraction suffixes
    let total3 = total;
    total = usize::from(total3 != 0);
    for i in 1..total3 {
        let x = text[i];
        if x == b'\'' && text[i - 1] == b' ' && i + 1 < total3 {
            let x1 = text[i + 1];
            if x1 == b's' || x1 == b'm' {
                total -= 1;
            } else if i + 2 < total3 {
                let x2 = text[i + 2];
                if (x1 == b'r' && x2 == b'e') || (x1 == b'v' && x2 == b'e') {
                    total -= 1;
                }
            }
        }
        text[total] = x;
        total += 1;
    }

    total
}

impl Vocabulary {
    /// The decoded piece for one token, computed fresh.
    ///
    /// Control-class tokens and user-defined tokens decode to their raw
    /// text; normal tokens invert the scheme's text encoding; byte
    /// tokens decode to their byte. Anything else decodes empty.
    ///
    /// Panics when called on a vocabulary with no scheme.
    pub(crate) fn piece_bytes(
        &self,
        id: TokenId,
    ) -> Vec<u8> {
        let entry = self.entry(id);
        let verbatim =
            TokenAttrs::UNKNOWN | TokenAttrs::CONTROL | TokenAttrs::USER_DEFINED;

        match self.scheme {
            Scheme::CharPair | Scheme::WordPiece | Scheme::Unigram => {
                if entry.attrs.intersects(verbatim) {
                    entry.text.clone()
                } else if entry.attrs.intersects(TokenAttrs::NORMAL) {
                    unescape_whitespace(&entry.text)
                } else if entry.attrs.intersects(TokenAttrs::BYTE) {
                    self.token_to_byte(id).map(|b| vec![b]).unwrap_or_default()
                } else {
                    Vec::new()
                }
            }
            Scheme::BytePair => {
                if entry.attrs.intersects(verbatim) {
                    entry.text.clone()
                } else if entry.attrs.intersects(TokenAttrs::NORMAL) {
                    decode_byte_level(&entry.text)
                } else {
                    Vec::new()
                }
            }
            Scheme::None => panic!("piece requested from a vocabulary with no scheme"),
        }
    }

    /// Decode one token into `buf`.
    ///
    /// ## Arguments
    /// * `lstrip` - drop up to this many leading spaces from the piece.
    /// * `special` - render control and unknown tokens; with `false`
    ///   they decode to nothing.
    ///
    /// ## Returns
    /// The written length; `0` for out-of-range ids and suppressed
    /// tokens; the negated required length when `buf` is too small, with
    /// nothing written.
    pub fn token_to_piece(
        &self,
        id: TokenId,
        buf: &mut [u8],
        lstrip: usize,
        special: bool,
    ) -> i32 {
        if id as usize >= self.len() {
            return 0;
        }
        if !special
            && self
                .attrs(id)
                .intersects(TokenAttrs::UNKNOWN | TokenAttrs::CONTROL)
        {
            return 0;
        }

        if let Some(cache) = &self.piece_cache {
            return try_copy(&cache[id as usize], buf, lstrip);
        }
        try_copy(&self.piece_bytes(id), buf, lstrip)
    }

    /// Decode a token sequence into `buf`.
    ///
    /// ## Arguments
    /// * `remove_special` - strip a leading bos and trailing eos when the
    ///   vocabulary flags added them.
    /// * `unparse_special` - render control and unknown tokens.
    ///
    /// ## Returns
    /// The written length, or the negated required length when `buf` is
    /// too small (the cleanup pass does not run in that case).
    pub fn detokenize(
        &self,
        tokens: &[TokenId],
        buf: &mut [u8],
        remove_special: bool,
        unparse_special: bool,
    ) -> i32 {
        let mut tokens = tokens;
        // the first piece drops the space the encoder prefixed
        let mut remove_space = self.flags.add_space_prefix;

        if remove_special && self.flags.add_bos {
            if let (Some(&first), Some(bos)) = (tokens.first(), self.specials.bos) {
                if first == bos {
                    remove_space = false;
                    tokens = &tokens[1..];
                }
            }
        }
        if remove_special && self.flags.add_eos {
            if let (Some(&last), Some(eos)) = (tokens.last(), self.specials.eos) {
                if last == eos {
                    tokens = &tokens[..tokens.len() - 1];
                }
            }
        }

        let mut written = 0usize;
        let mut required = 0i64;
        for &token in tokens {
            let lstrip = usize::from(remove_space);
            let n = self.token_to_piece(token, &mut buf[written..], lstrip, unparse_special);
            remove_space = false;
            if n < 0 {
                required += i64::from(-n);
            } else {
                written += n as usize;
                required += i64::from(n);
            }
        }

        if required as usize > buf.len() {
            return -(required as i32);
        }

        let mut total = written;
        if self.flags.clean_spaces_on_decode {
            total = clean_spaces(&mut buf[..total]);
        }
        total as i32
    }

    /// Decode a token sequence into an owned string.
    ///
    /// Invalid UTF-8 in the decoded bytes is replaced, not an error.
    pub fn detokenize_to_string(
        &self,
        tokens: &[TokenId],
        remove_special: bool,
        unparse_special: bool,
    ) -> String {
        let mut buf = vec![0u8; tokens.len() * self.max_token_len.max(1)];
        let mut n = self.detokenize(tokens, &mut buf, remove_special, unparse_special);
        if n < 0 {
            buf.resize((-n) as usize, 0);
            n = self.detokenize(tokens, &mut buf, remove_special, unparse_special);
        }
        buf.truncate(n.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{SpecialIds, VocabFlags, VocabularyBuilder};

    #[test]
    fn test_clean_spaces_punctuation() {
        let mut text = b"hello , world !".to_vec();
        let n = clean_spaces(&mut text);
        assert_eq!(&text[..n], b"hello, world!");
    }

    #[test]
    fn test_clean_spaces_apostrophes() {
        // 's tightens, 't does not
        let mut text = b"it 's can 't".to_vec();
        let n = clean_spaces(&mut text);
        assert_eq!(&text[..n], b"it's can 't");

        let mut text = b"we 're we 'll".to_vec();
        let n = clean_spaces(&mut text);
        assert_eq!(&text[..n], b"we're we 'll");
    }

    #[test]
    fn test_clean_spaces_empty() {
        assert_eq!(clean_spaces(&mut []), 0);
    }

    fn spm_vocab() -> (Vocabulary, Vec<TokenId>) {
        let mut builder = VocabularyBuilder::new(crate::vocab::Scheme::CharPair);
        let ids = vec![
            builder.push_token("<s>", 0.0, TokenAttrs::CONTROL),
            builder.push_token("\u{2581}hello", -1.0, TokenAttrs::NORMAL),
            builder.push_token("\u{2581}world", -1.0, TokenAttrs::NORMAL),
            builder.push_token("<0x41>", 0.0, TokenAttrs::BYTE),
        ];
        let vocab = builder
            .with_specials(SpecialIds {
                bos: Some(ids[0]),
                ..SpecialIds::default()
            })
            .with_flags(VocabFlags {
                add_bos: true,
                ..VocabFlags::default()
            })
            .build()
            .unwrap();
        (vocab, ids)
    }

    #[test]
    fn test_token_to_piece_contract() {
        let (vocab, ids) = spm_vocab();
        let mut buf = [0u8; 16];

        let n = vocab.token_to_piece(ids[1], &mut buf, 0, false);
        assert_eq!(n, 6);
        assert_eq!(&buf[..6], b" hello");

        // lstrip drops the leading space
        let n = vocab.token_to_piece(ids[1], &mut buf, 1, false);
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], b"hello");

        // zero-length buffer reports the required size
        let n = vocab.token_to_piece(ids[1], &mut [], 0, false);
        assert_eq!(n, -6);

        // control token suppressed unless special rendering is on
        assert_eq!(vocab.token_to_piece(ids[0], &mut buf, 0, false), 0);
        let n = vocab.token_to_piece(ids[0], &mut buf, 0, true);
        assert_eq!(&buf[..n as usize], b"<s>");

        // byte token
        let n = vocab.token_to_piece(ids[3], &mut buf, 0, false);
        assert_eq!(&buf[..n as usize], b"A");

        // out of range
        assert_eq!(vocab.token_to_piece(9999, &mut buf, 0, false), 0);
    }

    #[test]
    fn test_detokenize_strips_sentinels_and_prefix_space() {
        let (vocab, ids) = spm_vocab();
        let tokens = [ids[0], ids[1], ids[2]];
        let mut buf = [0u8; 32];
        let n = vocab.detokenize(&tokens, &mut buf, true, false);
        // stripping the bos keeps the first piece's leading space
        assert_eq!(&buf[..n as usize], b" hello world");

        let n = vocab.detokenize(&[ids[1], ids[2]], &mut buf, true, false);
        assert_eq!(&buf[..n as usize], b"hello world");
    }

    #[test]
    fn test_detokenize_buffer_too_small() {
        let (vocab, ids) = spm_vocab();
        let tokens = [ids[1], ids[2]];
        let mut buf = [0u8; 4];
        let n = vocab.detokenize(&tokens, &mut buf, true, false);
        assert_eq!(n, -11);

        let mut buf = vec![0u8; 11];
        let n = vocab.detokenize(&tokens, &mut buf, true, false);
        assert_eq!(n, 11);
    }

    #[test]
    fn test_detokenize_to_string() {
        let (vocab, ids) = spm_vocab();
        assert_eq!(
            vocab.detokenize_to_string(&[ids[0], ids[1], ids[2]], true, false),
            " hello world",
        );
        assert_eq!(vocab.detokenize_to_string(&[], true, false), "");
    }

    #[test]
    fn test_piece_cache_matches_fresh_computation() {
        let mut builder = VocabularyBuilder::new(crate::vocab::Scheme::CharPair);
        builder.push_token("\u{2581}hey", -1.0, TokenAttrs::NORMAL);
        builder.push_token("<0x42>", 0.0, TokenAttrs::BYTE);
        let cached = builder.with_piece_cache(true).build().unwrap();

        let mut with_cache = [0u8; 8];
        let mut without = [0u8; 8];
        for id in 0..cached.len() as TokenId {
            let n1 = cached.token_to_piece(id, &mut with_cache, 0, true);
            let n2 = try_copy(&cached.piece_bytes(id), &mut without, 0);
            assert_eq!(n1, n2);
            assert_eq!(with_cache[..n1 as usize], without[..n2 as usize]);
        }
    }

    #[test]
    fn test_decode_byte_level() {
        // 'Ġ' is the byte-level encoding of a space
        let decoded = decode_byte_level("Ġhello".as_bytes());
        assert_eq!(decoded, b" hello");

        // U+2581 is not in the byte-level table
        let decoded = decode_byte_level("\u{2581}".as_bytes());
        let text = String::from_utf8(decoded).unwrap();
        assert_eq!(text, "[UNK_BYTE_0xe29681\u{2581}]");
    }
}
