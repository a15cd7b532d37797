//! # Tokenize Dispatch
//!
//! The public encode entry points on [`Vocabulary`]: fragment the input
//! around special tokens, run the scheme tokenizer over each raw span,
//! and handle sentinel insertion per the vocabulary flags.

use crate::{
    errors::Result,
    fragment::{Fragment, fragment},
    scheme::{
        bytepair::BytePairTokenizer, charpair::CharPairTokenizer, unigram::UnigramTokenizer,
        wordpiece::WordPieceTokenizer,
    },
    types::TokenId,
    unicode,
    vocab::{Scheme, Vocabulary},
};

/// Replace every space byte with the U+2581 whitespace sentinel.
fn escape_whitespace(bytes: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(bytes.len());
    for &b in bytes {
        if b == b' ' {
            escaped.extend_from_slice(unicode::SPACE_SENTINEL);
        } else {
            escaped.push(b);
        }
    }
    escaped
}

impl Vocabulary {
    /// Tokenize `text` into ids.
    ///
    /// ## Arguments
    /// * `add_special` - insert the sentinel tokens the vocabulary flags
    ///   call for (bos/eos, or cls/sep for wordpiece).
    /// * `parse_special` - match control and unknown special tokens
    ///   verbatim in the input; user-defined tokens always match.
    ///
    /// Panics when called on a vocabulary with no scheme, or when a flag
    /// requires a sentinel the vocabulary does not declare.
    pub fn tokenize(
        &self,
        text: &str,
        add_special: bool,
        parse_special: bool,
    ) -> Result<Vec<TokenId>> {
        let fragments = fragment(self, text, parse_special);
        let bytes = text.as_bytes();
        let mut output = Vec::new();

        match self.scheme {
            Scheme::CharPair => {
                let mut session = CharPairTokenizer::new(self);
                let mut is_prev_special = true;

                if add_special && self.flags.add_bos {
                    output.push(self.require_bos());
                    is_prev_special = true;
                }

                for frag in fragments {
                    match frag {
                        Fragment::Token(id) => {
                            output.push(id);
                            is_prev_special = true;
                        }
                        Fragment::Span(range) => {
                            let mut raw = Vec::with_capacity(range.len() + 1);
                            if self.flags.add_space_prefix
                                && (output.is_empty() || is_prev_special)
                            {
                                raw.push(b' ');
                            }
                            raw.extend_from_slice(&bytes[range]);
                            session.tokenize(&escape_whitespace(&raw), &mut output)?;
                            is_prev_special = false;
                        }
                    }
                }

                self.warn_double_bos(add_special, &output);
                if add_special && self.flags.add_eos {
                    output.push(self.require_eos());
                }
            }
            Scheme::BytePair => {
                let mut session = BytePairTokenizer::new(self);

                if add_special && self.flags.add_bos {
                    output.push(self.require_bos());
                }

                for frag in fragments {
                    match frag {
                        Fragment::Token(id) => output.push(id),
                        Fragment::Span(range) => session.tokenize(&bytes[range], &mut output),
                    }
                }

                self.warn_double_bos(add_special, &output);
                if add_special && self.flags.add_eos {
                    output.push(self.require_eos());
                    if output.len() >= 2 && Some(output[output.len() - 2]) == self.specials.eos {
                        log::warn!(
                            "appended an EOS token to input that already ends with one; \
                             the result ends with two EOS tokens"
                        );
                    }
                }
            }
            Scheme::WordPiece => {
                let session = WordPieceTokenizer::new(self);

                if add_special {
                    let Some(cls) = self.specials.cls else {
                        panic!("wordpiece tokenization requires a cls sentinel");
                    };
                    output.push(cls);
                }

                for frag in fragments {
                    match frag {
                        Fragment::Token(id) => output.push(id),
                        Fragment::Span(range) => session.tokenize(&bytes[range], &mut output),
                    }
                }

                if add_special {
                    let Some(sep) = self.specials.sep else {
                        panic!("wordpiece tokenization requires a sep sentinel");
                    };
                    output.push(sep);
                }
            }
            Scheme::Unigram => {
                let session = UnigramTokenizer::new(self);

                if add_special && self.flags.add_bos {
                    output.push(self.require_bos());
                }

                for frag in fragments {
                    match frag {
                        Fragment::Token(id) => output.push(id),
                        Fragment::Span(range) => {
                            session.tokenize(&bytes[range], &mut output)?;
                        }
                    }
                }

                self.warn_double_bos(add_special, &output);
                if add_special && self.flags.add_eos {
                    output.push(self.require_eos());
                }
            }
            Scheme::None => panic!("tokenize called on a vocabulary with no scheme"),
        }

        Ok(output)
    }

    /// Tokenize into a caller-provided buffer.
    ///
    /// ## Returns
    /// The token count on success; if the buffer is too small, the
    /// negated count the call would have produced, with the buffer
    /// contents unspecified.
    pub fn tokenize_into(
        &self,
        text: &str,
        out: &mut [TokenId],
        add_special: bool,
        parse_special: bool,
    ) -> Result<i32> {
        let tokens = self.tokenize(text, add_special, parse_special)?;
        if tokens.len() > out.len() {
            return Ok(-(tokens.len() as i32));
        }
        out[..tokens.len()].copy_from_slice(&tokens);
        Ok(tokens.len() as i32)
    }

    fn require_bos(&self) -> TokenId {
        let Some(bos) = self.specials.bos else {
            panic!("the add_bos flag requires a bos sentinel");
        };
        bos
    }

    fn require_eos(&self) -> TokenId {
        let Some(eos) = self.specials.eos else {
            panic!("the add_eos flag requires an eos sentinel");
        };
        eos
    }

    fn warn_double_bos(
        &self,
        add_special: bool,
        output: &[TokenId],
    ) {
        if add_special
            && self.flags.add_bos
            && output.len() >= 2
            && Some(output[1]) == self.specials.bos
        {
            log::warn!(
                "prepended a BOS token to input that already starts with one; \
                 the result starts with two BOS tokens"
            );
        }
    }
}
