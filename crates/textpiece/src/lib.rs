//! # textpiece
//!
//! Text tokenization for LLM runtimes: the four vocabulary schemes
//! shipped inside GGUF-style model files (SentencePiece char-pair,
//! byte-level BPE, WordPiece, and unigram-LM), plus the surrounding
//! machinery a runtime needs: special-token fragmentation, sentinel
//! insertion, and buffer-contract detokenization.
//!
//! A [`Vocabulary`] is built once from a model's token table via
//! [`VocabularyBuilder`], then serves tokenize and detokenize calls from
//! any number of threads:
//!
//! ```
//! use textpiece::{Scheme, TokenAttrs, VocabularyBuilder};
//!
//! let mut builder = VocabularyBuilder::new(Scheme::CharPair);
//! for byte in 0..=255u8 {
//!     builder.push_token(format!("<0x{byte:02X}>"), 0.0, TokenAttrs::BYTE);
//! }
//! builder.push_token("\u{2581}h", -2.0, TokenAttrs::NORMAL);
//! let hi = builder.push_token("\u{2581}hi", -1.0, TokenAttrs::NORMAL);
//! let vocab = builder.build().unwrap();
//!
//! let tokens = vocab.tokenize("hi", false, false).unwrap();
//! assert_eq!(tokens, vec![hi]);
//! assert_eq!(vocab.detokenize_to_string(&tokens, false, false), "hi");
//! ```
//!
//! Encoding matches llama.cpp's tokenizer behavior per scheme, including
//! its pretokenizer regex tables ([`PretokenizerVariant`]) and its
//! precompiled-charsmap normalizer for unigram models.

#![warn(missing_docs, unused)]

mod charsmap;
mod detokenize;
pub mod errors;
pub mod fragment;
pub mod scheme;
mod tokenizer;
mod trie;
pub mod types;
pub mod unicode;
pub mod vocab;

pub use errors::{Result, TextpieceError};
pub use fragment::{Fragment, fragment};
pub use scheme::bytepair::PretokenizerVariant;
pub use types::{TokenAttrs, TokenId, TokenScore};
pub use vocab::{Scheme, SpecialIds, TokenEntry, VocabFlags, Vocabulary, VocabularyBuilder};
