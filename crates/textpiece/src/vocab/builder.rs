//! # Vocabulary Builder

use crate::{
    errors::{Result, TextpieceError},
    scheme::{bytepair::PretokenizerVariant, unigram::UnigramModel},
    types::{TokenAttrs, TokenId, TokenScore, TpHashMap},
    vocab::{Scheme, SpecialIds, TokenEntry, VocabFlags, Vocabulary},
};

/// Builder for [`Vocabulary`].
///
/// Collects the raw table a model loader produces, then derives every
/// read-only cache in [`Self::build`]. Token ids are assigned densely in
/// push order.
#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    scheme: Scheme,
    pretokenizer: PretokenizerVariant,
    entries: Vec<TokenEntry>,
    merges: Vec<(Vec<u8>, Vec<u8>)>,
    specials: SpecialIds,
    flags: VocabFlags,
    precompiled_charsmap: Option<Vec<u8>>,
    build_piece_cache: bool,
}

impl VocabularyBuilder {
    /// Start a builder for the given scheme.
    pub fn new(scheme: Scheme) -> Self {
        Self {
            scheme,
            flags: VocabFlags::default(),
            ..Self::default()
        }
    }

    /// Append a token entry; returns its id.
    pub fn push_token(
        &mut self,
        text: impl Into<Vec<u8>>,
        score: TokenScore,
        attrs: TokenAttrs,
    ) -> TokenId {
        let id = self.entries.len() as TokenId;
        self.entries.push(TokenEntry {
            text: text.into(),
            score,
            attrs,
        });
        id
    }

    /// Append a merge rule; rank is the insertion index (earlier = merged
    /// first). Byte-pair only.
    pub fn push_merge(
        &mut self,
        left: impl Into<Vec<u8>>,
        right: impl Into<Vec<u8>>,
    ) {
        self.merges.push((left.into(), right.into()));
    }

    /// Set the named sentinel slots.
    pub fn with_specials(
        mut self,
        specials: SpecialIds,
    ) -> Self {
        self.specials = specials;
        self
    }

    /// Set the behavior flags.
    pub fn with_flags(
        mut self,
        flags: VocabFlags,
    ) -> Self {
        self.flags = flags;
        self
    }

    /// Set the pretokenizer variant (byte-pair only).
    pub fn with_pretokenizer(
        mut self,
        variant: PretokenizerVariant,
    ) -> Self {
        self.pretokenizer = variant;
        self
    }

    /// Attach a precompiled charsmap blob (unigram only).
    pub fn with_precompiled_charsmap(
        mut self,
        blob: impl Into<Vec<u8>>,
    ) -> Self {
        self.precompiled_charsmap = Some(blob.into());
        self
    }

    /// Precompute the full id→piece cache during [`Self::build`].
    ///
    /// Required before sharing the vocabulary across threads if callers
    /// want the cached decode path; the cache is never filled lazily.
    pub fn with_piece_cache(
        mut self,
        enabled: bool,
    ) -> Self {
        self.build_piece_cache = enabled;
        self
    }

    /// Validate the collected table and derive the read-only caches.
    ///
    /// ## Returns
    /// The finished [`Vocabulary`], or an error for inconsistent data
    /// (out-of-range sentinel ids, malformed charsmap, bad pretokenizer
    /// expressions).
    pub fn build(self) -> Result<Vocabulary> {
        let n_tokens = self.entries.len() as TokenId;
        for (name, slot) in [
            ("bos", self.specials.bos),
            ("eos", self.specials.eos),
            ("unk", self.specials.unk),
            ("pad", self.specials.pad),
            ("cls", self.specials.cls),
            ("sep", self.specials.sep),
            ("prefix", self.specials.prefix),
            ("middle", self.specials.middle),
            ("suffix", self.specials.suffix),
            ("eot", self.specials.eot),
        ] {
            if let Some(id) = slot {
                if id >= n_tokens {
                    return Err(TextpieceError::VocabConflict(format!(
                        "special {name} id {id} out of range ({n_tokens} tokens)"
                    )));
                }
            }
        }

        // first inserted wins on duplicate text
        let mut text_to_id: TpHashMap<Vec<u8>, TokenId> = TpHashMap::default();
        let mut max_token_len = 0;
        for (id, entry) in self.entries.iter().enumerate() {
            text_to_id
                .entry(entry.text.clone())
                .or_insert(id as TokenId);
            max_token_len = max_token_len.max(entry.text.len());
        }

        let mut merge_ranks: TpHashMap<Vec<u8>, TpHashMap<Vec<u8>, u32>> = TpHashMap::default();
        for (rank, (left, right)) in self.merges.into_iter().enumerate() {
            merge_ranks
                .entry(left)
                .or_default()
                .entry(right)
                .or_insert(rank as u32);
        }

        // verbatim-match tokens, longest text first so that no special
        // token can match inside the text of a longer one
        let mut special_cache: Vec<TokenId> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.attrs
                    .intersects(TokenAttrs::CONTROL | TokenAttrs::UNKNOWN | TokenAttrs::USER_DEFINED)
            })
            .map(|(id, _)| id as TokenId)
            .collect();
        special_cache.sort_by(|&a, &b| {
            let (ta, tb) = (&self.entries[a as usize].text, &self.entries[b as usize].text);
            tb.len().cmp(&ta.len()).then(a.cmp(&b))
        });

        let word_patterns = if self.scheme == Scheme::BytePair {
            self.pretokenizer
                .expressions()
                .iter()
                .map(|expr| fancy_regex::Regex::new(expr).map_err(Into::into))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let unigram = if self.scheme == Scheme::Unigram {
            Some(UnigramModel::build(
                &self.entries,
                self.precompiled_charsmap.as_deref(),
            )?)
        } else {
            None
        };

        let mut vocab = Vocabulary {
            scheme: self.scheme,
            entries: self.entries,
            text_to_id,
            merge_ranks,
            specials: self.specials,
            flags: self.flags,
            special_cache,
            piece_cache: None,
            max_token_len,
            word_patterns,
            pretokenizer: self.pretokenizer,
            unigram,
        };

        if self.build_piece_cache {
            let cache = (0..vocab.len() as TokenId)
                .map(|id| vocab.piece_bytes(id))
                .collect();
            vocab.piece_cache = Some(cache);
        }

        Ok(vocab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_text_first_wins() {
        let mut builder = VocabularyBuilder::new(Scheme::CharPair);
        let first = builder.push_token("dup", -1.0, TokenAttrs::NORMAL);
        let second = builder.push_token("dup", -2.0, TokenAttrs::NORMAL);
        assert_ne!(first, second);

        let vocab = builder.build().unwrap();
        assert_eq!(vocab.lookup_token(b"dup"), Some(first));
    }

    #[test]
    fn test_merge_rank_insertion_order() {
        let mut builder = VocabularyBuilder::new(Scheme::BytePair);
        builder.push_merge("a", "b");
        builder.push_merge("ab", "c");
        let vocab = builder.build().unwrap();

        assert_eq!(vocab.merge_rank(b"a", b"b"), Some(0));
        assert_eq!(vocab.merge_rank(b"ab", b"c"), Some(1));
        // the pair is ordered; the reverse is not a rule
        assert_eq!(vocab.merge_rank(b"b", b"a"), None);
    }

    #[test]
    fn test_special_cache_order() {
        let mut builder = VocabularyBuilder::new(Scheme::BytePair);
        let short = builder.push_token("<s>", 0.0, TokenAttrs::CONTROL);
        let long = builder.push_token("<|end|>", 0.0, TokenAttrs::CONTROL);
        let user = builder.push_token("<tool>", 0.0, TokenAttrs::USER_DEFINED);
        builder.push_token("plain", 0.0, TokenAttrs::NORMAL);

        let vocab = builder.build().unwrap();
        assert_eq!(vocab.special_cache(), &[long, user, short]);
    }

    #[test]
    fn test_special_id_out_of_range() {
        let mut builder = VocabularyBuilder::new(Scheme::CharPair);
        builder.push_token("x", 0.0, TokenAttrs::NORMAL);
        let result = builder
            .with_specials(SpecialIds {
                bos: Some(42),
                ..SpecialIds::default()
            })
            .build();
        assert!(matches!(result, Err(TextpieceError::VocabConflict(_))));
    }
}
