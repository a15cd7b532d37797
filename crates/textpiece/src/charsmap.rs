//! # Precompiled Charsmap
//!
//! Read-only view over the normalizer blob shipped inside unigram model
//! files: an XOR-compressed compact double array (XCDA) of prefix
//! replacement rules, followed by the null-terminated replacement
//! strings themselves.
//!
//! The blob is untrusted model data, so every index computed from it is
//! bounds-checked; reads that only a corrupt blob can produce surface
//! as [`TextpieceError`] instead of a panic.
//!
//! See Shunsuke Kanda (2018), "Space- and Time-Efficient String
//! Dictionaries", for the XCDA layout. Each bit-packed entry holds:
//! - BASE in bits 10..=30, shifted left by 8 when bit 9 is set,
//! - LCHECK in bits 0..=7,
//! - LEAF in bit 8,
//! - bit 31 marks entries holding replacement-string indexes.

use crate::errors::{Result, TextpieceError};

/// Unpack the BASE field of an XCDA entry.
#[inline]
fn unpack_base(packed: u32) -> u32 {
    (packed >> 10) << ((packed & (1 << 9)) >> 6)
}

/// Parsed view of a precompiled charsmap blob.
#[derive(Debug, Clone)]
pub struct PrecompiledCharsmap {
    xcda: Vec<u32>,
    replacements: Vec<u8>,
}

impl PrecompiledCharsmap {
    /// Parse and structurally validate a charsmap blob.
    ///
    /// ## Arguments
    /// * `blob` - the raw bytes, laid out as
    ///   `[u32 xcda_len][xcda entries][replacement strings]`.
    ///
    /// ## Returns
    /// The parsed charsmap, or a structured error for a truncated blob.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let header: [u8; 4] = blob
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(TextpieceError::MalformedCharsmap {
                reason: "blob shorter than the 4-byte header",
            })?;
        let xcda_len = u32::from_le_bytes(header) as usize;

        if 4 + xcda_len >= blob.len() {
            return Err(TextpieceError::MalformedCharsmap {
                reason: "XCDA section overruns the blob",
            });
        }

        let xcda = blob[4..4 + xcda_len]
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .collect();
        let replacements = blob[4 + xcda_len..].to_vec();

        Ok(Self { xcda, replacements })
    }

    fn node(
        &self,
        index: usize,
    ) -> Result<u32> {
        self.xcda
            .get(index)
            .copied()
            .ok_or(TextpieceError::CharsmapOutOfBounds {
                index,
                len: self.xcda.len(),
            })
    }

    fn value(
        &self,
        index: usize,
    ) -> Result<u32> {
        let packed = self.node(index)?;
        Ok(packed & ((1u32 << 31) - 1))
    }

    /// Find the longest prefix of `input` with a registered replacement.
    ///
    /// Walks the double array from the root; each step XORs the child
    /// byte into the node index and verifies it via LCHECK. A child
    /// index landing outside the array means the byte has no child,
    /// not a broken blob; the match simply ends there. The structured
    /// error is reserved for the replacement-offset read of a matched
    /// leaf.
    ///
    /// ## Returns
    /// `Some((matched_len, replacement_bytes))` for the longest match,
    /// `None` when no prefix matches.
    pub fn longest_match<'a>(
        &'a self,
        input: &[u8],
    ) -> Result<Option<(usize, &'a [u8])>> {
        let mut longest_len = 0usize;
        let mut longest_value = 0usize;

        let Some(&root) = self.xcda.first() else {
            return Ok(None);
        };
        let mut node_index = unpack_base(root) as usize;
        for (depth, &c) in input.iter().enumerate() {
            if c == 0 {
                break;
            }
            node_index ^= c as usize;
            let Some(&packed) = self.xcda.get(node_index) else {
                break;
            };
            // LCHECK mismatch: this byte is not a child of the node
            if packed & ((1 << 31) | 0xff) != c as u32 {
                break;
            }
            let is_leaf = (packed >> 8) & 1 == 1;
            node_index ^= unpack_base(packed) as usize;
            if is_leaf {
                longest_len = depth + 1;
                longest_value = self.value(node_index)? as usize;
            }
        }

        if longest_len == 0 {
            return Ok(None);
        }

        let tail = self.replacements.get(longest_value..).ok_or(
            TextpieceError::CharsmapOutOfBounds {
                index: longest_value,
                len: self.replacements.len(),
            },
        )?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(Some((longest_len, &tail[..end])))
    }
}
