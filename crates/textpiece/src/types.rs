//! # Common Types

use core::fmt;
use core::ops::BitOr;

/// Token id type.
///
/// Vocabulary entries are indexed densely from zero, so ids double as
/// row indexes into the token table.
pub type TokenId = u32;

/// Token score type.
///
/// Scores are log probabilities for unigram vocabularies, and merge
/// priorities for char-pair vocabularies.
pub type TokenScore = f32;

/// Type alias for hash maps in this crate.
pub type TpHashMap<K, V> = ahash::AHashMap<K, V>;

/// Type alias for hash sets in this crate.
pub type TpHashSet<V> = ahash::AHashSet<V>;

/// Attribute bitset for a single vocabulary entry.
///
/// Mirrors the attribute flags carried by model files; a token may carry
/// several attributes at once (e.g. `CONTROL | RSTRIP`).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TokenAttrs(u16);

impl TokenAttrs {
    /// No attributes.
    pub const UNDEFINED: Self = Self(0);
    /// An ordinary in-vocabulary piece.
    pub const NORMAL: Self = Self(1 << 0);
    /// The unknown-token placeholder.
    pub const UNKNOWN: Self = Self(1 << 1);
    /// A control token (bos/eos and friends).
    pub const CONTROL: Self = Self(1 << 2);
    /// A user-defined token, matched verbatim before any scheme runs.
    pub const USER_DEFINED: Self = Self(1 << 3);
    /// A reserved-but-unused entry.
    pub const UNUSED: Self = Self(1 << 4);
    /// A byte-fallback token (`<0xHH>`).
    pub const BYTE: Self = Self(1 << 5);
    /// Strip whitespace to the left of this token during fragmentation.
    pub const LSTRIP: Self = Self(1 << 6);
    /// Strip whitespace to the right of this token during fragmentation.
    pub const RSTRIP: Self = Self(1 << 7);

    /// True if any bit of `other` is set in `self`.
    #[inline]
    pub fn intersects(
        self,
        other: Self,
    ) -> bool {
        self.0 & other.0 != 0
    }

    /// True if no attribute bits are set.
    #[inline]
    pub fn is_undefined(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TokenAttrs {
    type Output = Self;

    fn bitor(
        self,
        rhs: Self,
    ) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for TokenAttrs {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        const NAMES: [(TokenAttrs, &str); 8] = [
            (TokenAttrs::NORMAL, "NORMAL"),
            (TokenAttrs::UNKNOWN, "UNKNOWN"),
            (TokenAttrs::CONTROL, "CONTROL"),
            (TokenAttrs::USER_DEFINED, "USER_DEFINED"),
            (TokenAttrs::UNUSED, "UNUSED"),
            (TokenAttrs::BYTE, "BYTE"),
            (TokenAttrs::LSTRIP, "LSTRIP"),
            (TokenAttrs::RSTRIP, "RSTRIP"),
        ];

        if self.is_undefined() {
            return write!(f, "UNDEFINED");
        }

        let mut first = true;
        for (attr, name) in NAMES {
            if self.intersects(attr) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_bits() {
        let attrs = TokenAttrs::CONTROL | TokenAttrs::RSTRIP;
        assert!(attrs.intersects(TokenAttrs::CONTROL));
        assert!(attrs.intersects(TokenAttrs::RSTRIP));
        assert!(!attrs.intersects(TokenAttrs::NORMAL));
        assert!(!TokenAttrs::UNDEFINED.intersects(attrs));
        assert!(TokenAttrs::default().is_undefined());
    }

    #[test]
    fn test_attr_debug() {
        assert_eq!(format!("{:?}", TokenAttrs::UNDEFINED), "UNDEFINED");
        assert_eq!(
            format!("{:?}", TokenAttrs::CONTROL | TokenAttrs::LSTRIP),
            "CONTROL|LSTRIP"
        );
    }
}
