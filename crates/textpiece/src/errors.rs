//! # Error Types

/// Errors from textpiece operations.
///
/// Broken `Vocabulary`/flag pairings (scheme `None`, a required sentinel
/// slot left empty) are load-time contract violations and panic instead;
/// see the crate docs.
#[derive(Debug, thiserror::Error)]
pub enum TextpieceError {
    /// The precompiled charsmap blob is structurally invalid.
    #[error("malformed precompiled charsmap: {reason}")]
    MalformedCharsmap {
        /// What the structural check found.
        reason: &'static str,
    },

    /// A charsmap lookup would read past the end of the blob.
    #[error("precompiled charsmap index {index} out of bounds ({len})")]
    CharsmapOutOfBounds {
        /// The offending index.
        index: usize,
        /// The length of the indexed section.
        len: usize,
    },

    /// A pretokenizer expression failed to compile.
    #[error(transparent)]
    Pattern(#[from] Box<fancy_regex::Error>),

    /// The vocabulary has no token covering the given byte value.
    #[error("no token for byte 0x{byte:02X}")]
    ByteNotCovered {
        /// The uncovered byte value.
        byte: u8,
    },

    /// Vocabulary data is inconsistent.
    #[error("{0}")]
    VocabConflict(String),
}

impl From<fancy_regex::Error> for TextpieceError {
    fn from(err: fancy_regex::Error) -> Self {
        Self::Pattern(Box::new(err))
    }
}

/// Result type for textpiece operations.
pub type Result<T> = core::result::Result<T, TextpieceError>;
