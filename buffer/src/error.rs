//! Error types for buffer operations.

/// Error type for buffer operations.
///
/// Allocation is the only fallible path; every other misuse (over-drop,
/// oversized insert, out-of-range copy) is a caller-enforced precondition
/// checked with debug assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The block allocator refused to supply a chunk.
    ///
    /// The failed operation is transactional: any blocks acquired before the
    /// refusal have been returned and the buffer is unchanged.
    Alloc(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Alloc(msg) => write!(f, "Allocation error: {}", msg),
        }
    }
}

/// Result type alias for buffer operations.
pub type Result<T> = std::result::Result<T, Error>;
