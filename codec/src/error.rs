//! Encoder errors, decoder read statuses and the overflow-handler hook.

/// Error type for encoding operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The underlying buffer could not allocate blocks. The buffer is
    /// unchanged; a compound emit has been rolled back to its start.
    Alloc(String),

    /// A length or count exceeds the largest wire form (2³² − 1).
    SizeOverflow { size: u64, limit: u64 },

    /// A value does not fit the width forced by `as_fixed` and the error
    /// handler declared the condition fatal.
    FixedOverflow { value: i128, limit: i128 },
}

impl std::error::Error for EncodeError {}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::Alloc(msg) => write!(f, "Allocation error: {}", msg),
            EncodeError::SizeOverflow { size, limit } => {
                write!(f, "Size overflow: {} exceeds wire limit {}", size, limit)
            }
            EncodeError::FixedOverflow { value, limit } => {
                write!(f, "Fixed-width overflow: {} exceeds {}", value, limit)
            }
        }
    }
}

impl From<buffer::Error> for EncodeError {
    fn from(err: buffer::Error) -> Self {
        match err {
            buffer::Error::Alloc(msg) => EncodeError::Alloc(msg),
        }
    }
}

/// Result type alias for encoding operations.
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

/// Outcome of one [`Dec::read`](crate::Dec::read) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// One complete top-level value was consumed and delivered.
    Success,
    /// The stream ended mid-value. Benign: append more bytes and retry.
    NeedMore,
    /// Invalid tag or malformed stream. The decoder is dead.
    BadMsgpack,
    /// A reader rejected the value family; the rest of the message was
    /// skipped.
    WrongType,
    /// Nesting exceeded the configured depth; the rest of the message was
    /// skipped.
    MaxDepthReached,
    /// A reader aborted the message; the rest was skipped.
    Aborted,
}

impl ReadStatus {
    pub fn is_success(self) -> bool {
        self == ReadStatus::Success
    }

    /// True when the caller should retry after more bytes arrive.
    pub fn is_need_more(self) -> bool {
        self == ReadStatus::NeedMore
    }
}

impl std::fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReadStatus::Success => "success",
            ReadStatus::NeedMore => "need more data",
            ReadStatus::BadMsgpack => "bad msgpack",
            ReadStatus::WrongType => "wrong type",
            ReadStatus::MaxDepthReached => "max depth reached",
            ReadStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Overflow hooks consulted by the encoder before it denies or narrows an
/// emit.
///
/// Each hook returns a fatality flag. `true` fails the emit immediately;
/// `false` — the default — lets the encoder proceed where a narrowed
/// encoding exists (`as_fixed` truncates to the forced width) and still
/// denies emits that have no wire form at all (a count past 2³² − 1).
pub trait ErrorHandler {
    fn under_min(&mut self, value: i64, min: i64) -> bool {
        let _ = (value, min);
        false
    }

    fn over_max(&mut self, value: u64, max: u64) -> bool {
        let _ = (value, max);
        false
    }

    fn fixed_overflow(&mut self, value: i128, limit: i128) -> bool {
        let _ = (value, limit);
        false
    }

    fn size_overflow(&mut self, size: u64, limit: u64) -> bool {
        let _ = (size, limit);
        false
    }
}

/// Handler with every hook at its default: nothing is fatal beyond what has
/// no encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {}
