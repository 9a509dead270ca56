use thiserror::Error;

/// Failures reported by set operations and the wire decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A binary operation was attempted between sets of different capacity,
    /// or between domains with a different chunk geometry. The receiver is
    /// left untouched.
    #[error("incompatible capacity: {left} != {right}")]
    IncompatibleCapacity { left: u64, right: u64 },
    /// The serialized buffer could not be decoded.
    #[error("corrupt encoding: {0}")]
    CorruptEncoding(String),
    /// A value or chunk index lies outside the addressable range.
    #[error("value {value} is out of range for capacity {capacity}")]
    OutOfRange { value: u64, capacity: u64 },
    /// A domain geometry that cannot address any value, or more than `u32`
    /// can represent.
    #[error("invalid domain size: {chunk_width} x {chunks}")]
    InvalidSize { chunk_width: u32, chunks: usize },
}

impl Error {
    pub(crate) fn corrupt<S: Into<String>>(msg: S) -> Self {
        Error::CorruptEncoding(msg.into())
    }

    pub(crate) fn capacity(left: u64, right: u64) -> Self {
        Error::IncompatibleCapacity { left, right }
    }
}
