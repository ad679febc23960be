//! The crate-wide error type.
//!
//! Every fallible primitive in the interpreter returns `Result<T>` using
//! the single [`Error`] enum defined here rather than a bare `String`, so
//! callers can match on a taxonomy instead of parsing messages.

use std::fmt;

/// A classified interpreter error with a human-readable message.
#[derive(Debug, Clone)]
pub enum Error {
    /// Open/read/write/seek failures on story, save, or undo files.
    Io(String),
    /// Story too small/large/unknown version; Quetzal header mismatch;
    /// truncated chunk.
    Format(String),
    /// Out-of-bounds access, write to static/high memory, header write to
    /// a read-only byte, word straddling dynamic/static, dictionary index
    /// out of range.
    MemoryAccess(String),
    /// Push past the stack's capacity.
    StackOverflow(String),
    /// Pop past the bottom of the stack, including popping the dummy frame.
    StackUnderflow(String),
    /// Unknown opcode, operand count mismatch, reference via a
    /// non-reference-capable operand, division by zero.
    Decode(String),
    /// V6 story, version-inappropriate opcode, property of unsupported
    /// length, unsupported true-colour sentinel.
    Unsupported(String),
    /// Input was requested but no interactive collaborator is available.
    InputSuppressed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
            Error::Format(msg) => write!(f, "format error: {msg}"),
            Error::MemoryAccess(msg) => write!(f, "memory access error: {msg}"),
            Error::StackOverflow(msg) => write!(f, "stack overflow: {msg}"),
            Error::StackUnderflow(msg) => write!(f, "stack underflow: {msg}"),
            Error::Decode(msg) => write!(f, "decode error: {msg}"),
            Error::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Error::InputSuppressed(msg) => write!(f, "input suppressed: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<std::array::TryFromSliceError> for Error {
    fn from(e: std::array::TryFromSliceError) -> Self {
        Error::MemoryAccess(e.to_string())
    }
}

/// The crate-wide result alias. Every public fallible function in this
/// crate returns `Result<T>`, never a bare `String` error.
pub type Result<T> = std::result::Result<T, Error>;
