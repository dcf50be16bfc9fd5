//! Error type shared by every counter operation.
//!
//! Every variant is fatal to the operation that produced it. A lost CAS
//! race is not an error and never surfaces here.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a file was rejected as a counter file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatIssue {
    /// The file is not exactly `W + 1` bytes long.
    Length { expected: u64, actual: u64 },
    /// The digit bytes or the trailing delimiter are malformed.
    Layout,
    /// A non-digit byte was found while decoding the counter word.
    Digits,
}

impl fmt::Display for FormatIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatIssue::Length { expected, actual } => {
                write!(f, "unexpected size {actual} (expected {expected})")
            }
            FormatIssue::Layout => f.write_str("bad layout"),
            FormatIssue::Digits => f.write_str("counter word is not decimal"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CounterError {
    /// System-level failure while opening, creating, sizing, mapping or
    /// closing the counter file.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file exists but is not a valid counter file. It is never repaired.
    #[error("not a valid counter file: {0}")]
    Format(FormatIssue),

    /// The value does not fit in the counter width.
    #[error("counter overflow: {value} exceeds {max}")]
    Overflow { value: u64, max: u64 },

    /// Digit bytes that could not be turned into an integer.
    #[error("cannot parse counter digits {digits:?}")]
    Parse { digits: String },

    #[error("shared counters are not supported on this platform")]
    Unsupported,
}

impl CounterError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        CounterError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CounterError>;
