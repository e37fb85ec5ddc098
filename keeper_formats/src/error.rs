use thiserror::Error;

/// Failure modes shared by every decoder in this crate.
///
/// Structural errors are never recovered from: once a tag or a size is wrong
/// the reader has lost sync with the file and the whole parse is abandoned.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("malformed container: expected {expected}, got {found}")]
    MalformedContainer { expected: String, found: String },
    #[error("unexpected end of data: needed {needed} bytes at offset {offset}, {available} available")]
    UnexpectedEndOfData {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("invalid length {length} at offset {offset}")]
    InvalidLength { offset: usize, length: i64 },
    #[error("unsupported {kind} value {value}")]
    UnsupportedVariant { kind: &'static str, value: u32 },
    #[error("{what} index {index} out of range (limit {limit})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },
}

impl FormatError {
    pub fn malformed(expected: impl Into<String>, found: impl Into<String>) -> Self {
        FormatError::MalformedContainer {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unsupported(kind: &'static str, value: u32) -> Self {
        FormatError::UnsupportedVariant { kind, value }
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
