//! Error kinds shared by the storage engine and the command-line tools.

use std::io;
use thiserror::Error;

/// Errors surfaced by the alignment store and its traversal primitives.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("index {index} out of range (size {size})")]
    OutOfRange { index: i64, size: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),
}

pub type Result<T> = std::result::Result<T, StrataError>;

impl StrataError {
    /// Build an `OutOfRange` error for index `index` against an array of
    /// `size` records.
    pub fn out_of_range(index: i64, size: u64) -> Self {
        StrataError::OutOfRange { index, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = StrataError::out_of_range(12, 10);
        assert_eq!(e.to_string(), "index 12 out of range (size 10)");

        let e = StrataError::NotFound("genome 'mouse'".to_string());
        assert_eq!(e.to_string(), "not found: genome 'mouse'");
    }
}
