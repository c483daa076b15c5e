use std::path::PathBuf;

use thiserror::Error;

/// The result type returned by fallible xschem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error reading, writing, or querying an xschem file.
#[derive(Debug, Error)]
pub enum Error {
    /// Error reading a file.
    #[error("failed to read file at path `{path:?}`: {err:?}")]
    FailedToRead {
        /// The path we attempted to read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
    /// Error writing a file.
    #[error("failed to write file at path `{path:?}`: {err:?}")]
    FailedToWrite {
        /// The path we attempted to write.
        path: PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
    /// A component lookup pattern was not a valid regular expression.
    #[error("invalid lookup pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
