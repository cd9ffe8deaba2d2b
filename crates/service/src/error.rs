//! Object Service Error Types
//!
//! The four outcomes a caller can act on. Failures from the catalog or the
//! storage backend are raised as [`ErrorKind::Internal`] and stay attached
//! to the error tree for logging.

use derive_more::{Display, Error};

/// An object service error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for object service operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No object exists for the requested digest.
    #[display("not found")]
    NotFound,
    /// Authentication or authorization failed. Which of the two is never
    /// disclosed.
    #[display("forbidden")]
    Forbidden,
    /// The request itself is malformed.
    #[display("bad request: {_0}")]
    BadRequest(#[error(not(source))] String),
    /// Catalog or storage failure.
    #[display("internal error")]
    Internal,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal)
    }
}
