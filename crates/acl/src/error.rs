//! ACL Error Types

use derive_more::{Display, Error};

/// An ACL error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ACL operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Role number or name outside of the known set.
    #[display("unknown role: {_0}")]
    UnknownRole(#[error(not(source))] String),
    /// A stored ACL contained an entry with no access, which is never persisted.
    #[display("stored ACL grants no access to {_0}")]
    EmptyGrant(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
