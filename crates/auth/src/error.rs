//! Authentication Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// An authentication error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Principal identifier is not `0x` followed by 40 hex characters.
    #[display("invalid principal identifier: {_0}")]
    InvalidPrincipal(#[error(not(source))] String),
    /// Signature is not exactly 65 bytes.
    #[display("signature must be 65 bytes, got {_0}")]
    SignatureLength(#[error(not(source))] usize),
    /// Signature was not valid hexadecimal.
    #[display("signature is not valid hex")]
    SignatureEncoding,
    /// Recovery indicator outside of {0, 1, 27, 28}.
    #[display("invalid recovery indicator: {_0}")]
    RecoveryIndicator(#[error(not(source))] u8),
    /// The `r` or `s` scalar is out of range.
    #[display("malformed signature scalars")]
    MalformedSignature,
    /// No public key could be recovered from the signature.
    #[display("public key recovery failed")]
    Recovery,
    /// Private key bytes are not a valid secp256k1 scalar.
    #[display("invalid private key")]
    InvalidKey,
    #[display("signing failed")]
    Signing,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
