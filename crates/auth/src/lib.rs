//! Request authentication without passwords or sessions.
//!
//! A [`Principal`] is derived from a secp256k1 public key. Every request
//! carries a 65-byte recoverable signature over a [`CanonicalMessage`]
//! describing the operation; the [`Authenticator`] recovers the signer's
//! public key from it and accepts the request only when the derived
//! principal is the one the request claims to come from.

mod authenticator;
pub mod error;
mod message;
mod principal;
mod signature;
mod signer;

pub use crate::authenticator::Authenticator;
pub use crate::message::{Action, CanonicalMessage, signing_hash};
pub use crate::principal::Principal;
pub use crate::signature::RecoverableSignature;
pub use crate::signer::Signer;
