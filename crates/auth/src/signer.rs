use crate::error::{ErrorKind, Result};
use crate::message::signing_hash;
use crate::principal::Principal;
use crate::signature::RecoverableSignature;
use exn::ResultExt;
use k256::ecdsa::SigningKey;

const SECRET_LENGTH: usize = 32;

/// Client-side counterpart of the [`Authenticator`](crate::Authenticator):
/// produces signatures the server will accept.
///
/// ```
/// use hashcloud_auth::{Action, Authenticator, CanonicalMessage, Signer};
///
/// let signer = Signer::from_bytes(&[42u8; 32]).unwrap();
/// let message = CanonicalMessage::new(Action::List, [signer.principal()]);
/// let signature = signer.sign(message.as_str()).unwrap();
/// assert!(Authenticator.verify(&message, &signature.to_bytes(), &signer.principal()));
/// ```
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    /// Build from a raw 32-byte secp256k1 private key.
    ///
    /// Shorter or longer secrets are rejected rather than padded.
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        if secret.len() != SECRET_LENGTH {
            exn::bail!(ErrorKind::InvalidKey);
        }
        let key = SigningKey::from_slice(secret).or_raise(|| ErrorKind::InvalidKey)?;
        Ok(Self { key })
    }

    /// Build from a hex private key, with or without a `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let secret = hex::decode(secret.trim().trim_start_matches("0x")).or_raise(|| ErrorKind::InvalidKey)?;
        Self::from_bytes(&secret)
    }

    pub fn principal(&self) -> Principal {
        Principal::from_verifying_key(self.key.verifying_key())
    }

    /// Sign a canonical message string.
    pub fn sign(&self, message: &str) -> Result<RecoverableSignature> {
        let prehash = signing_hash(message);
        let (signature, recovery_id) = self.key.sign_prehash_recoverable(&prehash).or_raise(|| ErrorKind::Signing)?;
        Ok(RecoverableSignature::new(signature, recovery_id))
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("principal", &self.principal()).finish_non_exhaustive()
    }
}
