use crate::error::Result;
use crate::message::signing_hash;
use crate::principal::Principal;
use crate::signature::RecoverableSignature;
use exn::ResultExt;
use k256::ecdsa::VerifyingKey;
use tracing::instrument;

/// Stateless verifier binding a signature to a message and a principal.
///
/// Never touches any store; the object service consults it before doing
/// anything else for every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticator;

impl Authenticator {
    /// Recover the principal whose key produced `signature` over `message`.
    pub fn recover(&self, message: impl AsRef<str>, signature: &[u8]) -> Result<Principal> {
        let signature = RecoverableSignature::from_bytes(signature)?;
        let prehash = signing_hash(message.as_ref());
        let key = VerifyingKey::recover_from_prehash(&prehash, signature.signature(), signature.recovery_id())
            .or_raise(|| crate::error::ErrorKind::Recovery)?;
        Ok(Principal::from_verifying_key(&key))
    }

    /// `true` iff `signature` over `message` was made by `claimed`'s key.
    ///
    /// Every failure (malformed signature, failed recovery, different signer)
    /// is a plain `false`; the reason is only logged.
    #[instrument(level = "debug", skip_all, fields(claimed = %claimed))]
    pub fn verify(&self, message: impl AsRef<str>, signature: &[u8], claimed: &Principal) -> bool {
        match self.recover(message, signature) {
            Ok(recovered) if recovered == *claimed => true,
            Ok(recovered) => {
                tracing::debug!(%recovered, "Signature belongs to a different principal");
                false
            },
            Err(e) => {
                tracing::debug!(error = ?e, "Rejecting unverifiable signature");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, CanonicalMessage, Signer};

    fn alice() -> Signer {
        Signer::from_bytes(&[0xa1; 32]).unwrap()
    }

    fn bob() -> Signer {
        Signer::from_bytes(&[0xb0; 32]).unwrap()
    }

    #[test]
    fn test_accepts_own_signature() {
        let message = CanonicalMessage::new(Action::Download, ["d1"]);
        let signature = alice().sign(message.as_str()).unwrap().to_bytes();
        assert_eq!(Authenticator.recover(&message, &signature).unwrap(), alice().principal());
        assert!(Authenticator.verify(&message, &signature, &alice().principal()));
    }

    #[test]
    fn test_rejects_replay_against_other_message() {
        let signature = alice().sign("download+d1").unwrap().to_bytes();
        assert!(!Authenticator.verify("download+d2", &signature, &alice().principal()));
        assert!(!Authenticator.verify("delete+d1", &signature, &alice().principal()));
    }

    #[test]
    fn test_rejects_other_claimed_principal() {
        let signature = alice().sign("list+x").unwrap().to_bytes();
        assert!(!Authenticator.verify("list+x", &signature, &bob().principal()));
    }

    #[test]
    fn test_claimed_principal_case_does_not_matter() {
        let signature = alice().sign("list+x").unwrap().to_bytes();
        let shouted: Principal = alice().principal().to_string().to_uppercase().parse().unwrap();
        assert!(Authenticator.verify("list+x", &signature, &shouted));
    }

    #[test]
    fn test_rejects_malformed_signatures() {
        let mut signature = alice().sign("list+x").unwrap().to_bytes().to_vec();
        assert!(!Authenticator.verify("list+x", &signature[..64], &alice().principal()));
        signature[64] = 30;
        assert!(!Authenticator.verify("list+x", &signature, &alice().principal()));
        assert!(!Authenticator.verify("list+x", &[], &alice().principal()));
    }

    #[test]
    fn test_accepts_high_s_form() {
        // Wallets that don't normalize `s` produce (r, n - s) with the
        // opposite recovery parity; both encode the same signer.
        let signature = alice().sign("share+d1").unwrap();
        let bytes = signature.to_bytes();
        let s = k256::NonZeroScalar::try_from(&bytes[32..64]).unwrap();
        let high_s = -*s;
        let mut flipped = bytes;
        flipped[32..64].copy_from_slice(&high_s.to_bytes());
        flipped[64] = if bytes[64] == 27 { 28 } else { 27 };
        assert!(Authenticator.verify("share+d1", &flipped, &alice().principal()));
    }
}
