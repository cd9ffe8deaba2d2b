use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use k256::ecdsa::{RecoveryId, Signature};

/// Encoded length: 32-byte `r`, 32-byte `s`, 1-byte recovery indicator.
pub const SIGNATURE_LENGTH: usize = 65;
/// Offset added to the recovery id by wallets following the yellow paper.
const LEGACY_RECOVERY_OFFSET: u8 = 27;

/// An ECDSA signature together with the recovery id needed to reconstruct
/// the signer's public key.
///
/// Always held in low-`s` form with a recovery id of 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    signature: Signature,
    recovery_id: RecoveryId,
}

impl RecoverableSignature {
    pub(crate) fn new(signature: Signature, recovery_id: RecoveryId) -> Self {
        match signature.normalize_s() {
            // Negating `s` mirrors R across the x-axis, flipping its y parity.
            Some(normalized) => Self {
                signature: normalized,
                recovery_id: RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
            },
            None => Self { signature, recovery_id },
        }
    }

    /// Decode the 65-byte `r ‖ s ‖ v` form.
    ///
    /// `v` may be 27/28 or already normalized to 0/1; anything else, or any
    /// other length, fails closed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes =
            <&[u8; SIGNATURE_LENGTH]>::try_from(bytes).or_raise(|| ErrorKind::SignatureLength(bytes.len()))?;
        let indicator = bytes[64];
        let normalized = match indicator {
            0 | 1 => indicator,
            27 | 28 => indicator - LEGACY_RECOVERY_OFFSET,
            _ => exn::bail!(ErrorKind::RecoveryIndicator(indicator)),
        };
        let recovery_id = RecoveryId::from_byte(normalized).ok_or_raise(|| ErrorKind::RecoveryIndicator(indicator))?;
        let signature = Signature::from_slice(&bytes[..64]).or_raise(|| ErrorKind::MalformedSignature)?;
        Ok(Self::new(signature, recovery_id))
    }

    /// Decode from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(digits).or_raise(|| ErrorKind::SignatureEncoding)?;
        Self::from_bytes(&bytes)
    }

    /// Encode as `r ‖ s ‖ v` with `v` in {27, 28}.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&self.signature.to_bytes());
        out[64] = self.recovery_id.to_byte() + LEGACY_RECOVERY_OFFSET;
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub(crate) fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn recovery_id(&self) -> RecoveryId {
        self.recovery_id
    }
}
