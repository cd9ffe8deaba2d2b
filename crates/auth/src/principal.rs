use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// An identity derived from a secp256k1 key pair.
///
/// The last 20 bytes of the Keccak-256 hash of the uncompressed public key
/// (without its `0x04` tag byte). Rendered as `0x` followed by 40 lowercase
/// hex characters; parsing is case-insensitive so two spellings of the same
/// identifier always compare equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal([u8; 20]);

impl Principal {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Principal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed);
        if digits.len() != 40 {
            exn::bail!(ErrorKind::InvalidPrincipal(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).or_raise(|| ErrorKind::InvalidPrincipal(s.to_string()))?;
        Ok(Self(bytes))
    }
}

// Serde needs a `Display` error; hand back the bare kind.
impl TryFrom<String> for Principal {
    type Error = ErrorKind;

    fn try_from(value: String) -> std::result::Result<Self, ErrorKind> {
        value.parse::<Self>().map_err(|e: Error| (*e).clone())
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.to_string()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf")]
    #[case("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf")]
    #[case("0X7E5F4552091A69125D5DFCB7B8C2659029395BDF")]
    #[case("7e5f4552091a69125d5dfcb7b8c2659029395bdf")]
    fn test_parse_is_case_insensitive(#[case] input: &str) {
        let principal: Principal = input.parse().unwrap();
        assert_eq!(principal.to_string(), "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    }

    #[rstest]
    #[case("")]
    #[case("0x")]
    #[case("0xAAA")]
    #[case("0x7e5f4552091a69125d5dfcb7b8c2659029395bd")]
    #[case("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf00")]
    #[case("0xzz5f4552091a69125d5dfcb7b8c2659029395bdf")]
    fn test_parse_rejects(#[case] input: &str) {
        let err = input.parse::<Principal>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPrincipal(_)));
    }

    #[test]
    fn test_derived_from_public_key() {
        // Private key 0x00..01 is the generator point.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = k256::ecdsa::SigningKey::from_slice(&secret).unwrap();
        let principal = Principal::from_verifying_key(key.verifying_key());
        assert_eq!(principal.to_string(), "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    }

    #[test]
    fn test_serde_as_string() {
        let principal: Principal = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap();
        let json = serde_json::to_string(&principal).unwrap();
        assert_eq!(json, r#""0x7e5f4552091a69125d5dfcb7b8c2659029395bdf""#);
        assert_eq!(serde_json::from_str::<Principal>(&json).unwrap(), principal);
        assert!(serde_json::from_str::<Principal>(r#""0xAAA""#).is_err());
    }
}
