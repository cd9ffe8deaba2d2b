use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

const DIGEST_LENGTH: usize = 32;

/// SHA-256 of a blob's exact bytes; the primary key of both the blob and
/// its metadata record.
///
/// Always rendered as 64 lowercase hex characters. Parsing accepts either
/// case so the same content can never be addressed by two distinct keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; DIGEST_LENGTH];
        if s.len() != DIGEST_LENGTH * 2 || hex::decode_to_slice(s, &mut bytes).is_err() {
            exn::bail!(ErrorKind::InvalidDigest(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Digest {
    type Error = ErrorKind;

    fn try_from(value: String) -> std::result::Result<Self, ErrorKind> {
        value.parse::<Self>().map_err(|e: Error| (*e).clone())
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}
