use derive_more::Display;
use sha3::{Digest, Keccak256};

const SEPARATOR: char = '+';
/// Prefix for personal-message signing; the signed payload is always a
/// 32-byte Keccak-256 hash.
const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// The operation a signature authorizes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    #[display("upload")]
    Upload,
    #[display("list")]
    List,
    #[display("download")]
    Download,
    #[display("share")]
    Share,
    #[display("delete")]
    Delete,
}

/// The exact string a client signs for a request: the action followed by
/// its parameters, joined with `+`.
///
/// ```
/// use hashcloud_auth::{Action, CanonicalMessage};
///
/// let message = CanonicalMessage::new(Action::Upload, ["aaa", "bbb"]);
/// assert_eq!(message.as_str(), "upload+aaa+bbb");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage {
    action: Action,
    text: String,
}

impl CanonicalMessage {
    pub fn new<P: std::fmt::Display>(action: Action, params: impl IntoIterator<Item = P>) -> Self {
        let mut text = action.to_string();
        for param in params {
            text.push(SEPARATOR);
            text.push_str(&param.to_string());
        }
        Self { action, text }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for CanonicalMessage {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for CanonicalMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Hash that signatures are actually made over.
///
/// The message is hashed with Keccak-256, and that hash is signed as a
/// personal message: `keccak256("\x19Ethereum Signed Message:\n32" ‖ h)`.
pub fn signing_hash(message: &str) -> [u8; 32] {
    let inner = Keccak256::digest(message.as_bytes());
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX);
    hasher.update(inner);
    hasher.finalize().into()
}
