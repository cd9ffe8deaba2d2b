use crate::error::{Error, ErrorKind};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Privilege level a principal holds on an object.
///
/// Encoded as an integer where a *smaller* non-zero value means *more*
/// privilege: `Owner(1) > Manager(2) > Viewer(3)`. `None(0)` is the absence
/// of a grant; it is only ever requested (to revoke) and never stored.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Role {
    #[display("none")]
    None = 0,
    #[display("owner")]
    Owner = 1,
    #[display("manager")]
    Manager = 2,
    #[display("viewer")]
    Viewer = 3,
}

impl Role {
    /// Any role other than [`Role::None`].
    pub fn is_granted(self) -> bool {
        self != Self::None
    }

    /// `true` if `self` is strictly more privileged than `other`.
    pub fn outranks(self, other: Role) -> bool {
        match (self, other) {
            (Self::None, _) => false,
            (_, Self::None) => true,
            (ours, theirs) => (ours as u8) < (theirs as u8),
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = ErrorKind;

    fn try_from(value: u8) -> Result<Self, ErrorKind> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Owner),
            2 => Ok(Self::Manager),
            3 => Ok(Self::Viewer),
            other => Err(ErrorKind::UnknownRole(other.to_string())),
        }
    }
}

impl From<Role> for u8 {
    fn from(role: Role) -> Self {
        role as u8
    }
}

impl FromStr for Role {
    type Err = Error;

    /// Accepts either the name (`viewer`) or the number (`3`).
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "revoke" => Ok(Self::None),
            "owner" => Ok(Self::Owner),
            "manager" => Ok(Self::Manager),
            "viewer" => Ok(Self::Viewer),
            other => match other.parse::<u8>() {
                Ok(number) => Ok(Self::try_from(number)?),
                Err(_) => exn::bail!(ErrorKind::UnknownRole(s.to_string())),
            },
        }
    }
}
