use crate::error::ErrorKind;
use crate::role::Role;
use hashcloud_auth::Principal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Principal → role mapping for a single object.
///
/// Only granted roles are ever held: setting a principal to [`Role::None`]
/// removes its entry, and decoding an ACL containing a `None` entry fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Principal, Role>", into = "BTreeMap<Principal, Role>")]
pub struct Acl {
    entries: BTreeMap<Principal, Role>,
}

impl Acl {
    /// The ACL of a freshly uploaded object.
    pub fn with_owner(owner: Principal) -> Self {
        Self {
            entries: BTreeMap::from([(owner, Role::Owner)]),
        }
    }

    /// Role held by `principal`, [`Role::None`] when absent.
    pub fn role(&self, principal: &Principal) -> Role {
        self.entries.get(principal).copied().unwrap_or(Role::None)
    }

    /// Set a principal's role, returning the previous one. `Role::None`
    /// removes the entry.
    pub fn set(&mut self, principal: Principal, role: Role) -> Role {
        let previous = match role {
            Role::None => self.entries.remove(&principal),
            granted => self.entries.insert(principal, granted),
        };
        previous.unwrap_or(Role::None)
    }

    pub fn contains(&self, principal: &Principal) -> bool {
        self.entries.contains_key(principal)
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Principal, Role)> {
        self.entries.iter().map(|(principal, role)| (principal, *role))
    }

    /// Number of principals holding [`Role::Owner`].
    pub fn owner_count(&self) -> usize {
        self.entries.values().filter(|role| **role == Role::Owner).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<BTreeMap<Principal, Role>> for Acl {
    type Error = ErrorKind;

    fn try_from(entries: BTreeMap<Principal, Role>) -> Result<Self, ErrorKind> {
        if let Some((principal, _)) = entries.iter().find(|(_, role)| !role.is_granted()) {
            return Err(ErrorKind::EmptyGrant(principal.to_string()));
        }
        Ok(Self { entries })
    }
}

impl From<Acl> for BTreeMap<Principal, Role> {
    fn from(acl: Acl) -> Self {
        acl.entries
    }
}

/// Requested changes to an ACL: principal → new role, where
/// [`Role::None`] asks for the principal's access to be revoked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclDelta(BTreeMap<Principal, Role>);

impl AclDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, principal: Principal, role: Role) -> Self {
        self.0.insert(principal, role);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Principal, Role)> {
        self.0.iter().map(|(principal, role)| (principal, *role))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Principal, Role)> for AclDelta {
    fn from_iter<I: IntoIterator<Item = (Principal, Role)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
