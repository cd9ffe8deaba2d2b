//! Authorization decisions over an in-memory [`Acl`]. Nothing here does I/O.

use crate::acl::{Acl, AclDelta};
use crate::role::Role;
use derive_more::Display;
use hashcloud_auth::Principal;
use serde::Serialize;

pub fn can_read(acl: &Acl, principal: &Principal) -> bool {
    matches!(acl.role(principal), Role::Owner | Role::Manager | Role::Viewer)
}

pub fn can_share(acl: &Acl, principal: &Principal) -> bool {
    matches!(acl.role(principal), Role::Owner | Role::Manager)
}

pub fn can_delete(acl: &Acl, principal: &Principal) -> bool {
    acl.role(principal) == Role::Owner
}

/// Whether `grantor` may set `grantee`'s role to `new_role`.
///
/// Only sharers may grant. A principal never edits its own entry. Revocation
/// is allowed against any other principal; any other role must be strictly
/// less privileged than the grantor's own.
///
/// One exception overrides all of the above: the sole Owner can be neither
/// revoked nor demoted, so a Manager's revocation of that Owner is refused
/// and reported as [`GrantStatus::LastOwner`].
pub fn can_grant(acl: &Acl, grantor: &Principal, grantee: &Principal, new_role: Role) -> bool {
    evaluate(acl, grantor, grantee, new_role) == GrantStatus::Applied
}

/// Result of one entry of an [`AclDelta`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    #[display("applied")]
    Applied,
    /// The grantor lacks the privilege for this change.
    #[display("denied")]
    Denied,
    /// The entry targeted the grantor itself.
    #[display("self edit")]
    SelfEdit,
    /// The change would leave the object without an owner.
    #[display("last owner")]
    LastOwner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryOutcome {
    pub principal: Principal,
    pub requested: Role,
    pub status: GrantStatus,
}

impl EntryOutcome {
    pub fn is_applied(&self) -> bool {
        self.status == GrantStatus::Applied
    }
}

fn evaluate(acl: &Acl, grantor: &Principal, grantee: &Principal, new_role: Role) -> GrantStatus {
    if grantor == grantee {
        return GrantStatus::SelfEdit;
    }
    if !can_share(acl, grantor) {
        return GrantStatus::Denied;
    }
    let grantor_role = acl.role(grantor);
    if new_role.is_granted() && !grantor_role.outranks(new_role) {
        return GrantStatus::Denied;
    }
    if acl.role(grantee) == Role::Owner && new_role != Role::Owner && acl.owner_count() <= 1 {
        return GrantStatus::LastOwner;
    }
    GrantStatus::Applied
}

/// Apply every permitted entry of `delta` to `acl` on behalf of `grantor`.
///
/// Entries are judged against the ACL as it stands when each is reached, so
/// a delta can never bootstrap its own privilege. Returns one outcome per
/// entry in principal order.
pub fn apply_delta(acl: &mut Acl, grantor: &Principal, delta: &AclDelta) -> Vec<EntryOutcome> {
    delta
        .iter()
        .map(|(grantee, requested)| {
            let status = evaluate(acl, grantor, grantee, requested);
            if status == GrantStatus::Applied {
                acl.set(*grantee, requested);
            }
            EntryOutcome {
                principal: *grantee,
                requested,
                status,
            }
        })
        .collect()
}
