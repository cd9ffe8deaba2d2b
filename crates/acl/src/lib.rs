//! Access control for stored objects.
//!
//! Every object carries an [`Acl`] mapping principals to a [`Role`]. The
//! [`policy`] functions decide, purely from that in-memory ACL, whether a
//! principal may read, share or delete the object and whether a proposed
//! change to the ACL is allowed. No I/O happens here.

mod acl;
pub mod error;
pub mod policy;
mod role;

pub use crate::acl::{Acl, AclDelta};
pub use crate::policy::{EntryOutcome, GrantStatus};
pub use crate::role::Role;
