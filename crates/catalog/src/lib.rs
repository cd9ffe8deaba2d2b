//! Metadata store and principal index.
//!
//! Each stored blob has exactly one [`MetadataRecord`], keyed by its
//! [`Digest`], holding the object's ACL alongside its descriptive metadata.
//! The principal index maps a principal to the digests it has been granted
//! access to, which is what listing reads. The index is a convenience: the
//! ACL in the record is always the authority.
//!
//! Both live in SQLite. The database is opened through [`Database`] and
//! queried through a [`Repository`].

mod db;
mod digest;
pub mod error;
mod models;
mod record;
mod repo;

pub use crate::db::Database;
pub use crate::digest::Digest;
pub use crate::record::{MetadataRecord, PublicMetadata};
pub use crate::repo::Repository;
