//! Orchestration of hashcloud's operations over explicit store handles.
//!
//! An [`ObjectService`] owns a [`BlobStore`] (bytes keyed by digest), a
//! catalog [`Repository`](hashcloud_catalog::Repository) (metadata records
//! and the principal index) and a set of [`DigestLocks`]. Every operation
//! checks the request signature, then consults the object's ACL, and only
//! then touches bytes or index rows.

mod blobs;
pub mod error;
mod locks;
mod service;

pub use crate::blobs::BlobStore;
pub use crate::locks::{DigestGuard, DigestLocks};
pub use crate::service::{Download, ObjectService, Payload, Reconciliation};
