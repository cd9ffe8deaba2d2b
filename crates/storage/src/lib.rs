//! Byte storage for hashcloud.
//!
//! Backends know nothing about digests, principals or access control: they
//! store opaque bytes under validated relative paths. The blob store and the
//! object service build on top of the [`StorageBackend`] trait.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::{Creation, StorageBackend};
pub use crate::file::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

/// Shared handle to a configured backend, passed explicitly to every
/// component that touches stored bytes.
pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
