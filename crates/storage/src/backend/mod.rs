//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, a unified interface over
//! the places bytes can live (local filesystem, memory for tests).

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::Stream;
use std::io::Read;
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;
pub type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Outcome of [`StorageBackend::create_new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    /// The file did not exist and now holds the supplied bytes.
    Created,
    /// Something was already stored at that path; nothing was written.
    AlreadyExists,
}

/// Unified interface for storage backends.
///
/// All paths are relative to the storage root and are validated with
/// [`validate_path`](crate::validate_path) by every implementation before
/// use.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use hashcloud_storage::{Creation, StorageBackend, error::Result};
///
/// async fn store_once(backend: &dyn StorageBackend, data: &[u8]) -> Result<bool> {
///     let created = backend.create_new(Path::new("data/blob"), data).await?;
///     Ok(created == Creation::Created)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Stream file metadata matching an optional prefix.
    ///
    /// Prefix matching is component-based: a prefix of `data` matches
    /// `data/abc` but not `database/abc`. A prefix that doesn't exist yields
    /// an empty stream rather than an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use hashcloud_storage::{StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("data")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Open a file for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`](std::io::Read) suitable for use
    /// inside [`spawn_blocking`](tokio::task::spawn_blocking). The async
    /// setup (opening the file) happens before returning.
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn reader(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Atomically create a file only if nothing exists at `path` yet.
    ///
    /// Concurrent callers racing on the same path observe exactly one
    /// [`Creation::Created`]; a reader never sees a partially written file.
    /// Implementations create parent directories as needed.
    async fn create_new(&self, path: &Path, data: &[u8]) -> Result<Creation>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;
}
