use futures::{Stream, StreamExt};
use hashcloud_catalog::Digest;
use hashcloud_storage::backend::BoxSyncRead;
use hashcloud_storage::error::{ErrorKind, Result};
use hashcloud_storage::{BackendHandle, Creation};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::warn;

const BLOB_DIR: &str = "data";

/// Content-addressed blobs on top of a storage backend, stored at
/// `data/<digest>`.
///
/// Blobs are written once and never modified; the only mutation besides
/// creation is deleting one as a whole.
#[derive(Clone)]
pub struct BlobStore {
    backend: BackendHandle,
}

impl BlobStore {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    fn path(digest: &Digest) -> PathBuf {
        Path::new(BLOB_DIR).join(digest.to_string())
    }

    /// Store `data` under `digest` unless a blob is already there.
    ///
    /// `data` must be the bytes `digest` was computed from.
    pub async fn put(&self, digest: &Digest, data: &[u8]) -> Result<Creation> {
        self.backend.create_new(&Self::path(digest), data).await
    }

    pub async fn exists(&self, digest: &Digest) -> Result<bool> {
        self.backend.exists(&Self::path(digest)).await
    }

    /// Open a blob for streaming. `None` if it is missing.
    pub async fn open(&self, digest: &Digest) -> Result<Option<BoxSyncRead>> {
        match self.backend.reader(&Self::path(digest)).await {
            Ok(reader) => Ok(Some(reader)),
            Err(e) if matches!(e.deref(), ErrorKind::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete a blob. Returns `false` if there was nothing to delete.
    pub async fn remove(&self, digest: &Digest) -> Result<bool> {
        match self.backend.delete(&Self::path(digest)).await {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.deref(), ErrorKind::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Every digest with a stored blob. Files that aren't named by a digest
    /// are skipped.
    pub fn digests(&self) -> impl Stream<Item = Result<Digest>> + Send + '_ {
        self.backend.list_stream(Some(Path::new(BLOB_DIR))).filter_map(|entry| async move {
            match entry {
                Ok(file) => match file.file_name().map(str::parse::<Digest>) {
                    Some(Ok(digest)) => Some(Ok(digest)),
                    _ => {
                        warn!(path = %file.path.display(), "Ignoring stray file in blob store");
                        None
                    },
                },
                Err(e) => Some(Err(e)),
            }
        })
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore").field("backend", &self.backend.name()).finish()
    }
}
