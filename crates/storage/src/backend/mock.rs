//! In-memory storage backend for testing.

use super::{BoxSyncRead, Creation, FileInfoStream};
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation.
///
/// # Examples
///
/// ```
/// use hashcloud_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = MockBackend::with_files([("data/abc", b"hello".to_vec())]);
/// assert!(backend.exists(Path::new("data/abc")).await.unwrap());
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation: broken test setup should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn not_found(path: PathBuf) -> crate::error::Error {
        exn::Exn::from(ErrorKind::NotFound(path))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (inserted, data))| FileInfo::new(path.clone(), data.len() as u64, *inserted))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (_inserted, data) = guard.get(&path).ok_or_else(|| Self::not_found(path.clone()))?;
        Ok(Box::new(Cursor::new(data.clone())))
    }

    async fn create_new(&self, path: &Path, data: &[u8]) -> Result<Creation> {
        let path = validate_path(path)?;
        match self.storage.write().await.entry(path) {
            Entry::Occupied(_) => Ok(Creation::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert((OffsetDateTime::now_utc(), data.to_vec()));
                Ok(Creation::Created)
            },
        }
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let removed = self.storage.write().await.remove(&path);
        removed.map(|_| ()).ok_or_else(|| Self::not_found(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Read;

    async fn contents(backend: &MockBackend, path: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        backend.reader(Path::new(path)).await.unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[tokio::test]
    async fn test_reader() {
        let backend = MockBackend::with_files([("data/abc", b"streamed".to_vec())]);
        assert_eq!(contents(&backend, "data/abc").await, b"streamed");
    }

    #[tokio::test]
    async fn test_create_new() {
        let backend = MockBackend::default();
        assert_eq!(backend.create_new(Path::new("data/abc"), b"one").await.unwrap(), Creation::Created);
        assert_eq!(backend.create_new(Path::new("data/abc"), b"two").await.unwrap(), Creation::AlreadyExists);
        assert_eq!(contents(&backend, "data/abc").await, b"one");
    }

    #[tokio::test]
    async fn test_reader_and_delete_not_found() {
        let backend = MockBackend::default();
        let err = backend.reader(Path::new("missing")).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        let err = backend.delete(Path::new("missing")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("data/one", b"a".to_vec()),
            ("data/two", b"bb".to_vec()),
            ("database/three", b"c".to_vec()),
        ]);
        let mut files: Vec<FileInfo> = backend.list_stream(Some(Path::new("data"))).try_collect().await.unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(files.iter().map(|f| f.size).collect::<Vec<_>>(), vec![1, 2]);
        let all: Vec<FileInfo> = backend.list_stream(None).try_collect().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default().with_name("test");
        assert_eq!(backend.name(), "test");
        assert!(backend.reader(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.create_new(Path::new("../escape"), b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", b"bad".to_vec())]);
    }
}
