//! Local filesystem storage backend.
//!
//! Files are stored under a configured directory and accessed with
//! `tokio::fs` for async I/O.

use crate::backend::{BoxSyncRead, Creation, FileInfoStream};
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, DirEntry};

/// Directory (relative to the root) holding half-written files before they
/// are linked into place. Never listed.
const STAGING_DIR: &str = ".staging";

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. All paths are relative
/// to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use hashcloud_storage::backend::LocalBackend;
///
/// let backend = LocalBackend::new("local", "/var/lib/hashcloud");
/// assert!(backend.is_ok());
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory for stored files
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating `root` if missing.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the path is not
    /// absolute or points at something other than a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }

        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }

        Ok(Self { name: name.into(), root })
    }

    /// Validates the path and joins it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        if !absolute.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!(
                "attempting to get relative path of non-absolute path `{absolute:?}`"
            )))
        }
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    /// Unique staging location for a file about to be created.
    fn staging_path(&self) -> PathBuf {
        let sequence = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root.join(STAGING_DIR).join(format!("{}-{sequence}.tmp", std::process::id()))
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Errors can't be `?`-ed inside the stream loop, so the per-entry logic
    /// lives here and the loop just yields whatever comes back.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if relative.starts_with(STAGING_DIR) {
            return Ok(WalkEntry::Skip);
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }

    async fn ensure_parent(&self, absolute: &Path, path: &Path) -> Result<()> {
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };

        // Walk from the parent of the prefix so that a prefix naming a file,
        // or a directory that doesn't exist yet, still works:
        // - [MATCH] "data/abc" for prefix "data"
        // - [NOT MATCH] "database/abc" (Path::starts_with is component-based)
        let start_dir = validated_prefix
            .as_ref()
            .map(|prefix| self.root.join(prefix).parent().unwrap_or(&self.root).to_path_buf())
            .unwrap_or_else(|| self.root.clone());
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Listing a directory that doesn't exist is an empty list.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let abs_path = self.absolute_path(path)?;
        let file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Ok(Box::new(file.into_std().await))
    }

    async fn create_new(&self, path: &Path, data: &[u8]) -> Result<Creation> {
        let abs_path = self.absolute_path(path)?;
        if fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)? {
            return Ok(Creation::AlreadyExists);
        }
        self.ensure_parent(&abs_path, path).await?;

        // Write the full contents somewhere private first, then hard-link into
        // place: linking fails if the target exists, and the target is never
        // visible with partial contents.
        let staging = self.staging_path();
        self.ensure_parent(&staging, path).await?;
        fs::write(&staging, data).await.map_err(|e| Self::map_io_error(e, path))?;
        let linked = fs::hard_link(&staging, &abs_path).await;
        if let Err(e) = fs::remove_file(&staging).await {
            tracing::warn!(staging = %staging.display(), error = %e, "Could not remove staging file");
        }
        match linked {
            Ok(()) => Ok(Creation::Created),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(Creation::AlreadyExists),
            Err(e) => Err(exn::Exn::from(Self::map_io_error(e, path))),
        }
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Read;
    use std::sync::Arc;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    async fn contents(backend: &LocalBackend, path: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        backend.reader(Path::new(path)).await.unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    async fn listed(backend: &LocalBackend, prefix: Option<&str>) -> Vec<FileInfo> {
        let mut files: Vec<FileInfo> = backend.list_stream(prefix.map(Path::new)).try_collect().await.unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(LocalBackend::new("name", &file).is_err());
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("data/abc");
        assert_eq!(backend.absolute_path(Path::new("data/abc")).unwrap(), expected);
        assert_eq!(backend.relative_path(&expected).unwrap(), Path::new("data/abc"));
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
        assert!(backend.relative_path(Path::new("/other/file")).is_err());
    }

    #[tokio::test]
    async fn test_create_new_is_write_once() {
        let (_dir, backend) = backend();
        let path = Path::new("data/abc");
        assert_eq!(backend.create_new(path, b"first").await.unwrap(), Creation::Created);
        assert_eq!(backend.create_new(path, b"second").await.unwrap(), Creation::AlreadyExists);
        assert_eq!(contents(&backend, "data/abc").await, b"first");
    }

    #[tokio::test]
    async fn test_reader_of_missing_file() {
        let (_dir, backend) = backend();
        let err = backend.reader(Path::new("data/missing")).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_new_cleans_up_staging() {
        let (dir, backend) = backend();
        backend.create_new(Path::new("data/abc"), b"bytes").await.unwrap();
        let staged: Vec<_> = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().collect();
        assert!(staged.is_empty());
        // Staging directory never shows up in listings.
        let files = listed(&backend, None).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, Path::new("data/abc"));
        assert_eq!(files[0].size, 5);
        assert_eq!(files[0].file_name(), Some("abc"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_create_new_concurrent_single_winner() {
        let (_dir, backend) = backend();
        let backend = Arc::new(backend);
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let backend = Arc::clone(&backend);
                tokio::spawn(async move { backend.create_new(Path::new("data/same"), b"identical").await.unwrap() })
            })
            .collect();
        let mut created = 0;
        for task in tasks {
            if task.await.unwrap() == Creation::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(contents(&backend, "data/same").await, b"identical");
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let (_dir, backend) = backend();
        assert!(!backend.exists(Path::new("data/abc")).await.unwrap());
        backend.create_new(Path::new("data/abc"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("data/abc")).await.unwrap());
        backend.delete(Path::new("data/abc")).await.unwrap();
        assert!(!backend.exists(Path::new("data/abc")).await.unwrap());
        let err = backend.delete(Path::new("data/abc")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_dir, backend) = backend();
        backend.create_new(Path::new("data/one"), b"1").await.unwrap();
        backend.create_new(Path::new("data/two"), b"2").await.unwrap();
        backend.create_new(Path::new("database/three"), b"3").await.unwrap();
        assert_eq!(listed(&backend, None).await.len(), 3);
        let paths: Vec<_> = listed(&backend, Some("data")).await.into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec![PathBuf::from("data/one"), PathBuf::from("data/two")]);
        assert!(listed(&backend, Some("nonexistent")).await.is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_dir, backend) = backend();
        assert!(backend.reader(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.exists(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.create_new(Path::new("data/../../x"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
