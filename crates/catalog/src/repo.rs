//! Metadata records and the principal index, kept consistent with each other.
//!
//! Every write that touches both tables happens inside one transaction, so
//! an ACL and the index rows derived from it never disagree after a commit.

use crate::Database;
use crate::digest::Digest;
use crate::error::{ErrorKind, Result};
use crate::models::ObjectRow;
use crate::record::MetadataRecord;
use exn::ResultExt;
use hashcloud_acl::Acl;
use hashcloud_auth::Principal;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, instrument};

/// Repository over the `objects` and `principal_index` tables.
///
/// # Relationships
///
/// - One metadata record per digest, created once and never re-owned
/// - One index row per `(principal, digest)` for every principal in that
///   digest's ACL
/// - Index rows are a lookup aid only: access decisions read the ACL
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a transaction that holds the write lock from its first statement.
    ///
    /// A deferred transaction that reads before writing cannot be upgraded
    /// once another connection has committed in between, and SQLite fails
    /// that upgrade immediately instead of waiting out the busy timeout.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin_with("BEGIN IMMEDIATE").await.or_raise(|| ErrorKind::Database)
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert a record unless one already exists for its digest.
    ///
    /// The uploader's index row is written in the same transaction. Returns
    /// `true` if the record was created, `false` if the digest was already
    /// known (the existing record is left untouched).
    #[instrument(level = "debug", skip_all, fields(digest = %record.digest))]
    pub async fn insert(&self, record: &MetadataRecord) -> Result<bool> {
        let row = ObjectRow::try_from(record)?;
        let mut tx = self.begin_write().await?;
        let result = sqlx::query(include_str!("../queries/insert_object.sql"))
            .bind(&row.digest)
            .bind(&row.uploader)
            .bind(&row.uploader_ip)
            .bind(row.created_at)
            .bind(&row.acl)
            .bind(&row.filename)
            .bind(&row.content_type)
            .bind(row.content_size)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let created = result.rows_affected() > 0;
        if created {
            for principal in record.acl.principals() {
                Self::index(&mut tx, principal, &record.digest).await?;
            }
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        debug!(created, "stored metadata record");
        Ok(created)
    }

    /// Make sure `principal` has an index row for `digest`.
    pub async fn ensure_indexed(&self, principal: &Principal, digest: &Digest) -> Result<()> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        Self::index(&mut conn, principal, digest).await
    }

    async fn index(conn: &mut SqliteConnection, principal: &Principal, digest: &Digest) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_index.sql"))
            .bind(principal.to_string())
            .bind(digest.to_string())
            .execute(conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn unindex(conn: &mut SqliteConnection, principal: &Principal, digest: &Digest) -> Result<()> {
        sqlx::query(include_str!("../queries/delete_index.sql"))
            .bind(principal.to_string())
            .bind(digest.to_string())
            .execute(conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    pub async fn get(&self, digest: &Digest) -> Result<Option<MetadataRecord>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        Self::fetch(&mut conn, digest).await
    }

    async fn fetch(conn: &mut SqliteConnection, digest: &Digest) -> Result<Option<MetadataRecord>> {
        let row: Option<ObjectRow> = sqlx::query_as(include_str!("../queries/get_object.sql"))
            .bind(digest.to_string())
            .fetch_optional(conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(MetadataRecord::try_from).transpose()
    }

    pub async fn contains(&self, digest: &Digest) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(include_str!("../queries/contains_object.sql"))
            .bind(digest.to_string())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(exists)
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Records reachable through `principal`'s index rows, oldest first.
    ///
    /// Index rows whose record no longer exists are skipped.
    pub async fn list_for_principal(&self, principal: &Principal) -> Result<Vec<MetadataRecord>> {
        let rows: Vec<ObjectRow> = sqlx::query_as(include_str!("../queries/list_for_principal.sql"))
            .bind(principal.to_string())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(MetadataRecord::try_from).collect()
    }

    /// Digests in `principal`'s index, whether or not their record exists.
    pub async fn indexed_digests(&self, principal: &Principal) -> Result<Vec<Digest>> {
        let digests: Vec<String> = sqlx::query_scalar(include_str!("../queries/list_indexed_digests.sql"))
            .bind(principal.to_string())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        digests.iter().map(|digest| digest.parse::<Digest>()).collect()
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Overwrite a record's ACL and bring the index in line with it.
    ///
    /// Principals that left the ACL lose their index row; principals that
    /// joined gain one. Returns `false` if no record exists for `digest`.
    #[instrument(level = "debug", skip_all, fields(%digest))]
    pub async fn replace_acl(&self, digest: &Digest, acl: &Acl) -> Result<bool> {
        let encoded = serde_json::to_string(acl).or_raise(|| ErrorKind::InvalidData("acl"))?;
        let mut tx = self.begin_write().await?;
        let Some(previous) = Self::fetch(&mut tx, digest).await? else {
            return Ok(false);
        };
        sqlx::query(include_str!("../queries/update_acl.sql"))
            .bind(encoded)
            .bind(digest.to_string())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for principal in previous.acl.principals().filter(|p| !acl.contains(p)) {
            Self::unindex(&mut tx, principal, digest).await?;
        }
        for principal in acl.principals().filter(|p| !previous.acl.contains(p)) {
            Self::index(&mut tx, principal, digest).await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(true)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a record and every index row pointing at it.
    ///
    /// Returns `true` if a record was deleted.
    #[instrument(level = "debug", skip_all, fields(%digest))]
    pub async fn delete(&self, digest: &Digest) -> Result<bool> {
        let mut tx = self.begin_write().await?;
        let unindexed = sqlx::query(include_str!("../queries/delete_index_for_digest.sql"))
            .bind(digest.to_string())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let deleted = sqlx::query(include_str!("../queries/delete_object.sql"))
            .bind(digest.to_string())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        debug!(index_rows = unindexed.rows_affected(), "deleted metadata record");
        Ok(deleted.rows_affected() > 0)
    }

    /// Delete index rows that no longer match any ACL entry.
    ///
    /// Returns the number of rows removed.
    pub async fn prune_dangling_index(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/prune_dangling_index.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashcloud_acl::Role;

    const ALICE: Principal = Principal::from_bytes([0xaa; 20]);
    const BOB: Principal = Principal::from_bytes([0xbb; 20]);
    const CAROL: Principal = Principal::from_bytes([0xcc; 20]);

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    fn record(data: &[u8], uploader: Principal) -> MetadataRecord {
        MetadataRecord::new(Digest::of(data), uploader, None, "file.bin", "application/octet-stream", data.len() as u64)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = repo().await;
        let record = record(b"hello", ALICE);
        assert!(repo.insert(&record).await.unwrap());
        let stored = repo.get(&record.digest).await.unwrap().unwrap();
        assert_eq!(stored.acl, Acl::with_owner(ALICE));
        assert_eq!(stored.created_at.unix_timestamp(), record.created_at.unix_timestamp());
        assert!(repo.contains(&record.digest).await.unwrap());
        assert_eq!(repo.indexed_digests(&ALICE).await.unwrap(), vec![record.digest]);
    }

    #[tokio::test]
    async fn test_insert_is_create_once() {
        let repo = repo().await;
        assert!(repo.insert(&record(b"hello", ALICE)).await.unwrap());
        // Same bytes from somebody else: no re-ownership, no index row.
        assert!(!repo.insert(&record(b"hello", BOB)).await.unwrap());
        let stored = repo.get(&Digest::of(b"hello")).await.unwrap().unwrap();
        assert_eq!(stored.uploader, ALICE);
        assert_eq!(stored.acl.role(&BOB), Role::None);
        assert!(repo.indexed_digests(&BOB).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let repo = repo().await;
        assert!(repo.get(&Digest::of(b"nothing")).await.unwrap().is_none());
        assert!(!repo.contains(&Digest::of(b"nothing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_acl_updates_index() {
        let repo = repo().await;
        let record = record(b"hello", ALICE);
        repo.insert(&record).await.unwrap();

        let mut acl = record.acl.clone();
        acl.set(BOB, Role::Viewer);
        acl.set(CAROL, Role::Manager);
        assert!(repo.replace_acl(&record.digest, &acl).await.unwrap());
        assert_eq!(repo.list_for_principal(&BOB).await.unwrap().len(), 1);
        assert_eq!(repo.list_for_principal(&CAROL).await.unwrap().len(), 1);

        acl.set(BOB, Role::None);
        assert!(repo.replace_acl(&record.digest, &acl).await.unwrap());
        assert!(repo.indexed_digests(&BOB).await.unwrap().is_empty());
        let stored = repo.get(&record.digest).await.unwrap().unwrap();
        assert_eq!(stored.acl, acl);
    }

    #[tokio::test]
    async fn test_replace_acl_on_missing_record() {
        let repo = repo().await;
        assert!(!repo.replace_acl(&Digest::of(b"gone"), &Acl::with_owner(ALICE)).await.unwrap());
        assert!(repo.indexed_digests(&ALICE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_index() {
        let repo = repo().await;
        let record = record(b"hello", ALICE);
        repo.insert(&record).await.unwrap();
        let mut acl = record.acl.clone();
        acl.set(BOB, Role::Viewer);
        repo.replace_acl(&record.digest, &acl).await.unwrap();

        assert!(repo.delete(&record.digest).await.unwrap());
        assert!(repo.get(&record.digest).await.unwrap().is_none());
        assert!(repo.indexed_digests(&ALICE).await.unwrap().is_empty());
        assert!(repo.indexed_digests(&BOB).await.unwrap().is_empty());
        assert!(!repo.delete(&record.digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_skips_and_prunes_dangling_rows() {
        let repo = repo().await;
        let kept = record(b"kept", ALICE);
        repo.insert(&kept).await.unwrap();
        // Rows pointing at an unknown object, and at an object whose ACL
        // does not mention the principal.
        repo.ensure_indexed(&ALICE, &Digest::of(b"ghost")).await.unwrap();
        repo.ensure_indexed(&BOB, &kept.digest).await.unwrap();

        let listed = repo.list_for_principal(&ALICE).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].digest, kept.digest);
        assert_eq!(repo.indexed_digests(&ALICE).await.unwrap().len(), 2);

        assert_eq!(repo.prune_dangling_index().await.unwrap(), 2);
        assert_eq!(repo.indexed_digests(&ALICE).await.unwrap(), vec![kept.digest]);
        assert!(repo.indexed_digests(&BOB).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_indexed_is_idempotent() {
        let repo = repo().await;
        let record = record(b"hello", ALICE);
        repo.insert(&record).await.unwrap();
        repo.ensure_indexed(&ALICE, &record.digest).await.unwrap();
        repo.ensure_indexed(&ALICE, &record.digest).await.unwrap();
        assert_eq!(repo.indexed_digests(&ALICE).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acl_updates_on_distinct_digests() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("catalog.sqlite")).await.unwrap();
        let repo = Repository::from(&db);
        let records: Vec<_> = (0..24u8).map(|n| record(&[n; 8], ALICE)).collect();
        for record in &records {
            repo.insert(record).await.unwrap();
        }

        let tasks: Vec<_> = records
            .into_iter()
            .enumerate()
            .map(|(n, record)| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let mut acl = record.acl.clone();
                    for round in 0..5u8 {
                        let grantee = Principal::from_bytes([round; 20]);
                        acl.set(grantee, Role::Viewer);
                        repo.replace_acl(&record.digest, &acl).await.unwrap();
                        // Unrelated inserts commit in between reads and writes.
                        repo.insert(&self::record(&[n as u8, round, 0xff], BOB)).await.unwrap();
                    }
                    record.digest
                })
            })
            .collect();
        for task in tasks {
            let digest = task.await.unwrap();
            assert_eq!(repo.get(&digest).await.unwrap().unwrap().acl.len(), 6);
        }
        assert_eq!(repo.indexed_digests(&Principal::from_bytes([4; 20])).await.unwrap().len(), 24);
        db.close().await;
    }
}
