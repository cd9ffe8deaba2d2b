//! The object service: every externally visible operation on stored objects.
//!
//! Each operation authenticates first. Nothing is read from or written to the
//! catalog or the blob store before the request's signature has been checked
//! against the exact canonical message for that operation.

use crate::blobs::BlobStore;
use crate::error::{ErrorKind, Result};
use crate::locks::DigestLocks;
use exn::{OptionExt, ResultExt};
use futures::TryStreamExt;
use hashcloud_acl::{AclDelta, EntryOutcome, policy};
use hashcloud_auth::{Action, Authenticator, CanonicalMessage, Principal};
use hashcloud_catalog::{Digest, MetadataRecord, PublicMetadata, Repository};
use hashcloud_storage::backend::BoxSyncRead;
use hashcloud_storage::{BackendHandle, Creation};
use serde::Serialize;
use std::net::IpAddr;
use tracing::{debug, info, instrument, warn};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One file of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Payload {
    /// An empty `content_type` falls back to `application/octet-stream`.
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let content_type = content_type.into();
        Self {
            filename: filename.into(),
            content_type: match content_type.trim() {
                "" => DEFAULT_CONTENT_TYPE.to_string(),
                _ => content_type,
            },
            data: data.into(),
        }
    }

    pub fn digest(&self) -> Digest {
        Digest::of(&self.data)
    }
}

/// A blob being handed back to a reader, with what it may know about it.
pub struct Download {
    pub metadata: PublicMetadata,
    pub content: BoxSyncRead,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download").field("metadata", &self.metadata).finish_non_exhaustive()
    }
}

/// What a [`reconcile`](ObjectService::reconcile) pass cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Index rows that no longer matched an ACL entry.
    pub pruned_index_rows: u64,
    /// Blobs that had no metadata record and were deleted.
    pub orphan_blobs: Vec<Digest>,
}

/// Ingest, list, fetch, share and delete, on explicit store handles.
#[derive(Debug, Clone)]
pub struct ObjectService {
    blobs: BlobStore,
    catalog: Repository,
    authenticator: Authenticator,
    locks: DigestLocks,
}

impl ObjectService {
    pub fn new(backend: BackendHandle, catalog: Repository) -> Self {
        Self {
            blobs: BlobStore::new(backend),
            catalog,
            authenticator: Authenticator,
            locks: DigestLocks::new(),
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn catalog(&self) -> &Repository {
        &self.catalog
    }

    fn authenticate(&self, message: &CanonicalMessage, signature: &[u8], principal: &Principal) -> Result<()> {
        if !self.authenticator.verify(message, signature, principal) {
            warn!(action = %message.action(), %principal, "Rejected request with invalid signature");
            exn::bail!(ErrorKind::Forbidden);
        }
        Ok(())
    }

    async fn record(&self, digest: &Digest) -> Result<MetadataRecord> {
        self.catalog
            .get(digest)
            .await
            .or_raise(|| ErrorKind::Internal)?
            .ok_or_raise(|| ErrorKind::NotFound)
    }

    // =========================================================================
    // Ingest
    // =========================================================================

    /// Store one or more payloads on behalf of `uploader`.
    ///
    /// The signature must cover `upload+<digest>+...` with the payloads'
    /// digests in upload order. Content that is already stored is not
    /// re-owned. Returns the digests for which a new record was created.
    #[instrument(skip_all, fields(%uploader, payloads = payloads.len()))]
    pub async fn ingest(
        &self,
        uploader: &Principal,
        signature: &[u8],
        origin: Option<IpAddr>,
        payloads: Vec<Payload>,
    ) -> Result<Vec<Digest>> {
        if payloads.is_empty() {
            exn::bail!(ErrorKind::BadRequest("upload contains no files".to_string()));
        }
        let digests: Vec<Digest> = payloads.iter().map(Payload::digest).collect();
        self.authenticate(&CanonicalMessage::new(Action::Upload, &digests), signature, uploader)?;

        let mut created = Vec::new();
        for (payload, digest) in payloads.into_iter().zip(digests) {
            let _guard = self.locks.lock(&digest).await;
            // Blob before record: a record must never point at missing bytes.
            let blob = self.blobs.put(&digest, &payload.data).await.or_raise(|| ErrorKind::Internal)?;
            let record = MetadataRecord::new(
                digest,
                *uploader,
                origin,
                payload.filename,
                payload.content_type,
                payload.data.len() as u64,
            );
            if self.catalog.insert(&record).await.or_raise(|| ErrorKind::Internal)? {
                info!(%digest, fresh_blob = blob == Creation::Created, "Stored new object");
                created.push(digest);
                continue;
            }
            debug!(%digest, "Content already stored");
            if let Some(existing) = self.catalog.get(&digest).await.or_raise(|| ErrorKind::Internal)?
                && existing.acl.contains(uploader)
            {
                self.catalog.ensure_indexed(uploader, &digest).await.or_raise(|| ErrorKind::Internal)?;
            }
        }
        Ok(created)
    }

    // =========================================================================
    // List
    // =========================================================================

    /// Objects visible to `principal`, oldest first.
    #[instrument(skip_all, fields(%principal))]
    pub async fn list(&self, principal: &Principal, signature: &[u8]) -> Result<Vec<PublicMetadata>> {
        self.authenticate(&CanonicalMessage::new(Action::List, [principal]), signature, principal)?;
        let records = self.catalog.list_for_principal(principal).await.or_raise(|| ErrorKind::Internal)?;
        Ok(records
            .iter()
            .filter(|record| policy::can_read(&record.acl, principal))
            .map(|record| record.public_for(principal))
            .collect())
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Open an object's bytes for a reader.
    #[instrument(skip_all, fields(%digest, %principal))]
    pub async fn fetch(&self, digest: &Digest, principal: &Principal, signature: &[u8]) -> Result<Download> {
        self.authenticate(&CanonicalMessage::new(Action::Download, [digest]), signature, principal)?;
        let record = self.record(digest).await?;
        if !policy::can_read(&record.acl, principal) {
            exn::bail!(ErrorKind::Forbidden);
        }
        let Some(content) = self.blobs.open(digest).await.or_raise(|| ErrorKind::Internal)? else {
            warn!("Metadata record has no blob");
            exn::bail!(ErrorKind::NotFound);
        };
        Ok(Download {
            metadata: record.public_for(principal),
            content,
        })
    }

    // =========================================================================
    // Share
    // =========================================================================

    /// Apply an ACL delta on behalf of `principal`.
    ///
    /// Succeeds as a whole once the caller may share the object; each entry
    /// of the delta is then applied or refused on its own and reported back.
    #[instrument(skip_all, fields(%digest, %principal, entries = delta.len()))]
    pub async fn share(
        &self,
        digest: &Digest,
        principal: &Principal,
        signature: &[u8],
        delta: &AclDelta,
    ) -> Result<Vec<EntryOutcome>> {
        self.authenticate(&CanonicalMessage::new(Action::Share, [digest]), signature, principal)?;
        let _guard = self.locks.lock(digest).await;
        let mut record = self.record(digest).await?;
        if !policy::can_share(&record.acl, principal) {
            exn::bail!(ErrorKind::Forbidden);
        }
        let outcomes = policy::apply_delta(&mut record.acl, principal, delta);
        let applied = outcomes.iter().filter(|outcome| outcome.is_applied()).count();
        if applied > 0 && !self.catalog.replace_acl(digest, &record.acl).await.or_raise(|| ErrorKind::Internal)? {
            exn::bail!(ErrorKind::NotFound);
        }
        info!(applied, refused = outcomes.len() - applied, "Updated access control list");
        Ok(outcomes)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove an object entirely: index rows, record, then blob.
    #[instrument(skip_all, fields(%digest, %principal))]
    pub async fn delete(&self, digest: &Digest, principal: &Principal, signature: &[u8]) -> Result<()> {
        self.authenticate(&CanonicalMessage::new(Action::Delete, [digest]), signature, principal)?;
        let _guard = self.locks.lock(digest).await;
        let record = self.record(digest).await?;
        if !policy::can_delete(&record.acl, principal) {
            exn::bail!(ErrorKind::Forbidden);
        }
        self.catalog.delete(digest).await.or_raise(|| ErrorKind::Internal)?;
        // A blob left behind here is inert; reconcile collects it.
        if let Err(e) = self.blobs.remove(digest).await {
            warn!(error = ?e, "Could not remove blob of deleted object");
        }
        info!("Deleted object");
        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop index rows that no longer match an ACL and delete blobs that
    /// have no metadata record.
    ///
    /// An operator task; it takes no signature.
    #[instrument(skip_all)]
    pub async fn reconcile(&self) -> Result<Reconciliation> {
        let pruned_index_rows = self.catalog.prune_dangling_index().await.or_raise(|| ErrorKind::Internal)?;
        let stored: Vec<Digest> = self.blobs.digests().try_collect().await.or_raise(|| ErrorKind::Internal)?;
        let mut orphan_blobs = Vec::new();
        for digest in stored {
            let _guard = self.locks.lock(&digest).await;
            if self.catalog.contains(&digest).await.or_raise(|| ErrorKind::Internal)? {
                continue;
            }
            if self.blobs.remove(&digest).await.or_raise(|| ErrorKind::Internal)? {
                orphan_blobs.push(digest);
            }
        }
        info!(pruned_index_rows, orphan_blobs = orphan_blobs.len(), "Reconciled stores");
        Ok(Reconciliation {
            pruned_index_rows,
            orphan_blobs,
        })
    }
}
