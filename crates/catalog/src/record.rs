use crate::digest::Digest;
use hashcloud_acl::{Acl, policy};
use hashcloud_auth::Principal;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use time::OffsetDateTime;

/// Everything known about a stored object. One per digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub digest: Digest,
    pub uploader: Principal,
    /// Address the first upload came from. Kept internal.
    pub uploader_ip: Option<IpAddr>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub acl: Acl,
    pub filename: String,
    pub content_type: String,
    pub content_size: u64,
}

impl MetadataRecord {
    /// A record for freshly ingested content, owned by its uploader.
    pub fn new(
        digest: Digest,
        uploader: Principal,
        uploader_ip: Option<IpAddr>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content_size: u64,
    ) -> Self {
        Self {
            digest,
            uploader,
            uploader_ip,
            created_at: OffsetDateTime::now_utc(),
            acl: Acl::with_owner(uploader),
            filename: filename.into(),
            content_type: content_type.into(),
            content_size,
        }
    }

    /// The view of this record `viewer` is allowed to see. The ACL is only
    /// disclosed to principals who may change it.
    pub fn public_for(&self, viewer: &Principal) -> PublicMetadata {
        PublicMetadata {
            digest: self.digest,
            created_at: self.created_at,
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            content_size: self.content_size,
            acl: policy::can_share(&self.acl, viewer).then(|| self.acl.clone()),
        }
    }
}

/// The subset of a [`MetadataRecord`] safe to hand back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicMetadata {
    #[serde(rename = "hash")]
    pub digest: Digest,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub filename: String,
    pub content_type: String,
    pub content_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Acl>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashcloud_acl::Role;

    const OWNER: Principal = Principal::from_bytes([0xaa; 20]);
    const VIEWER: Principal = Principal::from_bytes([0xbb; 20]);

    fn record() -> MetadataRecord {
        let mut record = MetadataRecord::new(
            Digest::of(b"hello"),
            OWNER,
            Some("192.0.2.7".parse().unwrap()),
            "hello.txt",
            "text/plain",
            5,
        );
        record.acl.set(VIEWER, Role::Viewer);
        record
    }

    #[test]
    fn test_new_record_is_owned_by_uploader() {
        let record = MetadataRecord::new(Digest::of(b"x"), OWNER, None, "x", "application/octet-stream", 1);
        assert_eq!(record.acl, Acl::with_owner(OWNER));
    }

    #[test]
    fn test_projection_hides_ip_and_acl_from_viewers() {
        let public = record().public_for(&VIEWER);
        assert!(public.acl.is_none());
        let json = serde_json::to_value(&public).unwrap();
        assert_eq!(json["hash"], Digest::of(b"hello").to_string());
        assert_eq!(json["filename"], "hello.txt");
        assert_eq!(json["contentType"], "text/plain");
        assert_eq!(json["contentSize"], 5);
        assert!(json.get("acl").is_none());
        assert!(!json.to_string().contains("192.0.2.7"));
    }

    #[test]
    fn test_projection_shows_acl_to_sharers() {
        let public = record().public_for(&OWNER);
        assert_eq!(public.acl.unwrap().role(&VIEWER), Role::Viewer);
    }
}
