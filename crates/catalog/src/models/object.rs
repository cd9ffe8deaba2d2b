use crate::{Digest, MetadataRecord};
use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use hashcloud_auth::Principal;
use std::net::IpAddr;
use time::OffsetDateTime;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ObjectRow {
    pub(crate) digest: String,
    pub(crate) uploader: String,
    #[sqlx(default)]
    pub(crate) uploader_ip: Option<String>,
    pub(crate) created_at: i64,
    pub(crate) acl: String,
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) content_size: i64,
}
impl TryFrom<&MetadataRecord> for ObjectRow {
    type Error = Error;
    fn try_from(record: &MetadataRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            digest: record.digest.to_string(),
            uploader: record.uploader.to_string(),
            uploader_ip: record.uploader_ip.map(|ip| ip.to_string()),
            created_at: record.created_at.unix_timestamp(),
            acl: serde_json::to_string(&record.acl).or_raise(|| ErrorKind::InvalidData("acl"))?,
            filename: record.filename.clone(),
            content_type: record.content_type.clone(),
            content_size: i64::try_from(record.content_size).or_raise(|| ErrorKind::InvalidData("content size"))?,
        })
    }
}
impl TryFrom<ObjectRow> for MetadataRecord {
    type Error = Error;
    fn try_from(row: ObjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            digest: row.digest.parse::<Digest>()?,
            uploader: row.uploader.parse::<Principal>().or_raise(|| ErrorKind::InvalidData("uploader"))?,
            uploader_ip: row
                .uploader_ip
                .map(|ip| ip.parse::<IpAddr>().or_raise(|| ErrorKind::InvalidData("uploader ip")))
                .transpose()?,
            created_at: OffsetDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            acl: serde_json::from_str(&row.acl).or_raise(|| ErrorKind::InvalidData("acl"))?,
            filename: row.filename,
            content_type: row.content_type,
            content_size: u64::try_from(row.content_size).or_raise(|| ErrorKind::InvalidData("content size"))?,
        })
    }
}
