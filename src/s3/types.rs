//! S3 data types: per-request options and the records returned by the store

use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::AsyncBufRead;

use crate::s3::error::{Error, Result};

/// Options for bucket creation
#[derive(Debug, Clone, Default)]
pub struct MakeBucketOptions {
    /// Location constraint; `None` or `us-east-1` sends none
    pub region: Option<String>,
    pub object_locking: bool,
}

impl MakeBucketOptions {
    pub fn region(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..Default::default()
        }
    }
}

/// Options applied to an upload
#[derive(Debug, Clone, Default)]
pub struct PutObjectOptions {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub storage_class: Option<String>,
    /// Stored as `x-amz-meta-*` headers
    pub user_metadata: HashMap<String, String>,
}

/// Options for fetching or stat-ing an object
#[derive(Debug, Clone, Default)]
pub struct GetObjectOptions {
    pub version_id: Option<String>,
    /// Raw HTTP range, e.g. `bytes=0-99`
    pub range: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

/// Options for listing a bucket
#[derive(Debug, Clone, Default)]
pub struct ListObjectsOptions {
    pub prefix: Option<String>,
    pub start_after: Option<String>,
    /// List every key under the prefix instead of one folder level
    pub recursive: bool,
    /// Keys requested per page; the store picks when `None`
    pub page_size: Option<i32>,
}

impl ListObjectsOptions {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoveObjectOptions {
    pub version_id: Option<String>,
    pub bypass_governance: bool,
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    pub bucket: String,
    pub key: String,
    pub etag: Option<String>,
    pub size: u64,
    pub version_id: Option<String>,
}

/// Metadata of an object (or a folder prefix in non-recursive listings)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub storage_class: Option<String>,
    pub version_id: Option<String>,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    pub is_folder: bool,
}

impl ObjectInfo {
    pub(crate) fn folder(prefix: &str) -> Self {
        Self {
            key: prefix.to_string(),
            is_folder: true,
            ..Default::default()
        }
    }

    pub(crate) fn from_listing(obj: &aws_sdk_s3::types::Object) -> Self {
        Self {
            key: obj.key().unwrap_or_default().to_string(),
            size: obj.size().unwrap_or(0).max(0) as u64,
            last_modified: obj.last_modified().and_then(to_utc),
            etag: obj.e_tag().map(trim_etag),
            storage_class: obj.storage_class().map(|s| s.as_str().to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn from_head(key: &str, out: &aws_sdk_s3::operation::head_object::HeadObjectOutput) -> Self {
        Self {
            key: key.to_string(),
            size: out.content_length().unwrap_or(0).max(0) as u64,
            last_modified: out.last_modified().and_then(to_utc),
            etag: out.e_tag().map(trim_etag),
            content_type: out.content_type().map(str::to_string),
            storage_class: out.storage_class().map(|s| s.as_str().to_string()),
            version_id: out.version_id().map(str::to_string),
            user_metadata: out.metadata().cloned().unwrap_or_default(),
            is_folder: false,
        }
    }

    pub(crate) fn from_get(key: &str, out: &aws_sdk_s3::operation::get_object::GetObjectOutput) -> Self {
        Self {
            key: key.to_string(),
            size: out.content_length().unwrap_or(0).max(0) as u64,
            last_modified: out.last_modified().and_then(to_utc),
            etag: out.e_tag().map(trim_etag),
            content_type: out.content_type().map(str::to_string),
            storage_class: out.storage_class().map(|s| s.as_str().to_string()),
            version_id: out.version_id().map(str::to_string),
            user_metadata: out.metadata().cloned().unwrap_or_default(),
            is_folder: false,
        }
    }
}

/// A fetched object: its metadata plus the unread body
///
/// The body holds the network response open until it is consumed or dropped.
#[derive(Debug)]
pub struct Object {
    pub info: ObjectInfo,
    body: ByteStream,
}

impl Object {
    pub(crate) fn new(info: ObjectInfo, body: ByteStream) -> Self {
        Self { info, body }
    }

    /// Stream the body through tokio's IO traits
    pub fn into_async_read(self) -> impl AsyncBufRead + Send {
        self.body.into_async_read()
    }

    /// Read the whole body into memory
    pub async fn bytes(self) -> Result<Bytes> {
        let data = self
            .body
            .collect()
            .await
            .map_err(|e| Error::transfer("GetObject", e))?;
        Ok(data.into_bytes())
    }
}

/// Convert an SDK timestamp; `None` when out of chrono's range
pub(crate) fn to_utc(d: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(d.secs(), d.subsec_nanos())
}

/// S3 returns ETags wrapped in double quotes
pub(crate) fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}
