//! Handle bound to a single bucket

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWrite;

use crate::config::ClientConfig;
use crate::s3::client::{Client, ListObjects};
use crate::s3::error::Result;
use crate::s3::serializer::{Codec, Serializer};
use crate::s3::types::{
    GetObjectOptions, ListObjectsOptions, MakeBucketOptions, Object, ObjectInfo,
    PutObjectOptions, RemoveObjectOptions, UploadInfo,
};

/// [`Client`] operations with the bucket name filled in
///
/// Handles are cheap to create and share the owning client's connection.
/// Value operations use the handle's own serializer, which starts as the
/// client's unless one was given at creation.
#[derive(Debug, Clone)]
pub struct Bucket<S = Codec> {
    client: Client<S>,
    name: String,
    serializer: S,
}

impl Bucket<Codec> {
    /// Build a client from `config` and bind it to `name`
    pub fn connect(config: &ClientConfig, name: impl Into<String>) -> Result<Self> {
        Ok(Client::new(config)?.bucket(name))
    }
}

impl<S: Serializer> Bucket<S> {
    pub(crate) fn new(client: Client<S>, name: String, serializer: S) -> Self {
        Self {
            client,
            name,
            serializer,
        }
    }

    /// Bucket this handle is bound to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client the handle delegates to
    pub fn client(&self) -> &Client<S> {
        &self.client
    }

    /// Serializer used by value operations on this handle
    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Replace this handle's serializer; the client is unaffected
    pub fn set_serializer(&mut self, serializer: S) {
        self.serializer = serializer;
    }

    /// Create the bucket unless it already exists
    pub async fn ensure(&self, opts: &MakeBucketOptions) -> Result<()> {
        self.client.ensure_bucket(&self.name, opts).await
    }

    /// Check whether the bucket exists
    pub async fn exists(&self) -> Result<bool> {
        self.client.bucket_exists(&self.name).await
    }

    /// Delete the bucket; it must be empty
    pub async fn remove(&self) -> Result<()> {
        self.client.remove_bucket(&self.name).await
    }

    /// List the bucket lazily; see [`Client::list_objects`]
    pub fn list_objects(&self, opts: ListObjectsOptions) -> ListObjects {
        self.client.list_objects(&self.name, opts)
    }

    /// Fetch object metadata without the body
    pub async fn stat_object(&self, key: &str, opts: &GetObjectOptions) -> Result<ObjectInfo> {
        self.client.stat_object(&self.name, key, opts).await
    }

    /// Open an object for reading
    pub async fn get_object(&self, key: &str, opts: &GetObjectOptions) -> Result<Object> {
        self.client.get_object(&self.name, key, opts).await
    }

    /// Delete an object (or one version of it)
    pub async fn remove_object(&self, key: &str, opts: &RemoveObjectOptions) -> Result<()> {
        self.client.remove_object(&self.name, key, opts).await
    }

    /// Upload bytes as-is
    pub async fn put_bytes(
        &self,
        key: &str,
        data: impl Into<Bytes>,
        opts: &PutObjectOptions,
    ) -> Result<UploadInfo> {
        self.client.put_bytes(&self.name, key, data, opts).await
    }

    /// Encode `value` with this handle's serializer and upload it
    pub async fn put<T>(&self, key: &str, value: &T, opts: &PutObjectOptions) -> Result<UploadInfo>
    where
        T: Serialize + ?Sized,
    {
        self.client
            .put_with(&self.name, key, value, opts, &self.serializer)
            .await
    }

    /// Encode `value` with `serializer` for this call only and upload it
    pub async fn put_with<T, O>(
        &self,
        key: &str,
        value: &T,
        opts: &PutObjectOptions,
        serializer: &O,
    ) -> Result<UploadInfo>
    where
        T: Serialize + ?Sized,
        O: Serializer,
    {
        self.client
            .put_with(&self.name, key, value, opts, serializer)
            .await
    }

    /// Copy the whole object body into `dst`, returning the byte count
    pub async fn read_bytes<W>(&self, key: &str, dst: &mut W, opts: &GetObjectOptions) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.client.read_bytes(&self.name, key, dst, opts).await
    }

    /// Fetch an object and decode it with this handle's serializer
    pub async fn read<T: DeserializeOwned>(&self, key: &str, opts: &GetObjectOptions) -> Result<T> {
        self.client
            .read_with(&self.name, key, opts, &self.serializer)
            .await
    }

    /// Fetch an object and decode it with `serializer` for this call only
    pub async fn read_with<T, O>(&self, key: &str, opts: &GetObjectOptions, serializer: &O) -> Result<T>
    where
        T: DeserializeOwned,
        O: Serializer,
    {
        self.client.read_with(&self.name, key, opts, serializer).await
    }
}
