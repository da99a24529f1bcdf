//! Storage client wrapper with value (de)serialization

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, StorageClass};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::VecDeque;
use tokio::io::AsyncWrite;

use crate::config::{ClientConfig, DEFAULT_REGION};
use crate::s3::bucket::Bucket;
use crate::s3::error::{Error, Result};
use crate::s3::serializer::{Codec, Serializer};
use crate::s3::types::{
    trim_etag, GetObjectOptions, ListObjectsOptions, MakeBucketOptions, Object, ObjectInfo,
    PutObjectOptions, RemoveObjectOptions, UploadInfo,
};

/// Lazy listing of a bucket; ends after the last page or the first error
pub type ListObjects = BoxStream<'static, Result<ObjectInfo>>;

/// S3 client wrapper with bucket helpers and a default serializer
///
/// Cloning is cheap: clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Client<S = Codec> {
    client: aws_sdk_s3::Client,
    serializer: S,
    /// Signing region, used as the default location for new buckets
    region: Option<String>,
}

impl Client<Codec> {
    /// Connect with static credentials, using the codec named in the config
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_config(config, config.codec)
    }

    /// Connect with ambient AWS credentials (environment, profile files, instance roles)
    pub async fn from_profile(profile_name: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(profile) = profile_name {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        tracing::debug!(
            "Loaded AWS config: profile={:?}, region={:?}",
            profile_name,
            config.region().map(|r| r.to_string())
        );

        Self::from_sdk(aws_sdk_s3::Client::new(&config), Codec::default())
    }
}

impl<S: Serializer> Client<S> {
    /// Connect with static credentials and an explicit default serializer
    pub fn with_config(config: &ClientConfig, serializer: S) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .map_err(|source| Error::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                source,
            })?;

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            config.session_token.clone(),
            None,
            "s3-store",
        );

        let sdk_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(endpoint.as_str().trim_end_matches('/'))
            .force_path_style(config.force_path_style)
            .build();

        tracing::debug!(
            "Created S3 client: endpoint={}, region={}, codec={}",
            endpoint,
            config.region,
            serializer.name()
        );

        Ok(Self::from_sdk(
            aws_sdk_s3::Client::from_conf(sdk_config),
            serializer,
        ))
    }

    /// Wrap an already configured SDK client
    pub fn from_sdk(client: aws_sdk_s3::Client, serializer: S) -> Self {
        let region = client.config().region().map(|r| r.to_string());
        Self {
            client,
            serializer,
            region,
        }
    }

    /// The underlying SDK client, for operations this wrapper does not cover
    pub fn sdk(&self) -> &aws_sdk_s3::Client {
        &self.client
    }

    /// Region the client signs requests for
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Default serializer for value operations
    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Replace the default serializer
    pub fn set_serializer(&mut self, serializer: S) {
        self.serializer = serializer;
    }

    /// Builder form of [`Client::set_serializer`]
    pub fn with_serializer(mut self, serializer: S) -> Self {
        self.serializer = serializer;
        self
    }

    /// Handle bound to one bucket, inheriting this client's serializer
    pub fn bucket(&self, name: impl Into<String>) -> Bucket<S> {
        Bucket::new(self.clone(), name.into(), self.serializer.clone())
    }

    /// Handle bound to one bucket with its own serializer
    pub fn bucket_with(&self, name: impl Into<String>, serializer: S) -> Bucket<S> {
        Bucket::new(self.clone(), name.into(), serializer)
    }

    // Bucket lifecycle

    /// Check whether a bucket exists; a 404 answer means it does not
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        tracing::debug!("HeadBucket {}", bucket);
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = Error::sdk("HeadBucket", err);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Create a bucket in `opts.region`, or in the client's region when unset
    pub async fn make_bucket(&self, bucket: &str, opts: &MakeBucketOptions) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // S3 rejects an explicit constraint for its default region
        let region = opts.region.as_deref().or(self.region.as_deref());
        if let Some(region) = region.filter(|r| *r != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        if opts.object_locking {
            request = request.object_lock_enabled_for_bucket(true);
        }

        request
            .send()
            .await
            .map_err(|e| Error::sdk("CreateBucket", e))?;

        tracing::info!("Created bucket {}", bucket);
        Ok(())
    }

    /// Create the bucket unless it already exists
    pub async fn ensure_bucket(&self, bucket: &str, opts: &MakeBucketOptions) -> Result<()> {
        if self.bucket_exists(bucket).await? {
            tracing::debug!("Bucket {} already exists", bucket);
            return Ok(());
        }
        self.make_bucket(bucket, opts).await
    }

    /// Delete an empty bucket
    pub async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        tracing::debug!("DeleteBucket {}", bucket);
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Error::sdk("DeleteBucket", e))?;
        Ok(())
    }

    // Object metadata

    /// List objects lazily, fetching pages as the stream is polled
    ///
    /// Each call starts a fresh listing. Without `recursive`, keys are grouped
    /// by `/` and folder prefixes are yielded before the page's objects.
    pub fn list_objects(&self, bucket: &str, opts: ListObjectsOptions) -> ListObjects {
        let state = ListState {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            opts,
            token: None,
            pending: VecDeque::new(),
            done: false,
        };
        stream::try_unfold(state, ListState::next_entry).boxed()
    }

    /// Fetch object metadata without the body
    pub async fn stat_object(
        &self,
        bucket: &str,
        key: &str,
        opts: &GetObjectOptions,
    ) -> Result<ObjectInfo> {
        tracing::debug!("HeadObject {}/{}", bucket, key);
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(opts.version_id.clone())
            .set_range(opts.range.clone())
            .set_if_match(opts.if_match.clone())
            .set_if_none_match(opts.if_none_match.clone())
            .send()
            .await
            .map_err(|e| Error::sdk("HeadObject", e))?;

        Ok(ObjectInfo::from_head(key, &response))
    }

    /// Delete an object (or one version of it)
    pub async fn remove_object(
        &self,
        bucket: &str,
        key: &str,
        opts: &RemoveObjectOptions,
    ) -> Result<()> {
        tracing::debug!("DeleteObject {}/{}", bucket, key);
        let mut request = self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(opts.version_id.clone());
        if opts.bypass_governance {
            request = request.bypass_governance_retention(true);
        }

        request
            .send()
            .await
            .map_err(|e| Error::sdk("DeleteObject", e))?;
        Ok(())
    }

    // Raw bytes

    /// Open an object for reading; the body is released when the result is dropped
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        opts: &GetObjectOptions,
    ) -> Result<Object> {
        tracing::debug!("GetObject {}/{}", bucket, key);
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(opts.version_id.clone())
            .set_range(opts.range.clone())
            .set_if_match(opts.if_match.clone())
            .set_if_none_match(opts.if_none_match.clone())
            .send()
            .await
            .map_err(|e| Error::sdk("GetObject", e))?;

        let info = ObjectInfo::from_get(key, &response);
        Ok(Object::new(info, response.body))
    }

    /// Upload bytes as-is
    pub async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        opts: &PutObjectOptions,
    ) -> Result<UploadInfo> {
        let data: Bytes = data.into();
        let size = data.len() as u64;
        tracing::debug!("PutObject {}/{} ({} bytes)", bucket, key, size);

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(size as i64)
            .set_content_type(opts.content_type.clone())
            .set_content_encoding(opts.content_encoding.clone())
            .set_content_disposition(opts.content_disposition.clone())
            .set_cache_control(opts.cache_control.clone())
            .body(ByteStream::from(data));
        if let Some(class) = &opts.storage_class {
            request = request.storage_class(StorageClass::from(class.as_str()));
        }
        if !opts.user_metadata.is_empty() {
            request = request.set_metadata(Some(opts.user_metadata.clone()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::sdk("PutObject", e))?;

        Ok(UploadInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: response.e_tag().map(trim_etag),
            size,
            version_id: response.version_id().map(str::to_string),
        })
    }

    /// Copy the whole object body into `dst`, returning the byte count
    pub async fn read_bytes<W>(
        &self,
        bucket: &str,
        key: &str,
        dst: &mut W,
        opts: &GetObjectOptions,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let reader = self.get_object(bucket, key, opts).await?.into_async_read();
        tokio::pin!(reader);

        let copied = tokio::io::copy(&mut reader, dst)
            .await
            .map_err(|e| Error::transfer("GetObject", e))?;

        tracing::debug!("Read {} bytes from {}/{}", copied, bucket, key);
        Ok(copied)
    }

    // Values

    /// Encode `value` with the default serializer and upload it
    pub async fn put<T>(
        &self,
        bucket: &str,
        key: &str,
        value: &T,
        opts: &PutObjectOptions,
    ) -> Result<UploadInfo>
    where
        T: Serialize + ?Sized,
    {
        self.put_with(bucket, key, value, opts, &self.serializer).await
    }

    /// Encode `value` with `serializer` for this call only and upload it
    ///
    /// Encoding happens before any request is sent. The object's content type
    /// defaults to the serializer's unless `opts` sets one.
    pub async fn put_with<T, O>(
        &self,
        bucket: &str,
        key: &str,
        value: &T,
        opts: &PutObjectOptions,
        serializer: &O,
    ) -> Result<UploadInfo>
    where
        T: Serialize + ?Sized,
        O: Serializer,
    {
        let data = serializer.encode(value)?;

        let opts = if opts.content_type.is_some() {
            Cow::Borrowed(opts)
        } else {
            Cow::Owned(PutObjectOptions {
                content_type: Some(serializer.content_type().to_string()),
                ..opts.clone()
            })
        };

        self.put_bytes(bucket, key, data, &opts).await
    }

    /// Fetch an object and decode it with the default serializer
    pub async fn read<T: DeserializeOwned>(
        &self,
        bucket: &str,
        key: &str,
        opts: &GetObjectOptions,
    ) -> Result<T> {
        self.read_with(bucket, key, opts, &self.serializer).await
    }

    /// Fetch an object and decode it with `serializer` for this call only
    pub async fn read_with<T, O>(
        &self,
        bucket: &str,
        key: &str,
        opts: &GetObjectOptions,
        serializer: &O,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        O: Serializer,
    {
        let mut buf: Vec<u8> = Vec::new();
        self.read_bytes(bucket, key, &mut buf, opts).await?;

        serializer
            .decode(&buf)
            .map_err(|source| Error::Decode {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })
    }
}

/// Paging state behind [`Client::list_objects`]
struct ListState {
    client: aws_sdk_s3::Client,
    bucket: String,
    opts: ListObjectsOptions,
    token: Option<String>,
    pending: VecDeque<ObjectInfo>,
    done: bool,
}

impl ListState {
    async fn next_entry(mut self) -> Result<Option<(ObjectInfo, Self)>> {
        loop {
            if let Some(info) = self.pending.pop_front() {
                return Ok(Some((info, self)));
            }
            if self.done {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        tracing::debug!(
            "ListObjectsV2 {} prefix={:?} token={:?}",
            self.bucket,
            self.opts.prefix,
            self.token
        );

        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(self.opts.prefix.clone())
            .set_start_after(self.opts.start_after.clone())
            .set_max_keys(self.opts.page_size)
            .set_continuation_token(self.token.take());
        if !self.opts.recursive {
            request = request.delimiter("/");
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::sdk("ListObjectsV2", e))?;

        for prefix in response.common_prefixes() {
            if let Some(p) = prefix.prefix() {
                self.pending.push_back(ObjectInfo::folder(p));
            }
        }
        for obj in response.contents() {
            self.pending.push_back(ObjectInfo::from_listing(obj));
        }

        self.token = response.next_continuation_token().map(str::to_string);
        self.done = !response.is_truncated().unwrap_or(false) || self.token.is_none();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::serializer::{DecodeError, EncodeError, JsonSerializer};
    use aws_sdk_s3::config::retry::RetryConfig;
    use futures::TryStreamExt;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Client pointed at a closed port; any request fails fast
    fn offline_client() -> Client {
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("access", "secret", None, None, "test"))
            .endpoint_url("http://127.0.0.1:1")
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        Client::from_sdk(aws_sdk_s3::Client::from_conf(config), Codec::Json)
    }

    /// Serializer that refuses every value
    #[derive(Debug, Clone)]
    struct Refusing;

    impl Serializer for Refusing {
        fn name(&self) -> &'static str {
            "refusing"
        }

        fn content_type(&self) -> &'static str {
            "application/x-refusing"
        }

        fn encode<T: Serialize + ?Sized>(&self, _value: &T) -> std::result::Result<Vec<u8>, EncodeError> {
            Err(EncodeError::new(self.name(), "refused"))
        }

        fn decode<T: DeserializeOwned>(&self, _data: &[u8]) -> std::result::Result<T, DecodeError> {
            Err(DecodeError::new(self.name(), "refused"))
        }
    }

    #[test]
    fn test_new_rejects_invalid_endpoint() {
        let config = ClientConfig::new("http://", "a", "s");
        let err = Client::new(&config).unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_new_uses_config_codec() {
        let config = ClientConfig::new("localhost:9000", "a", "s");
        let client = Client::new(&config).unwrap();
        assert_eq!(*client.serializer(), Codec::Json);
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn test_set_serializer() {
        let mut client = offline_client();
        client.set_serializer(Codec::MsgPack);
        assert_eq!(*client.serializer(), Codec::MsgPack);

        let client = client.with_serializer(Codec::Json);
        assert_eq!(*client.serializer(), Codec::Json);
    }

    #[test]
    fn test_bucket_inherits_serializer() {
        let client = offline_client();
        let bucket = client.bucket("test-bucket");
        assert_eq!(bucket.name(), "test-bucket");
        assert_eq!(*bucket.serializer(), Codec::Json);
    }

    #[tokio::test]
    async fn test_put_encode_error_before_request() {
        // JSON cannot encode tuple map keys
        let mut value = HashMap::new();
        value.insert((1, 2), 3);

        let err = offline_client()
            .put("test-bucket", "test-object", &value, &PutObjectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode(_)), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_override_does_not_change_default() {
        let client = offline_client();
        let opts = PutObjectOptions::default();

        let err = client
            .put_with("test-bucket", "test-object", "value", &opts, &Refusing)
            .await
            .unwrap_err();
        match err {
            Error::Encode(e) => assert_eq!(e.codec, "refusing"),
            other => panic!("unexpected error: {}", other),
        }

        // Default JSON encodes fine, so the call reaches the (closed) endpoint
        let err = client
            .put("test-bucket", "test-object", "value", &opts)
            .await
            .unwrap_err();
        assert!(err.is_storage(), "unexpected error: {}", err);
        assert_eq!(*client.serializer(), Codec::Json);
    }

    #[tokio::test]
    async fn test_bucket_exists_propagates_connect_error() {
        let err = offline_client().bucket_exists("test-bucket").await.unwrap_err();
        assert!(err.is_storage());
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_ensure_bucket_propagates_connect_error() {
        let result = offline_client()
            .ensure_bucket("test-bucket", &MakeBucketOptions::default())
            .await;
        assert!(result.unwrap_err().is_storage());
    }

    #[tokio::test]
    async fn test_read_storage_error_is_not_decode() {
        let err = offline_client()
            .read_with::<String, _>("test-bucket", "test-object", &GetObjectOptions::default(), &JsonSerializer)
            .await
            .unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_list_objects_ends_after_error() {
        let mut listing = offline_client().list_objects("test-bucket", ListObjectsOptions::default());

        let first = listing.next().await.expect("stream yields the error");
        assert!(first.unwrap_err().is_storage());
        assert!(listing.next().await.is_none());
    }

    #[tokio::test]
    async fn test_list_objects_try_collect_fails() {
        let result: Result<Vec<ObjectInfo>> = offline_client()
            .list_objects("test-bucket", ListObjectsOptions::prefix("docs/"))
            .try_collect()
            .await;
        assert!(result.is_err());
    }

    /// Accept one HTTP request on a local port, answer 200 and return the raw request
    async fn capture_request() -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut data = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&chunk[..n]);

                if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
                    let body_len = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if data.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&data).into_owned()
        });

        (addr, handle)
    }

    #[test]
    fn test_region_from_config() {
        let config = ClientConfig::new("localhost:9000", "a", "s").with_region("eu-west-1");
        let client = Client::new(&config).unwrap();
        assert_eq!(client.region(), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_make_bucket_uses_client_region() {
        let (addr, server) = capture_request().await;
        let config = ClientConfig::new(addr, "a", "s").with_region("eu-west-1");
        let client = Client::new(&config).unwrap();

        client
            .make_bucket("b", &MakeBucketOptions::default())
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /b"), "unexpected request: {}", request);
        assert!(
            request.contains("<LocationConstraint>eu-west-1</LocationConstraint>"),
            "missing location constraint: {}",
            request
        );
    }

    #[tokio::test]
    async fn test_make_bucket_options_region_wins() {
        let (addr, server) = capture_request().await;
        let config = ClientConfig::new(addr, "a", "s").with_region("eu-west-1");
        let client = Client::new(&config).unwrap();

        client
            .make_bucket("b", &MakeBucketOptions::region("ap-south-1"))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.contains("<LocationConstraint>ap-south-1</LocationConstraint>"));
        assert!(!request.contains("eu-west-1</LocationConstraint>"));
    }

    #[tokio::test]
    async fn test_make_bucket_default_region_sends_no_constraint() {
        let (addr, server) = capture_request().await;
        let client = Client::new(&ClientConfig::new(addr, "a", "s")).unwrap();

        client
            .make_bucket("b", &MakeBucketOptions::default())
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(!request.contains("LocationConstraint"), "unexpected body: {}", request);
    }
}
