//! S3 client wrapper module
//!
//! This module layers value storage on top of the AWS S3 SDK:
//! - [`client::Client`] - Bucket helpers plus byte and value put/read operations
//! - [`bucket::Bucket`] - The same operations bound to one bucket
//! - [`serializer`] - Pluggable value codecs (JSON, MessagePack)
//! - [`types`] - Request options and object records

pub mod bucket;
pub mod client;
pub mod error;
pub mod serializer;
pub mod types;

// Re-export commonly used types
pub use bucket::Bucket;
pub use client::{Client, ListObjects};
pub use error::{Error, Result};
#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;
pub use serializer::{Codec, DecodeError, EncodeError, JsonSerializer, Serializer};
pub use types::{
    GetObjectOptions, ListObjectsOptions, MakeBucketOptions, Object, ObjectInfo,
    PutObjectOptions, RemoveObjectOptions, UploadInfo,
};
