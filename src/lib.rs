//! Object storage helpers for S3-compatible services
//!
//! Wraps the AWS S3 SDK with bucket-scoped handles and typed put/read
//! operations. Values are encoded with a pluggable [`s3::Serializer`]
//! (JSON by default, MessagePack with the `msgpack` feature).

pub mod config;
pub mod s3;

pub use config::ClientConfig;
pub use s3::{Bucket, Client, Codec, Error, Result, Serializer};
