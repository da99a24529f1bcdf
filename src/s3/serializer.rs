//! Pluggable value <-> bytes codecs
//!
//! Object values are stored as opaque bytes. A [`Serializer`] decides how a
//! value becomes those bytes and back:
//! - [`JsonSerializer`] - compact JSON (the default)
//! - [`MsgPackSerializer`] - MessagePack, structs encoded as maps (feature `msgpack`)
//! - [`Codec`] - runtime choice between the built-in codecs

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A value could not be converted to bytes
#[derive(Debug, thiserror::Error)]
#[error("{codec} encode: {source}")]
pub struct EncodeError {
    pub codec: &'static str,
    #[source]
    pub source: BoxError,
}

impl EncodeError {
    pub fn new(codec: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            codec,
            source: source.into(),
        }
    }
}

/// Bytes could not be converted into the requested value shape
#[derive(Debug, thiserror::Error)]
#[error("{codec} decode: {source}")]
pub struct DecodeError {
    pub codec: &'static str,
    #[source]
    pub source: BoxError,
}

impl DecodeError {
    pub fn new(codec: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            codec,
            source: source.into(),
        }
    }
}

/// Encodes values to bytes and decodes them back.
///
/// Implementations must satisfy `decode(encode(v)) == v` for every
/// value they accept.
pub trait Serializer: Clone + Send + Sync + fmt::Debug {
    /// Short codec name used in errors and logs
    fn name(&self) -> &'static str;

    /// MIME type stamped on objects written with this codec
    fn content_type(&self) -> &'static str;

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodeError>;

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, DecodeError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(value).map_err(|e| EncodeError::new(self.name(), e))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, DecodeError> {
        serde_json::from_slice(data).map_err(|e| DecodeError::new(self.name(), e))
    }
}

#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgPackSerializer;

#[cfg(feature = "msgpack")]
impl Serializer for MsgPackSerializer {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn content_type(&self) -> &'static str {
        "application/msgpack"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        // Named encoding keeps struct fields addressable by other msgpack readers
        rmp_serde::to_vec_named(value).map_err(|e| EncodeError::new(self.name(), e))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, DecodeError> {
        rmp_serde::from_slice(data).map_err(|e| DecodeError::new(self.name(), e))
    }
}

/// Built-in codec selectable at runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Json,
    #[cfg(feature = "msgpack")]
    MsgPack,
}

impl Serializer for Codec {
    fn name(&self) -> &'static str {
        match self {
            Codec::Json => JsonSerializer.name(),
            #[cfg(feature = "msgpack")]
            Codec::MsgPack => MsgPackSerializer.name(),
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            Codec::Json => JsonSerializer.content_type(),
            #[cfg(feature = "msgpack")]
            Codec::MsgPack => MsgPackSerializer.content_type(),
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        match self {
            Codec::Json => JsonSerializer.encode(value),
            #[cfg(feature = "msgpack")]
            Codec::MsgPack => MsgPackSerializer.encode(value),
        }
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, DecodeError> {
        match self {
            Codec::Json => JsonSerializer.decode(data),
            #[cfg(feature = "msgpack")]
            Codec::MsgPack => MsgPackSerializer.decode(data),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            #[cfg(feature = "msgpack")]
            "msgpack" | "messagepack" => Ok(Codec::MsgPack),
            other => Err(format!("unknown codec: {}", other)),
        }
    }
}
