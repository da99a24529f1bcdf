//! Error kinds surfaced by storage operations

use crate::s3::serializer::{DecodeError, EncodeError};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`crate::s3::Client`] and [`crate::s3::Bucket`]
///
/// Encoding, storage and decoding failures are kept apart so callers can tell
/// whether anything reached the store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The value could not be encoded; nothing was sent
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The object was fetched but its bytes do not fit the requested type
    #[error("object {bucket}/{key}: {source}")]
    Decode {
        bucket: String,
        key: String,
        #[source]
        source: DecodeError,
    },

    /// The storage service rejected or failed the request
    #[error("{operation} failed: {source}")]
    Storage {
        operation: &'static str,
        /// HTTP status of the failed response, when one was received
        status: Option<u16>,
        #[source]
        source: BoxError,
    },

    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an SDK failure, keeping the HTTP status for later inspection
    pub(crate) fn sdk<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let status = err.raw_response().map(|r| r.status().as_u16());
        Error::Storage {
            operation,
            status,
            source: Box::new(err),
        }
    }

    /// Wrap a transport failure that happened after the response started
    pub(crate) fn transfer(operation: &'static str, err: impl Into<BoxError>) -> Self {
        Error::Storage {
            operation,
            status: None,
            source: err.into(),
        }
    }

    /// True when the store answered 404 (missing bucket or key)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage { status: Some(404), .. })
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage { .. })
    }
}
