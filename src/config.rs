//! Connection settings for the storage service
//!
//! Settings come from code, from a JSON file, or from the environment:
//! - `SERVER_ENDPOINT` - `host:port` or a full URL
//! - `ACCESS_KEY` / `SECRET_KEY` - static credentials
//! - `SESSION_TOKEN` - optional temporary-credential token
//! - `SERVER_SECURE` - `true` to use https for bare endpoints
//! - `SERVER_REGION` - signing region, `us-east-1` when unset
//! - `SERVER_CODEC` - `json` or `msgpack`

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

use crate::s3::serializer::Codec;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Endpoint, credentials and default codec for a [`crate::s3::Client`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Use TLS when `endpoint` carries no scheme
    pub secure: bool,
    pub region: String,
    /// Address buckets as `/bucket/key` (required by most self-hosted stores)
    pub force_path_style: bool,
    /// Codec used by value operations without an override
    pub codec: Codec,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: None,
            secure: false,
            region: DEFAULT_REGION.to_string(),
            force_path_style: true,
            codec: Codec::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            ..Default::default()
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Build settings from `SERVER_ENDPOINT`, `ACCESS_KEY`, `SECRET_KEY` and friends
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            match lookup(name) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => bail!("{} is not set", name),
            }
        };

        let mut config = Self::new(
            required("SERVER_ENDPOINT")?,
            required("ACCESS_KEY")?,
            required("SECRET_KEY")?,
        );
        config.session_token = lookup("SESSION_TOKEN").filter(|t| !t.is_empty());

        if let Some(secure) = lookup("SERVER_SECURE") {
            config.secure = secure
                .trim()
                .parse()
                .with_context(|| format!("SERVER_SECURE must be true or false, got {:?}", secure))?;
        }
        if let Some(region) = lookup("SERVER_REGION").filter(|r| !r.is_empty()) {
            config.region = region;
        }
        if let Some(codec) = lookup("SERVER_CODEC") {
            config.codec = codec.parse().map_err(anyhow::Error::msg)?;
        }

        tracing::debug!(
            "Loaded client config from environment: endpoint={}, region={}, secure={}",
            config.endpoint,
            config.region,
            config.secure
        );

        Ok(config)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read client config from {:?}", path))?;

        let config: ClientConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse client config from {:?}", path))?;

        tracing::debug!("Loaded client config from {:?}", path);

        Ok(config)
    }

    /// Save settings to a JSON file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize client config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write client config to {:?}", path))?;

        Ok(())
    }

    /// Full endpoint URL; bare `host:port` gets a scheme from `secure`
    pub fn endpoint_url(&self) -> std::result::Result<Url, url::ParseError> {
        let endpoint = self.endpoint.trim();
        if endpoint.contains("://") {
            Url::parse(endpoint)
        } else {
            let scheme = if self.secure { "https" } else { "http" };
            Url::parse(&format!("{}://{}", scheme, endpoint))
        }
    }
}
