//! Server configuration.

use crate::error::{WebDavError, WebDavResult};
use crate::sdk::{FilenClient, FilenLogin};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Authentication scheme presented to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Basic,
    Digest,
}

/// What the rate limiter keys its windows on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitKey {
    Ip,
    #[default]
    Username,
}

/// Fixed-window rate limit applied before authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_rate_limit")]
    pub limit: u64,
    #[serde(default)]
    pub key: RateLimitKey,
}

fn default_rate_window_ms() -> u64 {
    1000
}

fn default_rate_limit() -> u64 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_rate_window_ms(),
            limit: default_rate_limit(),
            key: RateLimitKey::default(),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub hostname: String,
    /// Bind port.
    pub port: u16,
    /// Authentication scheme. Digest requires single-tenant mode.
    pub auth_mode: AuthMode,
    /// Serve HTTPS with a cached self-signed certificate.
    pub https: bool,
    /// Rate limiting applied in front of authentication.
    pub rate_limit: RateLimitConfig,
    /// Glob patterns for paths kept on local disk instead of the encrypted
    /// store (sidecar files such as `.DS_Store` or `Thumbs.db`).
    pub temp_files_to_store_on_disk: Vec<String>,
    /// Suppress the gateway's own log output.
    pub disable_logging: bool,
    /// Base directory for certificates and scratch files. Defaults to
    /// `<platform-config>/@filen/webdav`.
    pub config_dir: Option<PathBuf>,
    /// How long a `PUT` may go without its first body byte before the upload
    /// is treated as a zero-byte probe.
    #[serde(with = "duration_ms")]
    pub first_byte_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 1900,
            auth_mode: AuthMode::Basic,
            https: false,
            rate_limit: RateLimitConfig::default(),
            temp_files_to_store_on_disk: Vec::new(),
            disable_logging: false,
            config_dir: None,
            first_byte_timeout: Duration::from_secs(15),
        }
    }
}

impl ServerConfig {
    /// The directory holding certificates and the scratch tier.
    pub fn resolved_config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("@filen")
                .join("webdav")
        })
    }

    /// The scratch-tier directory.
    pub fn temp_disk_dir(&self) -> PathBuf {
        self.resolved_config_dir().join("tempDiskFiles")
    }
}

/// Tenancy mode fixed at server construction.
#[derive(Clone)]
pub enum Tenancy {
    /// One configured credential pair bound to one SDK session for the
    /// process lifetime.
    Single {
        username: String,
        password: String,
        client: Arc<dyn FilenClient>,
    },
    /// Credentials embedded in the Basic password; sessions are opened
    /// lazily per email and evicted on password change.
    Proxy { login: Arc<dyn FilenLogin> },
}

impl Tenancy {
    /// Reject configurations the authenticator cannot serve.
    pub fn validate(&self, config: &ServerConfig) -> WebDavResult<()> {
        if config.auth_mode == AuthMode::Digest && matches!(self, Tenancy::Proxy { .. }) {
            return Err(WebDavError::Internal(
                "digest authentication requires a configured user".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
