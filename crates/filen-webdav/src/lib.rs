//! WebDAV gateway for Filen's end-to-end-encrypted cloud storage.
//!
//! This crate exposes a remote encrypted file store as a standards-conforming
//! WebDAV service. OS-native clients (macOS Finder, Windows Explorer, rclone,
//! Cyberduck) mount it and perform file operations that are translated into
//! calls against the client-side-encrypting storage SDK. All cryptography
//! stays inside the SDK: the gateway never holds plaintext at rest beyond the
//! optional local scratch tier.
//!
//! # Architecture
//!
//! Requests flow through a fixed chain: rate limiting, authentication, common
//! DAV response headers, body framing, then one handler per WebDAV verb. A
//! per-user overlay presents three resource tiers as one directory tree:
//!
//! - **backend**: the canonical resource in the remote store
//! - **virtual**: a zero-byte in-memory placeholder created by an empty
//!   `PUT`, so clients that open-then-write (Finder, Explorer) see the file
//!   immediately
//! - **disk**: a plaintext scratch file for sidecar paths matching a
//!   configured glob (`.DS_Store`, `Thumbs.db`, ...) that must never enter
//!   the encrypted store
//!
//! # Example
//!
//! ```ignore
//! use filen_webdav::{ServerConfig, Tenancy, WebDavServer};
//! use std::sync::Arc;
//!
//! let config = ServerConfig::default();
//! let tenancy = Tenancy::Single {
//!     username: "admin".into(),
//!     password: "secret".into(),
//!     client: sdk_session,
//! };
//!
//! let server = WebDavServer::start(config, tenancy).await?;
//! println!("serving on {}", server.addr());
//! server.stop(false).await;
//! ```

mod auth;
mod body;
mod certs;
mod config;
mod error;
mod handlers;
mod paths;
mod rate_limit;
mod resource;
mod server;
mod state;
mod xml;

pub mod sdk;

pub use auth::Authenticator;
pub use config::{AuthMode, RateLimitConfig, RateLimitKey, ServerConfig, Tenancy};
pub use error::{WebDavError, WebDavResult};
pub use resource::{Resource, ResourceKind};
pub use server::WebDavServer;
pub use state::{PerUserState, UserRegistry};
