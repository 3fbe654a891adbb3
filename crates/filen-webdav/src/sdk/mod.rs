//! Storage SDK contract consumed by the gateway.
//!
//! The gateway never implements encryption, chunking, or metadata handling
//! itself; it drives an SDK session through [`FilenClient`]. The trait is the
//! seam: the production build plugs the real client-side-encrypting SDK in,
//! and the [`memory`] module provides an in-process implementation for tests
//! and protocol experiments.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Byte stream used for uploads and downloads. Chunks flow end to end
/// without whole-body buffering.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Errors surfaced by the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The path does not exist in the remote store. Resolvers swallow this
    /// and report the resource as absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Login rejected or session expired.
    #[error("authentication failed")]
    Unauthenticated,

    /// Transport or local IO failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Anything else the SDK reports.
    #[error("{0}")]
    Other(String),
}

/// Kind of a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata for a single remote entry, as returned by `stat`.
#[derive(Debug, Clone)]
pub struct Stats {
    pub uuid: Uuid,
    pub kind: EntryKind,
    pub name: String,
    pub size: u64,
    pub mtime_ms: i64,
    pub birthtime_ms: i64,
    pub last_modified: i64,
    pub creation: i64,
    pub mime: String,
    /// Per-file content key. Opaque to the gateway.
    pub key: String,
    pub bucket: String,
    pub region: String,
    pub version: u32,
    pub chunks: u64,
    pub hash: Option<String>,
}

/// Aggregated capacity and usage for the account, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub used: u64,
    pub max: u64,
}

/// Download parameters for a stored file.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub uuid: Uuid,
    pub bucket: String,
    pub region: String,
    pub version: u32,
    pub key: String,
    pub size: u64,
    pub chunks: u64,
}

/// Mutable file metadata accepted by `edit_file_metadata`.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub name: String,
    pub key: String,
    pub last_modified: i64,
    pub creation: i64,
    pub hash: Option<String>,
    pub size: u64,
    pub mime: String,
}

/// An authenticated SDK session against the encrypted store.
///
/// All path arguments are absolute POSIX paths without a trailing slash
/// (root is `/`). `mkdir` is idempotent and creates missing ancestors;
/// name+parent collisions are de-duplicated by the SDK.
#[async_trait]
pub trait FilenClient: Send + Sync {
    async fn stat(&self, path: &str) -> Result<Stats, SdkError>;

    /// Child names of a directory (not full paths).
    async fn readdir(&self, path: &str) -> Result<Vec<String>, SdkError>;

    async fn mkdir(&self, path: &str) -> Result<(), SdkError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), SdkError>;

    async fn cp(&self, from: &str, to: &str) -> Result<(), SdkError>;

    /// Remove a file or directory tree. `permanent = false` moves it to the
    /// account trash.
    async fn unlink(&self, path: &str, permanent: bool) -> Result<(), SdkError>;

    async fn statfs(&self) -> Result<StatFs, SdkError>;

    /// Stream an upload into the store under `parent`. Returns the stored
    /// entry's metadata.
    async fn upload_file_stream(
        &self,
        parent: Uuid,
        name: &str,
        source: ByteStream,
    ) -> Result<Stats, SdkError>;

    /// Stream the byte range `[start, end]` (inclusive) of a stored file.
    async fn download_file_stream(
        &self,
        file: &RemoteFile,
        start: u64,
        end: u64,
    ) -> Result<ByteStream, SdkError>;

    async fn edit_file_metadata(&self, uuid: Uuid, meta: FileMetadata) -> Result<(), SdkError>;

    /// Drop a path from the SDK's in-memory metadata index.
    fn remove_cached_item(&self, path: &str);

    /// Insert a path into the SDK's in-memory metadata index so a subsequent
    /// `stat` sees it without a round trip.
    fn add_cached_item(&self, path: &str, item: Stats);

    /// Notified with the account email whenever the account password changes.
    /// Proxy-mode sessions are evicted on receipt.
    fn subscribe_password_changed(&self) -> broadcast::Receiver<String>;

    /// The SDK's fixed upload chunk size in bytes.
    fn upload_chunk_size(&self) -> u64;
}

/// Factory for proxy-mode sessions: one login per distinct email.
#[async_trait]
pub trait FilenLogin: Send + Sync {
    async fn login(
        &self,
        email: &str,
        password: &str,
        two_factor: Option<&str>,
    ) -> Result<Arc<dyn FilenClient>, SdkError>;
}

impl Stats {
    /// Download parameters for this entry. Only meaningful for files.
    pub fn remote_file(&self) -> RemoteFile {
        RemoteFile {
            uuid: self.uuid,
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            version: self.version,
            key: self.key.clone(),
            size: self.size,
            chunks: self.chunks,
        }
    }
}
