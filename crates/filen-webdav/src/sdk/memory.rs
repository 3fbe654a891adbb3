//! In-memory SDK session.
//!
//! Backs the integration tests and the CLI's protocol-testing mode with a
//! faithful model of the remote store: path-keyed metadata, uuid-keyed
//! blobs, chunk accounting, and the password-changed event channel.

use super::{
    ByteStream, EntryKind, FileMetadata, FilenClient, FilenLogin, RemoteFile, SdkError, StatFs,
    Stats,
};
use crate::paths;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Upload chunk size of the real SDK.
const UPLOAD_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default account capacity.
const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024 * 1024;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn random_key() -> String {
    let mut buf = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn root_stats() -> Stats {
    Stats {
        uuid: Uuid::nil(),
        kind: EntryKind::Directory,
        name: String::new(),
        size: 0,
        mtime_ms: 0,
        birthtime_ms: 0,
        last_modified: 0,
        creation: 0,
        mime: String::new(),
        key: String::new(),
        bucket: String::new(),
        region: String::new(),
        version: 2,
        chunks: 0,
        hash: None,
    }
}

struct Store {
    /// Normalized path -> entry metadata. Root is implicit.
    entries: HashMap<String, Stats>,
    /// File uuid -> content.
    blobs: HashMap<Uuid, Bytes>,
}

/// An in-memory [`FilenClient`].
pub struct MemoryClient {
    email: String,
    store: Mutex<Store>,
    max_bytes: u64,
    uploads: AtomicU64,
    password_tx: broadcast::Sender<String>,
}

impl MemoryClient {
    pub fn new(email: impl Into<String>) -> Arc<Self> {
        let (password_tx, _) = broadcast::channel(8);
        Arc::new(Self {
            email: email.into(),
            store: Mutex::new(Store {
                entries: HashMap::new(),
                blobs: HashMap::new(),
            }),
            max_bytes: DEFAULT_MAX_BYTES,
            uploads: AtomicU64::new(0),
            password_tx,
        })
    }

    /// Number of streamed uploads this session has performed. Used by tests
    /// to assert that scratch-glob paths never reach the store.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Whether a path exists in the store.
    pub fn contains(&self, path: &str) -> bool {
        let path = paths::normalize(path);
        path == "/" || self.store.lock().entries.contains_key(&path)
    }

    /// Fire the password-changed event for this account.
    pub fn trigger_password_changed(&self) {
        let _ = self.password_tx.send(self.email.clone());
    }

    fn make_file_stats(&self, name: &str, size: u64) -> Stats {
        let now = now_ms();
        Stats {
            uuid: Uuid::new_v4(),
            kind: EntryKind::File,
            name: name.to_string(),
            size,
            mtime_ms: now,
            birthtime_ms: now,
            last_modified: now,
            creation: now,
            mime: paths::mime_for_name(name),
            key: random_key(),
            bucket: "memory".to_string(),
            region: "local".to_string(),
            version: 2,
            chunks: size.div_ceil(UPLOAD_CHUNK_SIZE).max(1),
            hash: None,
        }
    }

    fn make_dir_stats(name: &str) -> Stats {
        let now = now_ms();
        Stats {
            uuid: Uuid::new_v4(),
            kind: EntryKind::Directory,
            name: name.to_string(),
            size: 0,
            mtime_ms: now,
            birthtime_ms: now,
            last_modified: now,
            creation: now,
            mime: String::new(),
            key: String::new(),
            bucket: "memory".to_string(),
            region: "local".to_string(),
            version: 2,
            chunks: 0,
            hash: None,
        }
    }

    /// Remove `path` and, if it is a directory, everything below it.
    fn remove_tree(store: &mut Store, path: &str) {
        if let Some(stats) = store.entries.remove(path) {
            store.blobs.remove(&stats.uuid);
        }
        let prefix = format!("{path}/");
        let doomed: Vec<String> = store
            .entries
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect();
        for p in doomed {
            if let Some(stats) = store.entries.remove(&p) {
                store.blobs.remove(&stats.uuid);
            }
        }
    }
}

#[async_trait]
impl FilenClient for MemoryClient {
    async fn stat(&self, path: &str) -> Result<Stats, SdkError> {
        let path = paths::normalize(path);
        if path == "/" {
            return Ok(root_stats());
        }
        self.store
            .lock()
            .entries
            .get(&path)
            .cloned()
            .ok_or(SdkError::NotFound(path))
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, SdkError> {
        let path = paths::normalize(path);
        let store = self.store.lock();
        if path != "/" {
            match store.entries.get(&path) {
                Some(s) if s.kind == EntryKind::Directory => {}
                Some(_) => return Err(SdkError::Other(format!("not a directory: {path}"))),
                None => return Err(SdkError::NotFound(path)),
            }
        }
        Ok(store
            .entries
            .keys()
            .filter(|p| paths::parent_path(p) == path)
            .map(|p| paths::base_name(p))
            .collect())
    }

    async fn mkdir(&self, path: &str) -> Result<(), SdkError> {
        let path = paths::normalize(path);
        if path == "/" {
            return Ok(());
        }
        let mut store = self.store.lock();
        // Create missing ancestors first, nearest to root outward.
        let mut prefix = String::new();
        for segment in path.trim_start_matches('/').split('/') {
            prefix.push('/');
            prefix.push_str(segment);
            match store.entries.get(&prefix) {
                Some(s) if s.kind == EntryKind::Directory => {}
                Some(_) => return Err(SdkError::Other(format!("not a directory: {prefix}"))),
                None => {
                    store
                        .entries
                        .insert(prefix.clone(), Self::make_dir_stats(segment));
                }
            }
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SdkError> {
        let from = paths::normalize(from);
        let to = paths::normalize(to);
        let mut store = self.store.lock();
        let mut stats = store
            .entries
            .remove(&from)
            .ok_or(SdkError::NotFound(from.clone()))?;
        Self::remove_tree(&mut store, &to);
        stats.name = paths::base_name(&to);
        if stats.kind == EntryKind::File {
            stats.mime = paths::mime_for_name(&stats.name);
        }
        let was_dir = stats.kind == EntryKind::Directory;
        store.entries.insert(to.clone(), stats);
        if was_dir {
            let old_prefix = format!("{from}/");
            let moved: Vec<String> = store
                .entries
                .keys()
                .filter(|p| p.starts_with(&old_prefix))
                .cloned()
                .collect();
            for old in moved {
                if let Some(entry) = store.entries.remove(&old) {
                    let new = format!("{to}/{}", &old[old_prefix.len()..]);
                    store.entries.insert(new, entry);
                }
            }
        }
        Ok(())
    }

    async fn cp(&self, from: &str, to: &str) -> Result<(), SdkError> {
        let from = paths::normalize(from);
        let to = paths::normalize(to);
        let mut store = self.store.lock();
        let source = store
            .entries
            .get(&from)
            .cloned()
            .ok_or(SdkError::NotFound(from.clone()))?;
        Self::remove_tree(&mut store, &to);

        let mut copies: Vec<(String, Stats)> = vec![(to.clone(), source.clone())];
        if source.kind == EntryKind::Directory {
            let old_prefix = format!("{from}/");
            for (p, s) in store.entries.iter() {
                if p.starts_with(&old_prefix) {
                    copies.push((format!("{to}/{}", &p[old_prefix.len()..]), s.clone()));
                }
            }
        }
        for (path, mut stats) in copies {
            let blob = store.blobs.get(&stats.uuid).cloned();
            stats.uuid = Uuid::new_v4();
            stats.name = paths::base_name(&path);
            if let Some(blob) = blob {
                store.blobs.insert(stats.uuid, blob);
            }
            store.entries.insert(path, stats);
        }
        Ok(())
    }

    async fn unlink(&self, path: &str, _permanent: bool) -> Result<(), SdkError> {
        let path = paths::normalize(path);
        let mut store = self.store.lock();
        if !store.entries.contains_key(&path) {
            return Err(SdkError::NotFound(path));
        }
        Self::remove_tree(&mut store, &path);
        Ok(())
    }

    async fn statfs(&self) -> Result<StatFs, SdkError> {
        let used = self
            .store
            .lock()
            .blobs
            .values()
            .map(|b| b.len() as u64)
            .sum();
        Ok(StatFs {
            used,
            max: self.max_bytes,
        })
    }

    async fn upload_file_stream(
        &self,
        parent: Uuid,
        name: &str,
        mut source: ByteStream,
    ) -> Result<Stats, SdkError> {
        self.uploads.fetch_add(1, Ordering::Relaxed);

        let parent_path = if parent.is_nil() {
            "/".to_string()
        } else {
            let store = self.store.lock();
            store
                .entries
                .iter()
                .find(|(_, s)| s.uuid == parent && s.kind == EntryKind::Directory)
                .map(|(p, _)| p.clone())
                .ok_or_else(|| SdkError::NotFound(format!("parent {parent}")))?
        };

        let mut content = Vec::new();
        while let Some(chunk) = source.next().await {
            content.extend_from_slice(&chunk?);
        }

        let stats = self.make_file_stats(name, content.len() as u64);
        let path = if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        };

        let mut store = self.store.lock();
        Self::remove_tree(&mut store, &path);
        store.blobs.insert(stats.uuid, Bytes::from(content));
        store.entries.insert(path, stats.clone());
        Ok(stats)
    }

    async fn download_file_stream(
        &self,
        file: &RemoteFile,
        start: u64,
        end: u64,
    ) -> Result<ByteStream, SdkError> {
        let blob = self
            .store
            .lock()
            .blobs
            .get(&file.uuid)
            .cloned()
            .ok_or_else(|| SdkError::NotFound(format!("blob {}", file.uuid)))?;

        let start = (start as usize).min(blob.len());
        let end = ((end + 1) as usize).min(blob.len());
        let slice = blob.slice(start..end.max(start));

        let chunks: Vec<std::io::Result<Bytes>> = slice
            .chunks(UPLOAD_CHUNK_SIZE as usize)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn edit_file_metadata(&self, uuid: Uuid, meta: FileMetadata) -> Result<(), SdkError> {
        let mut store = self.store.lock();
        let entry = store
            .entries
            .values_mut()
            .find(|s| s.uuid == uuid)
            .ok_or_else(|| SdkError::NotFound(format!("uuid {uuid}")))?;
        entry.name = meta.name;
        entry.key = meta.key;
        entry.last_modified = meta.last_modified;
        entry.mtime_ms = meta.last_modified;
        entry.creation = meta.creation;
        entry.birthtime_ms = meta.creation;
        entry.hash = meta.hash;
        entry.size = meta.size;
        entry.mime = meta.mime;
        Ok(())
    }

    fn remove_cached_item(&self, path: &str) {
        let path = paths::normalize(path);
        self.store.lock().entries.remove(&path);
    }

    fn add_cached_item(&self, path: &str, item: Stats) {
        let path = paths::normalize(path);
        self.store.lock().entries.insert(path, item);
    }

    fn subscribe_password_changed(&self) -> broadcast::Receiver<String> {
        self.password_tx.subscribe()
    }

    fn upload_chunk_size(&self) -> u64 {
        UPLOAD_CHUNK_SIZE
    }
}

struct Account {
    password: String,
    two_factor: Option<String>,
    client: Arc<MemoryClient>,
}

/// In-memory [`FilenLogin`] with a fixed set of registered accounts.
pub struct MemoryLogin {
    accounts: Mutex<HashMap<String, Account>>,
    logins: AtomicU64,
}

impl MemoryLogin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(HashMap::new()),
            logins: AtomicU64::new(0),
        })
    }

    /// Register an account and return its session.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        two_factor: Option<&str>,
    ) -> Arc<MemoryClient> {
        let client = MemoryClient::new(email);
        self.accounts.lock().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                two_factor: two_factor.map(str::to_string),
                client: Arc::clone(&client),
            },
        );
        client
    }

    /// Number of successful logins performed. Tests assert the authed-session
    /// cache prevents repeat logins for an unchanged credential.
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Change an account password and fire the password-changed event.
    pub fn set_password(&self, email: &str, new_password: &str) {
        let mut accounts = self.accounts.lock();
        if let Some(account) = accounts.get_mut(email) {
            account.password = new_password.to_string();
            account.client.trigger_password_changed();
        }
    }
}

#[async_trait]
impl FilenLogin for MemoryLogin {
    async fn login(
        &self,
        email: &str,
        password: &str,
        two_factor: Option<&str>,
    ) -> Result<Arc<dyn FilenClient>, SdkError> {
        let accounts = self.accounts.lock();
        let account = accounts.get(email).ok_or(SdkError::Unauthenticated)?;
        if account.password != password {
            return Err(SdkError::Unauthenticated);
        }
        if let Some(expected) = &account.two_factor {
            if two_factor != Some(expected.as_str()) {
                return Err(SdkError::Unauthenticated);
            }
        }
        self.logins.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::clone(&account.client) as Arc<dyn FilenClient>)
    }
}
