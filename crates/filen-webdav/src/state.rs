//! Per-user state and the authenticated-user registry.
//!
//! Each authenticated username owns one [`PerUserState`]: its SDK session,
//! the virtual and disk tier maps, a per-path mutex table kept as an
//! extension point, and a small TTL cache for `statfs`. The registry maps
//! usernames to state; proxy-mode entries are created lazily on first login
//! and evicted when the SDK reports a password change.

use crate::error::WebDavResult;
use crate::resource::Resource;
use crate::sdk::{FilenClient, SdkError, StatFs};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// TTL for the cached `statfs` result.
const STATFS_TTL: Duration = Duration::from_secs(60);

/// State owned by one authenticated username.
pub struct PerUserState {
    pub username: String,
    pub client: Arc<dyn FilenClient>,
    /// Zero-byte placeholders by path.
    pub virtual_files: DashMap<String, Resource>,
    /// Scratch-tier entries by path.
    pub disk_files: DashMap<String, Resource>,
    /// Per-path mutex table. Handlers currently take no path locks; the
    /// table is retained as an extension point for stricter ordering.
    path_locks: DashMap<String, Arc<Mutex<()>>>,
    /// 60-second cache for `statfs`.
    statfs_cache: moka::future::Cache<&'static str, StatFs>,
    /// Raw credential presented at login, for fast re-auth in proxy mode.
    /// Compared constant-time; never logged.
    authed_password: RwLock<Option<String>>,
}

impl PerUserState {
    pub fn new(username: impl Into<String>, client: Arc<dyn FilenClient>) -> Arc<Self> {
        Arc::new(Self {
            username: username.into(),
            client,
            virtual_files: DashMap::new(),
            disk_files: DashMap::new(),
            path_locks: DashMap::new(),
            statfs_cache: moka::future::Cache::builder()
                .max_capacity(1)
                .time_to_live(STATFS_TTL)
                .build(),
            authed_password: RwLock::new(None),
        })
    }

    /// Resolve a logical path against the tier overlay: virtual map, disk
    /// map, then the backend. Backend "not found" surfaces as `None`; the
    /// resolver never mutates tier state.
    pub async fn resolve(&self, path: &str) -> WebDavResult<Option<Resource>> {
        if let Some(entry) = self.virtual_files.get(path) {
            return Ok(Some(entry.clone()));
        }
        if let Some(entry) = self.disk_files.get(path) {
            return Ok(Some(entry.clone()));
        }
        match self.client.stat(path).await {
            Ok(stats) => Ok(Some(Resource::from_stats(path, stats))),
            Err(SdkError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Account usage, cached for sixty seconds.
    pub async fn statfs(&self) -> WebDavResult<StatFs> {
        self.statfs_cache
            .try_get_with("statfs", async { self.client.statfs().await })
            .await
            .map_err(|e: Arc<SdkError>| SdkError::Other(e.to_string()).into())
    }

    /// The mutex guarding `path`, created on first use.
    pub fn path_lock(&self, path: &str) -> Arc<Mutex<()>> {
        self.path_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Record the raw credential that authenticated this session.
    pub fn set_authed_password(&self, raw: &str) {
        *self.authed_password.write() = Some(raw.to_string());
    }

    /// Read the cached raw credential.
    pub fn authed_password(&self) -> Option<String> {
        self.authed_password.read().clone()
    }

    /// Drop both tier entries for a path. Called after backend writes so the
    /// next resolve sees the canonical resource.
    pub fn purge_tiers(&self, path: &str) {
        self.virtual_files.remove(path);
        self.disk_files.remove(path);
    }
}

/// Registry of authenticated users.
pub struct UserRegistry {
    users: DashMap<String, Arc<PerUserState>>,
    /// Serializes first-login per username in proxy mode.
    login_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            users: DashMap::new(),
            login_locks: DashMap::new(),
        })
    }

    pub fn get(&self, username: &str) -> Option<Arc<PerUserState>> {
        self.users.get(username).map(|u| Arc::clone(&u))
    }

    /// Insert a freshly authenticated user and start watching for the SDK's
    /// password-changed event, which evicts the entry.
    pub fn insert(self: &Arc<Self>, state: Arc<PerUserState>) {
        let username = state.username.clone();
        let mut rx = state.client.subscribe_password_changed();
        let registry = Arc::downgrade(self);
        let watched = username.clone();
        tokio::spawn(async move {
            while let Ok(changed) = rx.recv().await {
                if changed != watched {
                    continue;
                }
                if let Some(registry) = registry.upgrade() {
                    registry.evict(&watched);
                }
                break;
            }
        });

        debug!(username = %username, "registered user session");
        self.users.insert(username, state);
    }

    /// Drop a user's session and overlay state.
    pub fn evict(&self, username: &str) {
        if self.users.remove(username).is_some() {
            info!(username = %username, "evicted user session");
        }
    }

    /// The mutex serializing logins for one username.
    pub fn login_lock(&self, username: &str) -> Arc<Mutex<()>> {
        self.login_locks
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
