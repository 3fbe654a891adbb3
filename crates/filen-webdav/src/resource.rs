//! The three-tier resource model.
//!
//! A [`Resource`] is the gateway's view of one filesystem entity at one
//! path, tagged by where its bytes actually live:
//!
//! - `Backend`: canonical, in the remote encrypted store
//! - `Virtual`: zero-byte in-memory placeholder from an empty `PUT`
//! - `Disk`: plaintext scratch file for sidecar-glob paths
//!
//! A path lives in at most one tier at any moment; the tier maps in
//! [`crate::state::PerUserState`] enforce that by purging siblings on every
//! transition.

use crate::paths;
use crate::sdk::{EntryKind, RemoteFile, Stats};
use uuid::Uuid;

/// File or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Directory,
}

impl From<EntryKind> for ResourceKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => ResourceKind::File,
            EntryKind::Directory => ResourceKind::Directory,
        }
    }
}

/// Attributes shared by every tier.
#[derive(Debug, Clone)]
pub struct ResourceHeader {
    pub uuid: Uuid,
    pub kind: ResourceKind,
    /// Absolute POSIX path, no trailing slash except root.
    pub path: String,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub chunks: u64,
    pub mtime_ms: i64,
    pub birthtime_ms: i64,
    pub last_modified: i64,
    pub creation: i64,
    pub hash: Option<String>,
}

/// A resolved resource, tagged by tier.
#[derive(Debug, Clone)]
pub enum Resource {
    Backend {
        header: ResourceHeader,
        bucket: String,
        region: String,
        version: u32,
        /// Per-file content key. Opaque here; never logged.
        key: String,
    },
    Virtual {
        header: ResourceHeader,
    },
    Disk {
        header: ResourceHeader,
        temp_disk_id: String,
    },
}

impl Resource {
    /// Wrap an SDK `stat` result as a backend-tier resource at `path`.
    pub fn from_stats(path: &str, stats: Stats) -> Self {
        let path = paths::normalize(path);
        Resource::Backend {
            header: ResourceHeader {
                uuid: stats.uuid,
                kind: stats.kind.into(),
                name: if path == "/" { String::new() } else { paths::base_name(&path) },
                path,
                mime: stats.mime,
                size: stats.size,
                chunks: stats.chunks,
                mtime_ms: stats.mtime_ms,
                birthtime_ms: stats.birthtime_ms,
                last_modified: stats.last_modified,
                creation: stats.creation,
                hash: stats.hash,
            },
            bucket: stats.bucket,
            region: stats.region,
            version: stats.version,
            key: stats.key,
        }
    }

    /// Zero-byte placeholder materialized by an empty `PUT`.
    pub fn virtual_placeholder(path: &str) -> Self {
        let path = paths::normalize(path);
        let name = paths::base_name(&path);
        let now = chrono::Utc::now().timestamp_millis();
        Resource::Virtual {
            header: ResourceHeader {
                uuid: Uuid::new_v4(),
                kind: ResourceKind::File,
                mime: paths::mime_for_name(&name),
                name,
                path,
                size: 0,
                chunks: 1,
                mtime_ms: now,
                birthtime_ms: now,
                last_modified: now,
                creation: now,
                hash: None,
            },
        }
    }

    /// Scratch-tier file written by a sidecar-glob `PUT`.
    pub fn disk_scratch(path: &str, temp_disk_id: String, size: u64, chunk_size: u64) -> Self {
        let path = paths::normalize(path);
        let name = paths::base_name(&path);
        let now = chrono::Utc::now().timestamp_millis();
        Resource::Disk {
            header: ResourceHeader {
                uuid: Uuid::new_v4(),
                kind: ResourceKind::File,
                mime: paths::mime_for_name(&name),
                name,
                path,
                size,
                chunks: size.div_ceil(chunk_size).max(1),
                mtime_ms: now,
                birthtime_ms: now,
                last_modified: now,
                creation: now,
                hash: None,
            },
            temp_disk_id,
        }
    }

    pub fn header(&self) -> &ResourceHeader {
        match self {
            Resource::Backend { header, .. }
            | Resource::Virtual { header }
            | Resource::Disk { header, .. } => header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ResourceHeader {
        match self {
            Resource::Backend { header, .. }
            | Resource::Virtual { header }
            | Resource::Disk { header, .. } => header,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.header().kind == ResourceKind::Directory
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Resource::Virtual { .. })
    }

    pub fn path(&self) -> &str {
        &self.header().path
    }

    pub fn size(&self) -> u64 {
        self.header().size
    }

    /// The resource's URL: `path` for files, `path + "/"` for directories,
    /// `/` for the root.
    pub fn url(&self) -> String {
        let header = self.header();
        if header.kind == ResourceKind::Directory {
            if header.path == "/" {
                "/".to_string()
            } else {
                format!("{}/", header.path)
            }
        } else {
            header.path.clone()
        }
    }

    /// Re-key this resource to a new path, refreshing name and mime. Used by
    /// MOVE/COPY of non-backend tiers.
    pub fn rekeyed(&self, new_path: &str) -> Self {
        let mut moved = self.clone();
        let header = moved.header_mut();
        header.path = paths::normalize(new_path);
        header.name = paths::base_name(&header.path);
        if header.kind == ResourceKind::File {
            header.mime = paths::mime_for_name(&header.name);
        }
        moved
    }

    /// Download parameters for a backend-tier file.
    pub fn remote_file(&self) -> Option<RemoteFile> {
        match self {
            Resource::Backend {
                header,
                bucket,
                region,
                version,
                key,
            } => Some(RemoteFile {
                uuid: header.uuid,
                bucket: bucket.clone(),
                region: region.clone(),
                version: *version,
                key: key.clone(),
                size: header.size,
                chunks: header.chunks,
            }),
            _ => None,
        }
    }
}
