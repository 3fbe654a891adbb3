//! PUT/POST handler.
//!
//! Three outcomes, decided after framing the body:
//!
//! 1. **Empty body**: the open-then-write probe Finder and Explorer send.
//!    A zero-byte virtual resource is materialized so the immediately
//!    following PROPFIND/HEAD/GET sees the file.
//! 2. **Sidecar glob match**: the body is piped to a local scratch file
//!    and never reaches the encrypted store.
//! 3. **Everything else**: the body streams straight into the SDK upload,
//!    first byte included, with no whole-body buffering.
//!
//! No path locking: concurrent writes to the same path are last-writer-wins
//! at the backend.

use super::{empty_status, remove_scratch_file, BoxedBody};
use crate::body::{frame_put_body, pipe_to_file, FramedBody};
use crate::error::{WebDavError, WebDavResult};
use crate::resource::Resource;
use crate::sdk::EntryKind;
use crate::server::Gateway;
use crate::state::PerUserState;
use crate::paths;
use hyper::body::Incoming;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use tracing::{debug, warn};

pub async fn handle(
    gateway: &Gateway,
    user: &PerUserState,
    parts: &Parts,
    body: Incoming,
) -> WebDavResult<Response<BoxedBody>> {
    let path = paths::decode_url_path(parts.uri.path())?;
    let parent = paths::parent_path(&path);
    let name = paths::base_name(&path);
    if name.is_empty() {
        return Err(WebDavError::InvalidRequest("PUT to root".to_string()));
    }

    // A directory at the target path cannot be overwritten with a file.
    if let Ok(existing) = user.client.stat(&path).await {
        if existing.kind == EntryKind::Directory {
            return Err(WebDavError::Forbidden(format!("PUT over directory {path}")));
        }
    }

    // Ensure the parent chain exists, then verify it really is a directory.
    if parent != "/" {
        if let Err(e) = user.client.mkdir(&parent).await {
            debug!(parent = %parent, error = %e, "mkdir before PUT failed");
        }
    }
    let parent_stats = user
        .client
        .stat(&parent)
        .await
        .map_err(|_| WebDavError::PreconditionFailed(format!("missing parent {parent}")))?;
    if parent_stats.kind != EntryKind::Directory {
        return Err(WebDavError::PreconditionFailed(format!(
            "parent {parent} is not a directory"
        )));
    }

    let framed = frame_put_body(body, gateway.config.first_byte_timeout).await?;

    match framed {
        FramedBody::Empty => {
            // Zero-byte probe: materialize a placeholder.
            debug!(path = %path, "empty PUT, creating virtual file");
            user.disk_files.remove(&path);
            user.virtual_files
                .insert(path.clone(), Resource::virtual_placeholder(&path));
            Ok(empty_status(StatusCode::CREATED))
        }
        FramedBody::Data { stream, .. } if gateway.matches_scratch(&path) => {
            // Sidecar file: keep the plaintext local, never upload.
            let temp_disk_id = paths::temp_disk_id(&user.username, &path);
            let scratch_path = gateway.scratch_path(&temp_disk_id);
            remove_scratch_file(&scratch_path).await?;

            let mut file = tokio::fs::File::create(&scratch_path).await?;
            let size = pipe_to_file(stream, &mut file).await?;

            debug!(path = %path, size, "stored sidecar file on disk");
            user.virtual_files.remove(&path);
            user.disk_files.insert(
                path.clone(),
                Resource::disk_scratch(
                    &path,
                    temp_disk_id,
                    size,
                    user.client.upload_chunk_size(),
                ),
            );
            Ok(empty_status(StatusCode::CREATED))
        }
        FramedBody::Data { first, stream } => {
            debug!(path = %path, first_byte = first, "streaming upload to store");
            match user
                .client
                .upload_file_stream(parent_stats.uuid, &name, stream)
                .await
            {
                Ok(stats) => {
                    // Rewrite the SDK's metadata index so the next stat sees
                    // the fresh file, then drop any stale overlay entries.
                    user.client.remove_cached_item(&path);
                    user.client.add_cached_item(&path, stats);
                    user.purge_tiers(&path);
                    Ok(empty_status(StatusCode::CREATED))
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "streamed upload failed");
                    user.purge_tiers(&path);
                    Err(WebDavError::Sdk(Box::new(e)))
                }
            }
        }
    }
}
