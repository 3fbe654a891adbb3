//! DELETE handler: purge the path from whichever tier holds it.

use super::{empty_status, remove_scratch_file, BoxedBody};
use crate::error::{WebDavError, WebDavResult};
use crate::paths;
use crate::resource::Resource;
use crate::server::Gateway;
use crate::state::PerUserState;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use tracing::debug;

pub async fn handle(
    gateway: &Gateway,
    user: &PerUserState,
    parts: &Parts,
) -> WebDavResult<Response<BoxedBody>> {
    let path = paths::decode_url_path(parts.uri.path())?;
    let resource = user
        .resolve(&path)
        .await?
        .ok_or_else(|| WebDavError::NotFound(path.clone()))?;

    match &resource {
        Resource::Virtual { .. } => {
            user.virtual_files.remove(&path);
        }
        Resource::Disk { temp_disk_id, .. } => {
            remove_scratch_file(&gateway.scratch_path(temp_disk_id)).await?;
            user.disk_files.remove(&path);
        }
        Resource::Backend { .. } => {
            // Soft delete: the entry lands in the account trash.
            user.client.unlink(&path, false).await?;
        }
    }

    debug!(path = %path, "deleted");
    Ok(empty_status(StatusCode::OK))
}
