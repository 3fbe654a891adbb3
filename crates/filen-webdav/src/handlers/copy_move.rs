//! COPY and MOVE handlers.
//!
//! Both share the Destination preconditions (valid URL on the request host,
//! no traversal, no destination inside the source tree), then dispatch on
//! the source tier. Overwriting a destination purges it first; the purge is
//! permanent
//! for virtual- and disk-tier sources (those tiers are ephemeral by
//! construction) and a soft trash delete for backend-tier sources.

use super::{empty_status, remove_scratch_file, BoxedBody};
use crate::error::{WebDavError, WebDavResult};
use crate::paths;
use crate::resource::Resource;
use crate::server::Gateway;
use crate::state::PerUserState;
use hyper::header::HOST;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use tracing::debug;

/// Parse and validate the `Destination` header into a normalized path.
fn destination_path(parts: &Parts) -> WebDavResult<String> {
    let raw = parts
        .headers
        .get("destination")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| WebDavError::InvalidRequest("missing Destination header".to_string()))?;

    let url = url::Url::parse(raw)
        .map_err(|e| WebDavError::InvalidRequest(format!("invalid Destination: {e}")))?;
    let dest_host = url
        .host_str()
        .ok_or_else(|| WebDavError::InvalidRequest("Destination without host".to_string()))?;

    let request_host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
        .map(|h| h.split(':').next().unwrap_or(h))
        .ok_or_else(|| WebDavError::InvalidRequest("request without Host".to_string()))?;
    if dest_host != request_host {
        return Err(WebDavError::InvalidRequest(format!(
            "Destination host {dest_host} does not match request host"
        )));
    }

    let decoded = paths::decode_url_path(url.path())?;
    if paths::is_traversal(decoded.trim_start_matches('/')) {
        return Err(WebDavError::Forbidden(format!(
            "Destination escapes the tree: {decoded}"
        )));
    }
    Ok(decoded)
}

/// Remove an existing destination before an overwriting COPY/MOVE.
async fn purge_destination(
    gateway: &Gateway,
    user: &PerUserState,
    destination: &Resource,
    permanent: bool,
) -> WebDavResult<()> {
    let path = destination.path().to_string();
    match destination {
        Resource::Virtual { .. } => {
            user.virtual_files.remove(&path);
        }
        Resource::Disk { temp_disk_id, .. } => {
            remove_scratch_file(&gateway.scratch_path(temp_disk_id)).await?;
            user.disk_files.remove(&path);
        }
        Resource::Backend { .. } => {
            user.client.unlink(&path, permanent).await?;
        }
    }
    Ok(())
}

pub async fn handle(
    gateway: &Gateway,
    user: &PerUserState,
    parts: &Parts,
    is_move: bool,
) -> WebDavResult<Response<BoxedBody>> {
    let source_path = paths::decode_url_path(parts.uri.path())?;
    let dest_path = destination_path(parts)?;

    let (source, destination) =
        tokio::join!(user.resolve(&source_path), user.resolve(&dest_path));
    let source = source?.ok_or_else(|| WebDavError::NotFound(source_path.clone()))?;
    let destination = destination?;

    if source_path == dest_path {
        return Ok(empty_status(StatusCode::CREATED));
    }

    // A destination inside the source tree would re-parent the source into
    // itself.
    if dest_path.starts_with(&format!("{source_path}/")) {
        return Err(WebDavError::Forbidden(format!(
            "destination {dest_path} is a descendant of {source_path}"
        )));
    }

    let overwrite = parts
        .headers
        .get("overwrite")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("t"))
        .unwrap_or(false);

    let overwriting = destination.is_some();
    if let Some(existing) = destination {
        if !overwrite {
            return Err(WebDavError::Forbidden(format!(
                "destination {dest_path} already exists"
            )));
        }
        // Virtual and disk sources delete the shadowed destination for good.
        let permanent = !matches!(source, Resource::Backend { .. });
        purge_destination(gateway, user, &existing, permanent).await?;
    }

    match &source {
        Resource::Virtual { .. } => {
            let moved = source.rekeyed(&dest_path);
            if is_move {
                user.virtual_files.remove(&source_path);
            }
            user.virtual_files.insert(dest_path.clone(), moved);
        }
        Resource::Disk { temp_disk_id, .. } => {
            let new_id = paths::temp_disk_id(&user.username, &dest_path);
            let old_file = gateway.scratch_path(temp_disk_id);
            let new_file = gateway.scratch_path(&new_id);
            if is_move {
                tokio::fs::rename(&old_file, &new_file).await?;
                user.disk_files.remove(&source_path);
            } else {
                tokio::fs::copy(&old_file, &new_file).await?;
            }
            let mut moved = source.rekeyed(&dest_path);
            if let Resource::Disk { temp_disk_id, .. } = &mut moved {
                *temp_disk_id = new_id;
            }
            user.disk_files.insert(dest_path.clone(), moved);
        }
        Resource::Backend { .. } => {
            if is_move {
                user.client.rename(&source_path, &dest_path).await?;
            } else {
                user.client.cp(&source_path, &dest_path).await?;
            }
        }
    }

    debug!(
        source = %source_path,
        destination = %dest_path,
        is_move,
        overwriting,
        "copy/move complete"
    );
    Ok(empty_status(if overwriting {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CREATED
    }))
}
