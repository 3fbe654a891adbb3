//! PROPPATCH handler.
//!
//! Property storage is limited to timestamp mutation on files. Whatever the
//! outcome, the reply is the empty-prop 207; clients treat anything else
//! as a hard failure and stop syncing.

use super::{xml_response, BoxedBody};
use crate::body::read_xml_body;
use crate::error::{WebDavError, WebDavResult};
use crate::paths;
use crate::resource::Resource;
use crate::sdk::FileMetadata;
use crate::state::PerUserState;
use crate::xml;
use hyper::body::Incoming;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use tracing::debug;

pub async fn handle(
    user: &PerUserState,
    parts: &Parts,
    body: Incoming,
) -> WebDavResult<Response<BoxedBody>> {
    let path = paths::decode_url_path(parts.uri.path())?;
    let reply = || xml_response(StatusCode::MULTI_STATUS, xml::proppatch(&path));

    let resource = user
        .resolve(&path)
        .await?
        .ok_or_else(|| WebDavError::NotFound(path.clone()))?;

    // Directory timestamps are not stored; acknowledge and move on.
    if resource.is_dir() {
        return Ok(reply());
    }

    let Some(text) = read_xml_body(body, &parts.headers).await? else {
        return Ok(reply());
    };

    let last_modified = xml::extract_prop(&text, &["getlastmodified", "lastmodified"])
        .and_then(|v| xml::parse_prop_date(&v));
    let creation = xml::extract_prop(&text, &["creationdate", "getcreationdate"])
        .and_then(|v| xml::parse_prop_date(&v));

    if last_modified.is_none() && creation.is_none() {
        return Ok(reply());
    }

    match resource {
        Resource::Virtual { .. } => {
            if let Some(mut entry) = user.virtual_files.get_mut(&path) {
                apply(entry.value_mut(), last_modified, creation);
            }
        }
        Resource::Disk { .. } => {
            if let Some(mut entry) = user.disk_files.get_mut(&path) {
                apply(entry.value_mut(), last_modified, creation);
            }
        }
        Resource::Backend { ref header, ref key, .. } => {
            let meta = FileMetadata {
                name: header.name.clone(),
                key: key.clone(),
                last_modified: last_modified.unwrap_or(header.last_modified),
                creation: creation.unwrap_or(header.creation),
                hash: header.hash.clone(),
                size: header.size,
                mime: header.mime.clone(),
            };
            user.client.edit_file_metadata(header.uuid, meta).await?;

            // Refresh the SDK's metadata index so the next stat reflects
            // the patched timestamps.
            if let Ok(updated) = user.client.stat(&path).await {
                user.client.remove_cached_item(&path);
                user.client.add_cached_item(&path, updated);
            }
        }
    }

    debug!(path = %path, "patched timestamps");
    Ok(reply())
}

fn apply(resource: &mut Resource, last_modified: Option<i64>, creation: Option<i64>) {
    let header = resource.header_mut();
    if let Some(ms) = last_modified {
        header.last_modified = ms;
        header.mtime_ms = ms;
    }
    if let Some(ms) = creation {
        header.creation = ms;
        header.birthtime_ms = ms;
    }
}
