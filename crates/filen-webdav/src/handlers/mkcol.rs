//! MKCOL handler.
//!
//! The SDK de-duplicates name+parent collisions, so MKCOL on an existing
//! directory stays lenient and answers `201` rather than the strict RFC
//! 4918 `405`; known clients retry on anything else.

use super::{empty_status, BoxedBody};
use crate::error::{WebDavError, WebDavResult};
use crate::paths;
use crate::state::PerUserState;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};

pub async fn handle(user: &PerUserState, parts: &Parts) -> WebDavResult<Response<BoxedBody>> {
    let path = paths::decode_url_path(parts.uri.path())?;
    let parent = paths::parent_path(&path);

    let parent_resource = user
        .resolve(&parent)
        .await?
        .ok_or_else(|| WebDavError::PreconditionFailed(format!("missing parent {parent}")))?;
    if !parent_resource.is_dir() {
        return Err(WebDavError::PreconditionFailed(format!(
            "parent {parent} is not a directory"
        )));
    }

    user.client.mkdir(&path).await?;

    let created = user
        .resolve(&path)
        .await?
        .ok_or_else(|| WebDavError::NotFound(path.clone()))?;
    if !created.is_dir() {
        return Err(WebDavError::NotFound(path));
    }

    Ok(empty_status(StatusCode::CREATED))
}
