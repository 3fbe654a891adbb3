//! HEAD handler: content headers only, no body.

use super::get::{content_headers, parse_range};
use super::{empty_status, BoxedBody};
use crate::error::{WebDavError, WebDavResult};
use crate::paths;
use crate::state::PerUserState;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};

pub async fn handle(user: &PerUserState, parts: &Parts) -> WebDavResult<Response<BoxedBody>> {
    let path = paths::decode_url_path(parts.uri.path())?;
    let resource = user
        .resolve(&path)
        .await?
        .ok_or_else(|| WebDavError::NotFound(path.clone()))?;
    if resource.is_dir() {
        return Err(WebDavError::Forbidden(format!("HEAD of directory {path}")));
    }

    let size = resource.size();
    let range = parse_range(&parts.headers, size)?;

    let mut resp = empty_status(StatusCode::OK);
    content_headers(&mut resp, &resource.header().name, size, range.as_ref());
    Ok(resp)
}
