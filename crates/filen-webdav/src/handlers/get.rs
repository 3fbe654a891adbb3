//! GET handler: stream file bodies out of whichever tier holds them.

use super::{empty_status, stream_body, BoxedBody};
use crate::error::{WebDavError, WebDavResult};
use crate::resource::Resource;
use crate::server::Gateway;
use crate::state::PerUserState;
use crate::{paths, sdk::ByteStream};
use hyper::http::request::Parts;
use hyper::header::{HeaderMap, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use hyper::{Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Parsed inclusive byte range.
pub(super) struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse `Range: bytes=start-[end]`, also accepting the legacy
/// `Content-Range` request form some clients send. Malformed or
/// unsatisfiable ranges are a `400`.
pub(super) fn parse_range(headers: &HeaderMap, size: u64) -> WebDavResult<Option<ByteRange>> {
    let raw = headers
        .get(RANGE)
        .or_else(|| headers.get(CONTENT_RANGE))
        .and_then(|v| v.to_str().ok());
    let Some(raw) = raw else {
        return Ok(None);
    };

    let bad = || WebDavError::InvalidRequest(format!("invalid range: {raw}"));
    let spec = raw.trim().strip_prefix("bytes=").ok_or_else(bad)?;
    let (start_str, end_str) = spec.split_once('-').ok_or_else(bad)?;
    let start: u64 = start_str.trim().parse().map_err(|_| bad())?;
    let end: u64 = if end_str.trim().is_empty() {
        size.saturating_sub(1)
    } else {
        end_str.trim().parse().map_err(|_| bad())?
    };

    if start > end || end >= size {
        return Err(bad());
    }
    Ok(Some(ByteRange { start, end }))
}

/// Content headers shared by GET and HEAD.
pub(super) fn content_headers(
    resp: &mut Response<BoxedBody>,
    name: &str,
    size: u64,
    range: Option<&ByteRange>,
) {
    if range.is_some() {
        *resp.status_mut() = StatusCode::PARTIAL_CONTENT;
    }
    let headers = resp.headers_mut();
    if let Ok(mime) = HeaderValue::from_str(&paths::mime_for_name(name)) {
        headers.insert(CONTENT_TYPE, mime);
    }
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    let length = range.map_or(size, ByteRange::len);
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    if let Some(range) = range {
        if let Ok(value) =
            HeaderValue::from_str(&format!("bytes {}-{}/{size}", range.start, range.end))
        {
            headers.insert(CONTENT_RANGE, value);
        }
    }
}

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
    if resource.is_dir() {
        return Err(WebDavError::Forbidden(format!("GET of directory {path}")));
    }

    // A virtual placeholder has no bytes anywhere yet.
    if resource.is_virtual() {
        let mut resp = empty_status(StatusCode::OK);
        if let Ok(mime) = HeaderValue::from_str(&resource.header().mime) {
            resp.headers_mut().insert(CONTENT_TYPE, mime);
        }
        return Ok(resp);
    }

    let size = resource.size();
    let range = parse_range(&parts.headers, size)?;
    let (start, end) = match &range {
        Some(r) => (r.start, r.end),
        None => (0, size.saturating_sub(1)),
    };

    let stream: ByteStream = match &resource {
        Resource::Disk { temp_disk_id, .. } => {
            let mut file = tokio::fs::File::open(gateway.scratch_path(temp_disk_id)).await?;
            file.seek(std::io::SeekFrom::Start(start)).await?;
            let len = end - start + 1;
            Box::pin(ReaderStream::new(file.take(len)))
        }
        Resource::Backend { .. } => {
            let remote = resource
                .remote_file()
                .ok_or_else(|| WebDavError::Internal("backend resource without file".into()))?;
            user.client.download_file_stream(&remote, start, end).await?
        }
        Resource::Virtual { .. } => {
            return Err(WebDavError::Internal("virtual resource past empty-body check".into()))
        }
    };

    debug!(path = %path, start, end, ranged = range.is_some(), "streaming download");

    let mut resp = Response::new(stream_body(stream));
    content_headers(&mut resp, &resource.header().name, size, range.as_ref());
    Ok(resp)
}
