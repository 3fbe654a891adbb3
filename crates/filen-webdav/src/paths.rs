//! Path canonicalization, scratch-file naming, and href encoding.
//!
//! All request paths are percent-decoded exactly once on entry, then
//! normalized by stripping the trailing slash (except for root). Scratch
//! file ids are derived deterministically from `(username, path)` so a
//! re-upload of the same sidecar path lands on the same local file.

use crate::error::{WebDavError, WebDavResult};
use md5::{Digest, Md5};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when emitting hrefs and display names in XML bodies.
/// Slashes stay literal so collection hrefs remain readable to clients.
const HREF_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'#')
    .add(b'%')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'[')
    .add(b']');

/// Windows device names that must not appear as a bare file name.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Percent-decode a request URL path and normalize it.
///
/// The result always starts with `/` and carries no trailing slash unless it
/// is the root itself.
pub fn decode_url_path(raw: &str) -> WebDavResult<String> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|e| WebDavError::InvalidRequest(format!("invalid percent-encoding: {e}")))?;
    Ok(normalize(&decoded))
}

/// Strip the trailing slash (root excepted) and guarantee a leading slash.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Parent directory of a normalized path (`/` for top-level entries and root).
pub fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Final component of a normalized path. The root has no name.
pub fn base_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// True when a destination path tries to climb out of the tree.
pub fn is_traversal(path: &str) -> bool {
    path.starts_with("..") || path.starts_with("./") || path.starts_with("../")
}

/// Percent-encode a path or name for use inside an XML `<D:href>`.
pub fn encode_href(path: &str) -> String {
    utf8_percent_encode(path, HREF_ENCODE).to_string()
}

/// Deterministic scratch-file id for a `(username, path)` pair.
///
/// The digest keeps the id short and filesystem-neutral; sanitization guards
/// against control characters and reserved Windows device names.
pub fn temp_disk_id(username: &str, path: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(username.as_bytes());
    hasher.update(b"_");
    hasher.update(path.as_bytes());
    sanitize_file_name(&hex::encode(hasher.finalize()))
}

/// Strip control characters, path separators, and reserved device names;
/// truncate to 255 bytes.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();

    let stem = out.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        out = format!("_{out}");
    }

    while out.len() > 255 {
        out.pop();
    }
    out
}

/// MIME type for a file name, defaulting to `application/octet-stream`.
pub fn mime_for_name(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
