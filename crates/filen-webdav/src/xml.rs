//! RFC 4918 XML response bodies.
//!
//! Emits the three multi-status shapes the gateway uses: the full-property
//! 207 for PROPFIND, the 404 multi-status for missing PROPFIND targets, and
//! the empty-prop 207 that answers every PROPPATCH. Also extracts the two
//! timestamp properties PROPPATCH may set, tolerating `d:`/`D:`/unprefixed
//! tag forms.

use crate::paths;
use crate::resource::{Resource, ResourceKind};
use crate::sdk::StatFs;
use std::fmt::Write as _;
use std::time::{Duration, UNIX_EPOCH};

/// RFC 1123 timestamp (`ddd, DD MMM YYYY HH:mm:ss GMT`) from unix millis.
pub fn http_date_ms(ms: i64) -> String {
    let time = if ms <= 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_millis(ms as u64)
    };
    httpdate::fmt_http_date(time)
}

/// Escape text for XML element content.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn envelope(inner: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:multistatus xmlns:D=\"DAV:\">{inner}</D:multistatus>"
    )
}

/// One `<D:response>` with the full property set at `HTTP/1.1 200 OK`.
fn response_element(resource: &Resource, quota: StatFs) -> String {
    let header = resource.header();
    let href = paths::encode_href(&resource.url());
    let is_dir = header.kind == ResourceKind::Directory;

    let content_type = if is_dir {
        "httpd/unix-directory".to_string()
    } else {
        header.mime.clone()
    };
    let resourcetype = if is_dir { "<D:collection/>" } else { "<D:file/>" };
    let length = if is_dir { 0 } else { header.size };
    let available = quota.max.saturating_sub(quota.used);

    let mut out = String::new();
    let _ = write!(
        out,
        "<D:response><D:href>{href}</D:href><D:propstat><D:prop>\
         <D:getlastmodified>{modified}</D:getlastmodified>\
         <D:displayname>{name}</D:displayname>\
         <D:getcontentlength>{length}</D:getcontentlength>\
         <D:getetag>{etag}</D:getetag>\
         <D:creationdate>{created}</D:creationdate>\
         <D:quota-available-bytes>{available}</D:quota-available-bytes>\
         <D:quota-used-bytes>{used}</D:quota-used-bytes>\
         <D:getcontenttype>{content_type}</D:getcontenttype>\
         <D:resourcetype>{resourcetype}</D:resourcetype>\
         </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>",
        href = escape_xml(&href),
        modified = http_date_ms(header.mtime_ms),
        name = escape_xml(&paths::encode_href(&header.name)),
        etag = header.uuid,
        created = http_date_ms(header.birthtime_ms),
        used = quota.used,
        content_type = escape_xml(&content_type),
    );
    out
}

/// 207 multi-status listing `resources` with the full property set.
pub fn multi_status(resources: &[Resource], quota: StatFs) -> String {
    let inner: String = resources
        .iter()
        .map(|r| response_element(r, quota))
        .collect();
    envelope(&inner)
}

/// 404 multi-status for a PROPFIND target no tier holds.
pub fn not_found(href: &str) -> String {
    envelope(&format!(
        "<D:response><D:href>{}</D:href><D:propstat><D:prop/>\
         <D:status>HTTP/1.1 404 NOT FOUND</D:status></D:propstat></D:response>",
        escape_xml(&paths::encode_href(href))
    ))
}

/// Empty-prop 207 closing every PROPPATCH.
pub fn proppatch(href: &str) -> String {
    envelope(&format!(
        "<D:response><D:href>{}</D:href><D:propstat><D:prop/>\
         <D:status>HTTP/1.1 207 Multi-Status</D:status></D:propstat></D:response>",
        escape_xml(&paths::encode_href(href))
    ))
}

/// Extract the text of the first element matching any of `names`,
/// case-insensitively, tolerating an optional namespace prefix.
pub fn extract_prop(body: &str, names: &[&str]) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    for name in names {
        let name = name.to_ascii_lowercase();
        let mut search = 0;
        while let Some(rel) = lower[search..].find(&name) {
            let start = search + rel;
            // Must be a tag open: "<name" or "<prefix:name".
            let tag_open = lower[..start].rfind('<').map(|lt| {
                let between = &lower[lt + 1..start];
                between.is_empty() || (between.ends_with(':') && !between.contains(['>', ' ']))
            });
            if tag_open != Some(true) {
                search = start + name.len();
                continue;
            }
            let after = &lower[start + name.len()..];
            let Some(gt) = after.find('>') else { break };
            if after[..gt].contains('/') {
                // Self-closing tag carries no value.
                search = start + name.len();
                continue;
            }
            let value_start = start + name.len() + gt + 1;
            let Some(end) = lower[value_start..].find('<') else { break };
            let value = body[value_start..value_start + end].trim().to_string();
            if !value.is_empty() {
                return Some(value);
            }
            search = value_start + end;
        }
    }
    None
}

/// Parse a PROPPATCH timestamp: RFC 1123 first, RFC 3339 as fallback.
pub fn parse_prop_date(value: &str) -> Option<i64> {
    if let Ok(time) = httpdate::parse_http_date(value) {
        let ms = time.duration_since(UNIX_EPOCH).ok()?.as_millis();
        return Some(ms as i64);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
