//! PROPFIND handler.
//!
//! The request body is accepted but not interpreted: every response carries
//! the full property set, which is what the supported clients consume. A
//! directory listing at `Depth != 0` merges the backend's children with any
//! virtual and disk overlay entries parented at that directory.

use super::{xml_response, BoxedBody};
use crate::body::read_xml_body;
use crate::error::WebDavResult;
use crate::paths;
use crate::resource::Resource;
use crate::state::PerUserState;
use crate::xml;
use hyper::body::Incoming;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use std::collections::HashSet;
use tracing::debug;

pub async fn handle(
    user: &PerUserState,
    parts: &Parts,
    body: Incoming,
) -> WebDavResult<Response<BoxedBody>> {
    let path = paths::decode_url_path(parts.uri.path())?;

    // Bounded read; the body's requested prop set is intentionally ignored.
    let _ = read_xml_body(body, &parts.headers).await;

    let depth = parts
        .headers
        .get("depth")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("1")
        .to_ascii_lowercase();

    let Some(resource) = user.resolve(&path).await? else {
        return Ok(xml_response(StatusCode::NOT_FOUND, xml::not_found(&path)));
    };

    let quota = user.statfs().await?;

    let mut resources = vec![resource.clone()];
    if resource.is_dir() && depth != "0" {
        resources.extend(directory_children(user, &path).await?);
    }

    debug!(path = %path, depth = %depth, entries = resources.len(), "propfind");
    Ok(xml_response(
        StatusCode::MULTI_STATUS,
        xml::multi_status(&resources, quota),
    ))
}

/// Backend children of `dir`, stat-ed in parallel, plus overlay entries.
async fn directory_children(user: &PerUserState, dir: &str) -> WebDavResult<Vec<Resource>> {
    let names = user.client.readdir(dir).await?;

    let stats = futures::future::join_all(names.iter().map(|name| {
        let child = join_child(dir, name);
        async move {
            let stats = user.client.stat(&child).await;
            (child, stats)
        }
    }))
    .await;

    let mut seen: HashSet<String> = HashSet::new();
    let mut children = Vec::with_capacity(stats.len());
    for (child, stats) in stats {
        // A child that vanished between readdir and stat is skipped.
        if let Ok(stats) = stats {
            seen.insert(child.clone());
            children.push(Resource::from_stats(&child, stats));
        }
    }

    for entry in user.virtual_files.iter() {
        if paths::parent_path(entry.key()) == dir && seen.insert(entry.key().clone()) {
            children.push(entry.value().clone());
        }
    }
    for entry in user.disk_files.iter() {
        if paths::parent_path(entry.key()) == dir && seen.insert(entry.key().clone()) {
            children.push(entry.value().clone());
        }
    }

    Ok(children)
}

fn join_child(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}
