//! WebDAV method dispatch.
//!
//! Per-request flow: rate limit, authenticate, dispatch to the verb handler,
//! then stamp the common DAV headers on whatever comes back. Handler errors
//! are logged with a handler tag and collapse to their mapped status with an
//! empty body; the response is built exactly once, so headers cannot be
//! written twice.

mod copy_move;
mod delete;
mod get;
mod head;
mod lock;
mod mkcol;
mod options;
mod propfind;
mod proppatch;
mod put;

use crate::config::RateLimitKey;
use crate::error::WebDavError;
use crate::server::Gateway;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::{Method, Request, Response, StatusCode};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Response body type shared by all handlers.
pub type BoxedBody = BoxBody<Bytes, io::Error>;

/// Verbs advertised in `Allow` and `OPTIONS`.
pub const ALLOW: &str = "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, PROPPATCH, MKCOL, COPY, MOVE";

/// How long scratch-file removal retries before giving up.
const SCRATCH_REMOVE_WINDOW: Duration = Duration::from_secs(600);

/// An empty-body response with an explicit `Content-Length: 0`.
pub fn empty_status(status: StatusCode) -> Response<BoxedBody> {
    let mut resp = Response::new(
        Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed(),
    );
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    resp
}

/// An XML response with the declared DAV content type.
pub fn xml_response(status: StatusCode, body: String) -> Response<BoxedBody> {
    let bytes = Bytes::from(body);
    let len = bytes.len();
    let mut resp = Response::new(
        Full::new(bytes).map_err(|never| match never {}).boxed(),
    );
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/xml; charset=utf-8"),
    );
    resp.headers_mut().insert(
        CONTENT_LENGTH,
        HeaderValue::from_str(&len.to_string()).unwrap_or(HeaderValue::from_static("0")),
    );
    resp
}

/// Wrap a byte stream as a response body.
pub fn stream_body(stream: crate::sdk::ByteStream) -> BoxedBody {
    use futures::TryStreamExt;
    StreamBody::new(stream.map_ok(Frame::data)).boxed()
}

/// Remove a scratch file, retrying while the filesystem holds it open
/// (Windows keeps handles on sidecar files surprisingly long).
pub(crate) async fn remove_scratch_file(path: &Path) -> std::io::Result<()> {
    let deadline = tokio::time::Instant::now() + SCRATCH_REMOVE_WINDOW;
    loop {
        match tokio::fs::remove_file(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(e);
                }
                sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

fn apply_common_headers(resp: &mut Response<BoxedBody>) {
    let headers = resp.headers_mut();
    headers.insert("Allow", HeaderValue::from_static(ALLOW));
    headers.insert("DAV", HeaderValue::from_static("1, 2"));
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Credentials",
        HeaderValue::from_static("true"),
    );
    headers.insert(
        "Access-Control-Expose-Headers",
        HeaderValue::from_static("DAV, content-length, Allow"),
    );
    headers.insert("MS-Author-Via", HeaderValue::from_static("DAV"));
    headers.insert("Server", HeaderValue::from_static("Filen WebDAV"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
}

/// Serve one request end to end.
pub async fn dispatch(
    gateway: &Arc<Gateway>,
    req: Request<Incoming>,
    peer: SocketAddr,
) -> Response<BoxedBody> {
    let method = req.method().clone();
    let uri_path = req.uri().path().to_string();

    // Rate limit before anything touches the SDK.
    let rate_key = match gateway.config.rate_limit.key {
        RateLimitKey::Ip => peer.ip().to_string(),
        RateLimitKey::Username => gateway
            .auth
            .claimed_username(req.headers())
            .unwrap_or_else(|| peer.ip().to_string()),
    };
    if !gateway.limiter.check(&rate_key) {
        debug!(method = %method, path = %uri_path, "rate limited");
        let mut resp = empty_status(StatusCode::TOO_MANY_REQUESTS);
        apply_common_headers(&mut resp);
        return resp;
    }

    let user = match gateway.auth.authenticate(&method, req.headers()).await {
        Ok(user) => user,
        Err(_) => {
            let mut resp = empty_status(StatusCode::UNAUTHORIZED);
            if let Ok(challenge) = HeaderValue::from_str(&gateway.auth.challenge()) {
                resp.headers_mut().insert(WWW_AUTHENTICATE, challenge);
            }
            apply_common_headers(&mut resp);
            return resp;
        }
    };

    let (parts, body) = req.into_parts();
    let result = match parts.method.clone() {
        Method::OPTIONS => Ok(options::handle()),
        Method::HEAD => head::handle(&user, &parts).await,
        Method::GET => get::handle(gateway, &user, &parts).await,
        Method::PUT | Method::POST => put::handle(gateway, &user, &parts, body).await,
        Method::DELETE => delete::handle(gateway, &user, &parts).await,
        method => match method.as_str() {
            "PROPFIND" => propfind::handle(&user, &parts, body).await,
            "PROPPATCH" => proppatch::handle(&user, &parts, body).await,
            "MKCOL" => mkcol::handle(&user, &parts).await,
            "COPY" => copy_move::handle(gateway, &user, &parts, false).await,
            "MOVE" => copy_move::handle(gateway, &user, &parts, true).await,
            "LOCK" | "UNLOCK" => lock::handle(),
            other => {
                warn!(method = %other, path = %uri_path, "unsupported verb");
                Err(WebDavError::InvalidRequest(format!("unsupported verb {other}")))
            }
        },
    };

    let mut resp = match result {
        Ok(resp) => resp,
        Err(e) => {
            match &e {
                WebDavError::NotFound(_) => {
                    debug!(method = %method, path = %uri_path, error = %e, "request failed")
                }
                WebDavError::Sdk(_) | WebDavError::Io(_) | WebDavError::Internal(_) => {
                    error!(method = %method, path = %uri_path, error = %e, "request failed")
                }
                _ => warn!(method = %method, path = %uri_path, error = %e, "request failed"),
            }
            let mut resp = empty_status(e.status());
            if matches!(e, WebDavError::Unauthenticated) {
                if let Ok(challenge) = HeaderValue::from_str(&gateway.auth.challenge()) {
                    resp.headers_mut().insert(WWW_AUTHENTICATE, challenge);
                }
            }
            resp
        }
    };
    apply_common_headers(&mut resp);
    resp
}
