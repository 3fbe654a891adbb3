//! Request body framing.
//!
//! Some WebDAV clients open a file with a zero-length `PUT` to probe for
//! writability before writing any bytes; others stream multi-gigabyte
//! bodies. For `PUT`/`POST` the framer reads exactly one byte (bounded by a
//! timeout), then hands back a stream that replays that byte followed by the
//! unread remainder, with no whole-body buffering. Every other verb gets its
//! body as bounded XML text.

use crate::error::{WebDavError, WebDavResult};
use crate::sdk::ByteStream;
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{BodyExt, BodyStream, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderMap, CONTENT_TYPE};
use std::io;
use std::time::Duration;

/// Hard cap for XML request bodies.
const XML_BODY_LIMIT: usize = 1024 * 1024;

/// A framed `PUT`/`POST` body.
pub enum FramedBody {
    /// The client sent no bytes: Content-Length 0, early close, or silence
    /// past the first-byte timeout. This is the zero-byte-create probe.
    Empty,
    /// At least one byte arrived. The stream replays the peeked first byte
    /// followed by the rest of the body.
    Data { first: u8, stream: ByteStream },
}

/// Peek the first body byte without consuming the stream.
pub async fn frame_put_body(body: Incoming, first_byte_timeout: Duration) -> WebDavResult<FramedBody> {
    let mut frames = BodyStream::new(body);

    // Skip empty data frames until real bytes, end of body, or timeout.
    let head: Option<Bytes> = loop {
        let next = match tokio::time::timeout(first_byte_timeout, frames.next()).await {
            Err(_) => break None,
            Ok(next) => next,
        };
        match next {
            None => break None,
            Some(Err(e)) => {
                // Early close before any byte counts as an empty probe.
                return if e.is_incomplete_message() {
                    Ok(FramedBody::Empty)
                } else {
                    Err(WebDavError::Io(io::Error::other(e)))
                };
            }
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) if !data.is_empty() => break Some(data),
                // Empty data frame or trailers: keep polling.
                _ => {}
            },
        }
    };

    let Some(head) = head else {
        return Ok(FramedBody::Empty);
    };

    let first = head[0];
    let rest = frames.filter_map(|frame| async move {
        match frame {
            Ok(frame) => frame.into_data().ok().map(Ok),
            Err(e) => Some(Err(io::Error::other(e))),
        }
    });
    let stream: ByteStream = Box::pin(futures::stream::iter([Ok(head)]).chain(rest));
    Ok(FramedBody::Data { first, stream })
}

/// Read an XML request body into a string, bounded at 1 MiB.
///
/// Returns `None` when the body is empty or the declared content type is not
/// XML.
pub async fn read_xml_body(body: Incoming, headers: &HeaderMap) -> WebDavResult<Option<String>> {
    let is_xml = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/xml") || ct.contains("text/xml"))
        .unwrap_or(false);

    let declared_empty = body.size_hint().exact() == Some(0);
    if declared_empty {
        return Ok(None);
    }

    let collected = Limited::new(body, XML_BODY_LIMIT)
        .collect()
        .await
        .map_err(|e| WebDavError::InvalidRequest(format!("request body: {e}")))?;
    let bytes = collected.to_bytes();
    if bytes.is_empty() || !is_xml {
        return Ok(None);
    }

    let text = String::from_utf8(bytes.to_vec())
        .map_err(|_| WebDavError::InvalidRequest("request body is not UTF-8".to_string()))?;
    Ok(Some(text))
}

/// Drain a byte stream into a writer, counting bytes. Used by the scratch
/// tier, which pipes the framed body straight to disk.
pub async fn pipe_to_file(
    mut stream: ByteStream,
    file: &mut tokio::fs::File,
) -> WebDavResult<u64> {
    use tokio::io::AsyncWriteExt;

    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
