//! Error handling and HTTP status mapping for the WebDAV gateway.
//!
//! Every handler returns [`WebDavResult`]; the dispatcher converts errors to
//! empty-body status responses. SDK "not found" errors are swallowed inside
//! the resolver and never reach this mapping directly.

use crate::sdk::SdkError;
use hyper::StatusCode;
use std::io;
use thiserror::Error;

/// Errors that can occur while serving a WebDAV request.
#[derive(Debug, Error)]
pub enum WebDavError {
    /// Malformed request: bad `Destination`, unparseable `Range`, unsupported verb.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or bad credentials. The response carries a `WWW-Authenticate`
    /// challenge; the message never says which credential was wrong.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Operation not allowed on this resource (directory HEAD, traversal,
    /// destination exists without `Overwrite: T`).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No tier holds the requested path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or non-directory parent on PUT/MKCOL.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// LOCK/UNLOCK are intentionally stubbed.
    #[error("not implemented")]
    NotImplemented,

    /// SDK RPC failure (boxed to keep the enum small).
    #[error("sdk error: {0}")]
    Sdk(Box<SdkError>),

    /// Scratch file or certificate IO failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Anything else: XML build error, stream pipeline error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WebDavError {
    /// HTTP status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            WebDavError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            WebDavError::Unauthenticated => StatusCode::UNAUTHORIZED,
            WebDavError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebDavError::NotFound(_) => StatusCode::NOT_FOUND,
            WebDavError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            WebDavError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            WebDavError::Sdk(_) | WebDavError::Io(_) | WebDavError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<SdkError> for WebDavError {
    fn from(e: SdkError) -> Self {
        match e {
            SdkError::NotFound(path) => WebDavError::NotFound(path),
            other => WebDavError::Sdk(Box::new(other)),
        }
    }
}

/// Result type for WebDAV operations.
pub type WebDavResult<T> = Result<T, WebDavError>;
