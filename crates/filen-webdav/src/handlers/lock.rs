//! LOCK/UNLOCK handler.
//!
//! Advisory locking is intentionally stubbed: no lock database exists, and
//! clients that insist on locking fall back to optimistic concurrency.

use super::BoxedBody;
use crate::error::WebDavResult;
use hyper::Response;

pub fn handle() -> WebDavResult<Response<BoxedBody>> {
    Err(crate::error::WebDavError::NotImplemented)
}
