//! OPTIONS handler: advertise capabilities via the common headers.

use super::{empty_status, BoxedBody};
use hyper::{Response, StatusCode};

pub fn handle() -> Response<BoxedBody> {
    empty_status(StatusCode::OK)
}
