//! Request failure taxonomy
//!
//! Failures are rendered with fixed, generic messages so that host paths
//! and OS error text never reach the client. The underlying cause is
//! logged instead.

use super::body::ResponseBody;
use super::range::RangeError;
use super::response::{build_416_response, build_error_response, build_precondition_failed_response};
use crate::fs::FsError;
use hyper::header::HeaderMap;
use hyper::{Response, StatusCode};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("malformed range")]
    MalformedRange,
    #[error("range not satisfiable for size {size}")]
    RangeNotSatisfiable { size: u64 },
    #[error("precondition failed")]
    PreconditionFailed,
    #[error("seek failed: {0}")]
    SeekFailure(#[source] io::Error),
    #[error("invalid URL path")]
    InvalidPath,
    #[error("internal error: {0}")]
    Internal(#[source] io::Error),
}

impl From<FsError> for ServeError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => Self::NotFound,
            FsError::PermissionDenied => Self::PermissionDenied,
            FsError::Io(e) => Self::Internal(e),
        }
    }
}

impl ServeError {
    /// Classify a range parse failure against a resource of `size` bytes
    pub const fn from_range(err: RangeError, size: u64) -> Self {
        match err {
            RangeError::Malformed => Self::MalformedRange,
            RangeError::NoOverlap => Self::RangeNotSatisfiable { size },
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::MalformedRange | Self::InvalidPath => StatusCode::BAD_REQUEST,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::SeekFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the failure as a client-safe response
    pub fn into_response(self) -> Response<ResponseBody> {
        let status = self.status();
        match self {
            Self::NotFound => build_error_response(status, "404 page not found"),
            Self::PermissionDenied => build_error_response(status, "403 Forbidden"),
            Self::MalformedRange => build_error_response(status, "invalid range"),
            Self::RangeNotSatisfiable { size } => build_416_response(size),
            Self::PreconditionFailed => build_precondition_failed_response(HeaderMap::new()),
            Self::SeekFailure(ref e) => {
                crate::logger::log_error(&format!("Seek failed: {e}"));
                build_error_response(status, "seeker can't seek")
            }
            Self::InvalidPath => build_error_response(status, "invalid URL path"),
            Self::Internal(ref e) => {
                crate::logger::log_error(&format!("Internal error: {e}"));
                build_error_response(status, "500 Internal Server Error")
            }
        }
    }
}
