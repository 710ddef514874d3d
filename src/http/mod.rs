//! HTTP protocol layer module
//!
//! Protocol-level building blocks, decoupled from how resources are found:
//! conditional requests, byte ranges and their multipart framing, content
//! type detection, error rendering and response bodies.

pub mod body;
pub mod cache;
pub mod error;
pub mod mime;
pub mod multipart;
pub mod range;
pub mod response;

// Re-export commonly used types
pub use body::{ResponseBody, PIPE_CAPACITY};
pub use error::ServeError;
pub use range::{parse_range, ByteRange, RangeError};
pub use response::{
    build_416_response, build_error_response, build_html_response, build_not_modified_response,
    build_precondition_failed_response, build_redirect_response,
};
