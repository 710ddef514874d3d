//! `multipart/byteranges` framing
//!
//! Wire layout for `n` ranges:
//!
//! ```text
//! --B\r\n                              (first part)
//! \r\n--B\r\n                          (later parts)
//! Content-Range: bytes s-e/size\r\n
//! Content-Type: <type>\r\n
//! \r\n
//! <bytes s..=e>
//! \r\n--B--\r\n                        (closing)
//! ```
//!
//! The framing is deterministic, so the total body length can be computed
//! up front and advertised as `Content-Length`.

use super::range::ByteRange;

/// Framing for one multi-range response
#[derive(Debug, Clone)]
pub struct MultipartRanges {
    boundary: String,
    content_type: String,
    size: u64,
}

impl MultipartRanges {
    /// Framing with a fresh random boundary
    pub fn new(content_type: &str, size: u64) -> Self {
        Self::with_boundary(uuid::Uuid::new_v4().simple().to_string(), content_type, size)
    }

    pub fn with_boundary(boundary: String, content_type: &str, size: u64) -> Self {
        Self {
            boundary,
            content_type: content_type.to_string(),
            size,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the response's own `Content-Type` header
    pub fn content_type_header(&self) -> String {
        format!("multipart/byteranges; boundary={}", self.boundary)
    }

    /// Delimiter and headers preceding the `index`-th part
    pub fn part_header(&self, index: usize, range: &ByteRange) -> String {
        let lead = if index == 0 { "" } else { "\r\n" };
        format!(
            "{lead}--{}\r\nContent-Range: {}\r\nContent-Type: {}\r\n\r\n",
            self.boundary,
            range.content_range(self.size),
            self.content_type
        )
    }

    /// Closing delimiter after `parts` parts
    pub fn closing(&self, parts: usize) -> String {
        let lead = if parts == 0 { "" } else { "\r\n" };
        format!("{lead}--{}--\r\n", self.boundary)
    }

    /// Exact number of body bytes the framed ranges will occupy
    pub fn encoded_len(&self, ranges: &[ByteRange]) -> u64 {
        let framing: u64 = ranges
            .iter()
            .enumerate()
            .map(|(i, r)| self.part_header(i, r).len() as u64 + r.length)
            .sum();
        framing + self.closing(ranges.len()).len() as u64
    }
}
