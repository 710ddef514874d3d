//! HTTP Range request parsing module
//!
//! Byte-range parsing for partial and multi-range downloads (RFC 7233).

use thiserror::Error;

/// A contiguous, in-bounds byte span of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Always positive
    pub length: u64,
}

impl ByteRange {
    /// Last byte position covered (inclusive)
    pub const fn end(&self) -> u64 {
        self.start + self.length - 1
    }

    /// `Content-Range` value against a resource of `size` bytes
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{size}", self.start, self.end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    /// Syntactically invalid header
    #[error("invalid range")]
    Malformed,
    /// Well-formed, but no requested span overlaps the resource
    #[error("invalid range: failed to overlap")]
    NoOverlap,
}

/// Parse a `Range` header value against a resource of `size` bytes
///
/// Supported forms, comma-separated:
/// - `start-end` - inclusive span, `end` clamped to the last byte
/// - `start-` - from `start` to the end
/// - `-suffix` - the last `suffix` bytes
///
/// Spans starting at or past the end are skipped; if that leaves nothing,
/// [`RangeError::NoOverlap`] is returned. An empty header yields no ranges.
///
/// # Examples
/// ```
/// use dirserve::http::range::{parse_range, ByteRange};
///
/// let ranges = parse_range("bytes=0-99,-10", 1000).unwrap();
/// assert_eq!(ranges[0], ByteRange { start: 0, length: 100 });
/// assert_eq!(ranges[1], ByteRange { start: 990, length: 10 });
/// ```
pub fn parse_range(header: &str, size: u64) -> Result<Vec<ByteRange>, RangeError> {
    if header.is_empty() {
        return Ok(Vec::new());
    }
    let Some(specs) = header.strip_prefix("bytes=") else {
        return Err(RangeError::Malformed);
    };

    let mut ranges = Vec::new();
    let mut no_overlap = false;
    for spec in specs.split(',') {
        let spec = trim_ows(spec);
        if spec.is_empty() {
            continue;
        }
        let Some((start, end)) = spec.split_once('-') else {
            return Err(RangeError::Malformed);
        };
        let (start, end) = (trim_ows(start), trim_ows(end));

        if start.is_empty() {
            // Suffix form: the last `end` bytes
            if end.is_empty() || end.starts_with('-') {
                return Err(RangeError::Malformed);
            }
            let n: u64 = end.parse().map_err(|_| RangeError::Malformed)?;
            let n = n.min(size);
            if n == 0 {
                no_overlap = true;
                continue;
            }
            ranges.push(ByteRange {
                start: size - n,
                length: n,
            });
            continue;
        }

        let first: u64 = start.parse().map_err(|_| RangeError::Malformed)?;
        if first >= size {
            // Starts past the end; keep looking at the other specs
            no_overlap = true;
            continue;
        }
        let last = if end.is_empty() {
            size - 1
        } else {
            let last: u64 = end.parse().map_err(|_| RangeError::Malformed)?;
            if first > last {
                return Err(RangeError::Malformed);
            }
            last.min(size - 1)
        };
        ranges.push(ByteRange {
            start: first,
            length: last - first + 1,
        });
    }

    if no_overlap && ranges.is_empty() {
        return Err(RangeError::NoOverlap);
    }
    Ok(ranges)
}

/// Total bytes requested across all ranges
pub fn sum_ranges(ranges: &[ByteRange]) -> u64 {
    ranges.iter().map(|r| r.length).sum()
}

fn trim_ows(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const fn r(start: u64, length: u64) -> ByteRange {
        ByteRange { start, length }
    }

    #[rstest]
    #[case("bytes=0-4", 10, vec![r(0, 5)])]
    #[case("bytes=2-", 10, vec![r(2, 8)])]
    #[case("bytes=-3", 10, vec![r(7, 3)])]
    #[case("bytes=-100", 10, vec![r(0, 10)])]
    #[case("bytes=5-100", 10, vec![r(5, 5)])]
    #[case("bytes=0-0,-2", 10, vec![r(0, 1), r(8, 2)])]
    #[case("bytes= 1-2 , 4-5", 10, vec![r(1, 2), r(4, 2)])]
    #[case("bytes=0-1,,3-4", 10, vec![r(0, 2), r(3, 2)])]
    #[case("bytes=20-30,0-1", 10, vec![r(0, 2)])]
    #[case("", 10, vec![])]
    fn test_valid(#[case] header: &str, #[case] size: u64, #[case] expected: Vec<ByteRange>) {
        assert_eq!(parse_range(header, size).unwrap(), expected);
    }

    #[rstest]
    #[case("items=0-1")]
    #[case("bytes=5")]
    #[case("bytes=-")]
    #[case("bytes=--5")]
    #[case("bytes=5-2")]
    #[case("bytes=a-b")]
    #[case("bytes=1-x")]
    fn test_malformed(#[case] header: &str) {
        assert_eq!(parse_range(header, 10), Err(RangeError::Malformed));
    }

    #[rstest]
    #[case("bytes=10-", 10)]
    #[case("bytes=10-20,30-40", 10)]
    #[case("bytes=0-5", 0)]
    #[case("bytes=-0", 10)]
    #[case("bytes=-5", 0)]
    fn test_no_overlap(#[case] header: &str, #[case] size: u64) {
        assert_eq!(parse_range(header, size), Err(RangeError::NoOverlap));
    }

    #[test]
    fn test_content_range_and_sum() {
        let ranges = parse_range("bytes=0-4,6-", 10).unwrap();
        assert_eq!(ranges[0].content_range(10), "bytes 0-4/10");
        assert_eq!(ranges[1].content_range(10), "bytes 6-9/10");
        assert_eq!(sum_ranges(&ranges), 9);
    }

    #[test]
    fn test_overlapping_sum_can_exceed_size() {
        let ranges = parse_range("bytes=0-9,0-9", 10).unwrap();
        assert!(sum_ranges(&ranges) > 10);
    }
}
