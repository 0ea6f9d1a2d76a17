//! Request boundary detection.
//!
//! The core never parses headers. A request is complete once the header
//! terminator has been seen and, when a `Content-Length:` marker appears
//! before it, that many body bytes follow the terminator.

/// Marks the end of the request head.
pub const HEADER_TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// The only header the framing looks at.
pub const CONTENT_LENGTH: &[u8] = b"Content-Length:";

/// Offset of the first header terminator, if any.
pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    find(buf, HEADER_TERMINATOR)
}

/// Total length of the request framed at the start of `buf`.
///
/// Returns `None` while the head is incomplete. Otherwise returns the
/// head length (terminator included) plus the declared body length.
pub fn expected_length(buf: &[u8]) -> Option<usize> {
    let headers_end = find_headers_end(buf)?;
    let body_start = headers_end + HEADER_TERMINATOR.len();

    let content_length = find(&buf[..headers_end], CONTENT_LENGTH)
        .map(|pos| parse_length(&buf[pos + CONTENT_LENGTH.len()..headers_end]))
        .unwrap_or(0);

    Some(body_start.saturating_add(content_length))
}

/// Lenient base-10 parse: skips leading whitespace, stops at the first
/// non-digit, yields 0 when there are no digits and saturates on overflow.
pub fn parse_length(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .fold(0usize, |acc, b| {
            acc.saturating_mul(10).saturating_add(usize::from(b - b'0'))
        })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}
