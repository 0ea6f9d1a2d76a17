use std::io::{self, Write};

use crate::buffer::{Buffer, BufferError};
use crate::http::response::StatusCode;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Protocol version of the bare status line in fallback replies.
const FALLBACK_VERSION: &str = "HTTP/1.0";

/// Serialises a response head (status line, extra headers, the derived
/// `Content-Length` and the terminator) onto the end of `buf`.
///
/// The buffer grows as needed up to its ceiling. On error the buffer may
/// hold a partial head and must be reset before reuse.
pub fn write_head(
    buf: &mut Buffer,
    status: StatusCode,
    headers: &[(String, String)],
    content_length: usize,
) -> Result<usize, BufferError> {
    buf.format_append_and_grow(format_args!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        status.as_u16(),
        status.reason_phrase()
    ))?;

    for (k, v) in headers {
        buf.format_append_and_grow(format_args!("{}: {}\r\n", k, v))?;
    }

    buf.format_append_and_grow(format_args!(
        "Content-Length: {}\r\n\r\n",
        content_length
    ))
}

/// Minimal reply for the paths where the structured reply is unusable:
/// a bare status line and the header terminator.
pub fn fallback_reply(status: StatusCode) -> String {
    format!("{} {} \r\n\r\n", FALLBACK_VERSION, status.as_u16())
}

/// Best-effort single write of a fallback reply. A short write is not retried.
pub fn send_fallback<W: Write + ?Sized>(stream: &mut W, status: StatusCode) -> io::Result<usize> {
    stream.write(fallback_reply(status).as_bytes())
}
