use crate::http::framing::{HEADER_TERMINATOR, find_headers_end};

/// HTTP request methods.
///
/// Only the request line is ever inspected; the method decides routing and
/// nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method from its (case-sensitive) token.
    ///
    /// # Example
    ///
    /// ```
    /// # use connslot::http::request::Method;
    /// assert_eq!(Method::from_token(b"GET"), Some(Method::GET));
    /// assert_eq!(Method::from_token(b"get"), None);
    /// ```
    pub fn from_token(s: &[u8]) -> Option<Self> {
        match s {
            b"GET" => Some(Method::GET),
            b"POST" => Some(Method::POST),
            b"PUT" => Some(Method::PUT),
            b"DELETE" => Some(Method::DELETE),
            b"HEAD" => Some(Method::HEAD),
            b"OPTIONS" => Some(Method::OPTIONS),
            b"PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }
}

/// Read-only view of a completed request as it sits in the request buffer.
///
/// Nothing is copied or parsed up front; accessors look at the request line
/// and the bytes after the header terminator on demand.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    raw: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw }
    }

    /// All buffered bytes, head and body.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// The first line, without its line ending.
    pub fn request_line(&self) -> &'a [u8] {
        let end = self
            .raw
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(self.raw.len());
        &self.raw[..end]
    }

    pub fn method(&self) -> Option<Method> {
        self.request_line()
            .split(|b| *b == b' ')
            .next()
            .and_then(Method::from_token)
    }

    /// The request target, if it is valid UTF-8.
    pub fn path(&self) -> Option<&'a str> {
        let target = self.request_line().split(|b| *b == b' ').nth(1)?;
        std::str::from_utf8(target).ok()
    }

    /// Bytes following the header terminator; empty when there is none.
    pub fn body(&self) -> &'a [u8] {
        match find_headers_end(self.raw) {
            Some(end) => &self.raw[end + HEADER_TERMINATOR.len()..],
            None => &[],
        }
    }
}
