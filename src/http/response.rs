use bytes::Bytes;

/// HTTP status codes the service emits.
///
/// - `Ok` (200): Request served
/// - `BadRequest` (400): Request line could not be understood
/// - `NotFound` (404): No route matched
/// - `MethodNotAllowed` (405): Path exists for another method
/// - `PayloadTooLarge` (413): Request exceeded the request buffer ceiling
/// - `InternalServerError` (500): Handler or reply buffer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use connslot::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// What a connection sends after its reply header.
///
/// The body is never owned by the connection itself: it either aliases the
/// connection's own request buffer (echo) or is a shared, immutable handle
/// owned by the handler. A shared body cannot be mutated while a send still
/// references it; a handler that regenerates its content hands out a new
/// [`Bytes`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    /// No body; the header carries `Content-Length: 0`.
    #[default]
    Empty,
    /// Echo: the body is the request as it was buffered.
    Request,
    /// Handler-owned bytes.
    Shared(Bytes),
}

impl Body {
    /// Length of the body given the length of the request it might alias.
    pub fn len_with(&self, request_len: usize) -> usize {
        match self {
            Body::Empty => 0,
            Body::Request => request_len,
            Body::Shared(bytes) => bytes.len(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Shared(bytes)
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Body::Shared(Bytes::from_static(bytes))
    }
}

/// A response as produced by a handler, before it is serialised into the
/// connection's reply header buffer.
///
/// `Content-Length` is always derived from the body when the head is
/// written and must not be added by hand.
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// Extra header lines, written in insertion order
    pub headers: Vec<(String, String)>,
    /// The reply body
    pub body: Body,
}

/// Builder for constructing responses in a fluent style.
///
/// # Example
///
/// ```
/// # use connslot::http::response::{Body, ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "text/plain")
///     .body(Body::from(&b"hi"[..]))
///     .build();
/// assert_eq!(response.headers.len(), 1);
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Body,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Adds or replaces a header (names compare case-insensitively).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((key, value)),
        }
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the final Response.
    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a 200 OK response with the given body.
    pub fn ok(body: impl Into<Body>) -> Self {
        ResponseBuilder::new(StatusCode::Ok).body(body).build()
    }

    /// Creates a 200 OK response that echoes the request back.
    pub fn echo() -> Self {
        ResponseBuilder::new(StatusCode::Ok).body(Body::Request).build()
    }

    /// Creates a 404 Not Found response with an empty body.
    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NotFound).build()
    }

    /// Creates a 500 Internal Server Error response with an empty body.
    pub fn internal_error() -> Self {
        ResponseBuilder::new(StatusCode::InternalServerError).build()
    }

    /// Creates a response with the given status and no body.
    pub fn status(status: StatusCode) -> Self {
        ResponseBuilder::new(status).build()
    }
}
