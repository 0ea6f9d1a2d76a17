//! Request handlers.
//!
//! The service loop hands every complete request to a [`Handler`], which
//! describes the reply as a [`Response`]. The connection serialises the
//! head and sends it together with the body.

pub mod builtin;
pub mod cache;

use anyhow::Result;

use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};

pub use builtin::{Echo, Static, Stats};
pub use cache::CachedBody;

/// Where a request came from, as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    /// Index of the slot holding the connection.
    pub slot: usize,
    /// Connections currently open.
    pub open: usize,
    /// Size of the pool.
    pub slots: usize,
}

/// Produces the reply for a complete request.
///
/// An `Err` is answered with an empty `500` reply.
pub trait Handler {
    fn respond(&mut self, request: &Request<'_>, info: &SlotInfo) -> Result<Response>;
}

impl<F> Handler for F
where
    F: FnMut(&Request<'_>, &SlotInfo) -> Result<Response>,
{
    fn respond(&mut self, request: &Request<'_>, info: &SlotInfo) -> Result<Response> {
        self(request, info)
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Box<dyn Handler>,
}

/// Dispatches on the method and path of the request line.
///
/// A path that is routed for another method gets `405`, an unparseable
/// request line `400`. Anything else unmatched goes to the fallback, or
/// gets `404` without one.
///
/// # Example
///
/// ```
/// # use connslot::handler::{Echo, Router, Static};
/// # use connslot::http::request::Method;
/// let router = Router::new()
///     .route(Method::POST, "/echo", Echo)
///     .fallback(Static::default());
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    fallback: Option<Box<dyn Handler>>,
    slot_headers: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        method: Method,
        path: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Self {
        self.routes.push(Route {
            method,
            path: path.into(),
            handler: Box::new(handler),
        });
        self
    }

    pub fn fallback(mut self, handler: impl Handler + 'static) -> Self {
        self.fallback = Some(Box::new(handler));
        self
    }

    /// Tags every reply with `x-slot` and `x-open`.
    pub fn slot_headers(mut self, enabled: bool) -> Self {
        self.slot_headers = enabled;
        self
    }

    fn dispatch(&mut self, request: &Request<'_>, info: &SlotInfo) -> Result<Response> {
        let Some(method) = request.method() else {
            return Ok(Response::status(StatusCode::BadRequest));
        };
        let path = request
            .path()
            .map(|p| p.split('?').next().unwrap_or(p))
            .unwrap_or("");

        if let Some(route) = self
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            return route.handler.respond(request, info);
        }

        if self.routes.iter().any(|r| r.path == path) {
            return Ok(Response::status(StatusCode::MethodNotAllowed));
        }

        match self.fallback.as_mut() {
            Some(handler) => handler.respond(request, info),
            None => Ok(Response::not_found()),
        }
    }
}

impl Handler for Router {
    fn respond(&mut self, request: &Request<'_>, info: &SlotInfo) -> Result<Response> {
        let mut response = self.dispatch(request, info)?;
        if self.slot_headers {
            response
                .headers
                .push(("x-slot".to_string(), info.slot.to_string()));
            response
                .headers
                .push(("x-open".to_string(), info.open.to_string()));
        }
        Ok(response)
    }
}
