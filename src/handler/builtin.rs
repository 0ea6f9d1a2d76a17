use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tracing::warn;

use crate::buffer::{Buffer, BufferError};
use crate::config::Config;
use crate::handler::cache::{CachedBody, unix_now};
use crate::handler::{Handler, Router, SlotInfo};
use crate::http::connection::BufferLimits;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Replies with the request exactly as it was received.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Handler for Echo {
    fn respond(&mut self, _request: &Request<'_>, _info: &SlotInfo) -> Result<Response> {
        Ok(Response::echo())
    }
}

/// Replies with a fixed body.
#[derive(Debug, Clone)]
pub struct Static {
    body: Bytes,
}

impl Static {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }
}

impl Default for Static {
    fn default() -> Self {
        Self::new(&b"Hello World\n"[..])
    }
}

impl Handler for Static {
    fn respond(&mut self, _request: &Request<'_>, _info: &SlotInfo) -> Result<Response> {
        Ok(Response::ok(self.body.clone()))
    }
}

/// Body returned when the stats text outgrows its buffer.
pub const STATS_OVERFLOW_BODY: &[u8] = b"buffer_overflow 1\n";

/// Pool gauges in the Prometheus text format, regenerated at most once per
/// interval.
#[derive(Debug)]
pub struct Stats {
    cache: CachedBody,
}

impl Stats {
    pub fn new(interval: Duration, limits: BufferLimits) -> Self {
        Self {
            cache: CachedBody::new(interval, limits),
        }
    }

    /// Renders (or reuses) the body as of `now` in Unix seconds.
    pub fn respond_at(&mut self, now: u64, info: &SlotInfo) -> Response {
        match self.cache.get_or_refresh(now, |buf| render(buf, info, now)) {
            Ok(body) => ResponseBuilder::new(StatusCode::Ok)
                .header("Content-Type", "text/plain; version=0.0.4")
                .body(body)
                .build(),
            Err(e) => {
                warn!(error = %e, "stats body overflow");
                ResponseBuilder::new(StatusCode::InternalServerError)
                    .body(STATS_OVERFLOW_BODY)
                    .build()
            }
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), BufferLimits::new(1000, 200_000))
    }
}

impl Handler for Stats {
    fn respond(&mut self, _request: &Request<'_>, info: &SlotInfo) -> Result<Response> {
        Ok(self.respond_at(unix_now(), info))
    }
}

fn render(buf: &mut Buffer, info: &SlotInfo, now: u64) -> Result<(), BufferError> {
    buf.format_append_and_grow(format_args!(
        "# TYPE connslot_open_connections gauge\n\
         connslot_open_connections {}\n\
         # TYPE connslot_slots gauge\n\
         connslot_slots {}\n",
        info.open, info.slots
    ))?;

    // Reported before the lines that describe it are appended.
    let (capacity, used) = (buf.capacity(), buf.len());
    buf.format_append_and_grow(format_args!(
        "buffer_capacity_bytes {}\n\
         buffer_used_bytes {}\n\
         buffer_timestamp {}\n",
        capacity, used, now
    ))?;
    Ok(())
}

impl Router {
    /// `POST /echo`, `GET /metrics` and a static greeting for everything else.
    pub fn builtin(config: &Config) -> Self {
        Router::new()
            .route(Method::POST, "/echo", Echo)
            .route(
                Method::GET,
                "/metrics",
                Stats::new(config.body_cache.interval(), config.body_cache.limits()),
            )
            .fallback(Static::default())
            .slot_headers(config.slot_headers)
    }
}
