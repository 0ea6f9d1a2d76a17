use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::debug;

use crate::buffer::{Buffer, BufferError};
use crate::http::connection::BufferLimits;

/// Seconds since the Unix epoch; a clock before the epoch reads as 0.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Smallest multiple of `interval` strictly greater than `time`.
pub fn round_up(time: u64, interval: u64) -> u64 {
    if interval == 0 {
        return time;
    }
    (time / interval).saturating_add(1).saturating_mul(interval)
}

/// A generated body reused until the next interval boundary.
///
/// Expiry is aligned to the wall clock, so every process with the same
/// interval regenerates at the same instants. Each regeneration hands out
/// fresh [`Bytes`]; replies still sending an older body keep their copy.
#[derive(Debug)]
pub struct CachedBody {
    buffer: Buffer,
    body: Bytes,
    interval: u64,
    expires_at: u64,
}

impl CachedBody {
    pub fn new(interval: Duration, limits: BufferLimits) -> Self {
        Self {
            buffer: limits.buffer(),
            body: Bytes::new(),
            interval: interval.as_secs(),
            expires_at: 0,
        }
    }

    /// Unix second at which the cached body goes stale.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn is_fresh(&self, now: u64) -> bool {
        now < self.expires_at
    }

    /// The buffer the body is generated into.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Returns the cached body, regenerating it first when stale.
    ///
    /// `regenerate` writes into the emptied buffer. If it fails the cache
    /// stays stale and the error is returned.
    pub fn get_or_refresh<F>(&mut self, now: u64, regenerate: F) -> Result<Bytes, BufferError>
    where
        F: FnOnce(&mut Buffer) -> Result<(), BufferError>,
    {
        if self.is_fresh(now) {
            return Ok(self.body.clone());
        }

        self.buffer.reset();
        if let Err(e) = regenerate(&mut self.buffer) {
            self.expires_at = 0;
            self.body = Bytes::new();
            return Err(e);
        }

        self.body = Bytes::copy_from_slice(self.buffer.as_bytes());
        self.expires_at = round_up(now, self.interval);
        debug!(bytes = self.body.len(), expires_at = self.expires_at, "regenerated cached body");
        Ok(self.body.clone())
    }
}
