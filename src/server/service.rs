use std::io;
use std::time::{Duration, Instant};

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ListenAddr};
use crate::handler::{Handler, SlotInfo};
use crate::http::connection::ConnectionState;
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::server::poll::Readiness;
use crate::server::slots::{SlotError, Slots};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Conditions that stop the service loop.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),
    #[error(transparent)]
    Slots(#[from] SlotError),
}

/// What one [`Server::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    /// Descriptors reported ready; 0 means the wait timed out.
    pub events: usize,
    /// Requests handed to the handler.
    pub served: usize,
    /// Connections closed by the idle sweep.
    pub closed_idle: usize,
}

/// Single-threaded service loop over a slot pool.
pub struct Server<H> {
    slots: Slots,
    handler: H,
    readiness: Readiness,
    poll_interval: Duration,
    last_sweep: Instant,
}

impl<H: Handler> Server<H> {
    pub fn new(slots: Slots, handler: H) -> Self {
        Self {
            slots,
            handler,
            readiness: Readiness::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            last_sweep: Instant::now(),
        }
    }

    /// Maximum time one wait blocks, and the idle sweep period.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builds the pool and binds every configured listener.
    pub fn from_config(config: &Config, handler: H) -> anyhow::Result<Self> {
        config.validate()?;

        let mut slots = Slots::new(config.slots, &config.connection_options());
        slots.set_idle_timeout(config.idle_timeout());

        for addr in config.listeners()? {
            match &addr {
                ListenAddr::Tcp(sock) => {
                    slots
                        .listen_tcp_addr(*sock)
                        .with_context(|| format!("failed to listen on {}", addr))?;
                }
                ListenAddr::Local(path) => {
                    slots
                        .listen_local(path)
                        .with_context(|| format!("failed to listen on {}", addr))?;
                }
            }
        }

        info!(
            slots = config.slots,
            keep_alive = config.keep_alive,
            idle_timeout_secs = config.idle_timeout_secs,
            "connection pool ready"
        );
        Ok(Self::new(slots, handler).with_poll_interval(config.poll_interval()))
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut Slots {
        &mut self.slots
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Runs until a fatal error.
    pub fn run(&mut self) -> Result<(), ServeError> {
        loop {
            self.tick()?;
        }
    }

    /// One iteration: wait for readiness, then either sweep idle
    /// connections (on timeout) or advance the pool and answer every
    /// request that became complete.
    pub fn tick(&mut self) -> Result<Tick, ServeError> {
        let max_fd = self.slots.build_readiness(&mut self.readiness);
        let events = self
            .readiness
            .wait(max_fd, self.poll_interval)
            .map_err(ServeError::Poll)?;

        let mut tick = Tick {
            events,
            ..Tick::default()
        };

        // A busy pool never times out, so sweep on elapsed time as well.
        if events == 0 || self.last_sweep.elapsed() >= self.poll_interval {
            tick.closed_idle = self.slots.close_idle();
            self.last_sweep = Instant::now();
        }
        if events == 0 {
            return Ok(tick);
        }

        if self.slots.drive(&mut self.readiness)? > 0 {
            tick.served = self.respond_ready();
        }
        Ok(tick)
    }

    fn respond_ready(&mut self) -> usize {
        let mut served = 0;
        for slot in 0..self.slots.slot_count() {
            let ready = self
                .slots
                .conn(slot)
                .is_some_and(|c| c.state() == ConnectionState::Ready);
            if ready {
                self.respond(slot);
                served += 1;
            }
        }
        served
    }

    fn respond(&mut self, slot: usize) {
        let info = SlotInfo {
            slot,
            open: self.slots.open_count(),
            slots: self.slots.slot_count(),
        };
        let Some(conn) = self.slots.conn_mut(slot) else {
            return;
        };

        let request = Request::new(conn.request());
        let response = match self.handler.respond(&request, &info) {
            Ok(response) => response,
            Err(e) => {
                warn!(slot, error = %e, "handler failed");
                Response::internal_error()
            }
        };
        debug!(slot, status = response.status.as_u16(), "responding");

        if let Err(e) = conn.prepare_reply(&response) {
            warn!(slot, error = %e, "reply header overflow");
            self.slots.fail(slot, StatusCode::InternalServerError);
            return;
        }

        self.slots.flush(slot);
    }
}
