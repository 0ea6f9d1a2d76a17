//! The connection slot pool.
//!
//! A fixed array of [`Connection`]s plus up to [`MAX_LISTENERS`] listening
//! sockets. The pool decides which descriptors want readiness, accepts
//! into free slots, advances every ready connection once per tick and
//! reclaims idle ones. Free slots are found by a linear scan from the
//! start; a free-list would replace it for large pools.

use std::io;
use std::net::{Ipv6Addr, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::http::connection::{
    ConnError, Connection, ConnectionOptions, ConnectionState, ReadProgress, WriteProgress,
};
use crate::http::response::StatusCode;
use crate::server::listener::Listener;
use crate::server::poll::Readiness;

/// Listening sockets per pool (one TCP and one local socket, typically).
pub const MAX_LISTENERS: usize = 2;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("all {MAX_LISTENERS} listener slots are in use")]
    NoListenSlot,
    #[error("listener setup failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("no free connection slot")]
    NoFreeSlot,
}

/// Fixed-capacity pool of connection slots.
#[derive(Debug)]
pub struct Slots {
    conns: Vec<Connection>,
    open: usize,
    listeners: [Option<Listener>; MAX_LISTENERS],
    idle_timeout: Duration,
}

impl Slots {
    /// Creates `slot_count` empty slots sharing `options`.
    pub fn new(slot_count: usize, options: &ConnectionOptions) -> Self {
        Self {
            conns: (0..slot_count).map(|_| Connection::new(options)).collect(),
            open: 0,
            listeners: [None, None],
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.conns.len()
    }

    pub fn open_count(&self) -> usize {
        self.open
    }

    pub fn is_full(&self) -> bool {
        self.open >= self.conns.len()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeout = timeout;
    }

    pub fn conn(&self, slot: usize) -> Option<&Connection> {
        self.conns.get(slot)
    }

    pub fn conn_mut(&mut self, slot: usize) -> Option<&mut Connection> {
        self.conns.get_mut(slot)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.conns.iter()
    }

    pub fn listener(&self, index: usize) -> Option<&Listener> {
        self.listeners.get(index).and_then(Option::as_ref)
    }

    /// Slots holding a complete request that still waits for a handler.
    pub fn ready_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.conns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.state() == ConnectionState::Ready)
            .map(|(slot, _)| slot)
    }

    fn free_listener(&self) -> Result<usize, ListenError> {
        self.listeners
            .iter()
            .position(Option::is_none)
            .ok_or(ListenError::NoListenSlot)
    }

    /// Listens on `port` on every address, IPv4 and IPv6.
    pub fn listen_tcp(&mut self, port: u16) -> Result<SocketAddr, ListenError> {
        self.listen_tcp_addr(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)))
    }

    /// Listens on a specific address and returns the bound address.
    pub fn listen_tcp_addr(&mut self, addr: SocketAddr) -> Result<SocketAddr, ListenError> {
        let index = self.free_listener()?;
        let listener = Listener::tcp(addr)?;
        let bound = listener.local_addr().unwrap_or(addr);
        self.listeners[index] = Some(listener);
        Ok(bound)
    }

    /// Listens on a local stream socket at `path`.
    pub fn listen_local(&mut self, path: impl AsRef<Path>) -> Result<(), ListenError> {
        let index = self.free_listener()?;
        self.listeners[index] = Some(Listener::local(path)?);
        Ok(())
    }

    /// Fills `readiness` with the descriptors the pool is interested in.
    ///
    /// Open connections always want read readiness and want write
    /// readiness while sending. Listeners are only included while a slot is
    /// free. Returns the highest descriptor registered.
    pub fn build_readiness(&self, readiness: &mut Readiness) -> Option<RawFd> {
        readiness.clear();
        let mut max_fd = None;

        for conn in &self.conns {
            let Some(fd) = conn.fd() else {
                continue;
            };
            readiness.readers.insert(fd);
            if conn.is_writer() {
                readiness.writers.insert(fd);
            }
            max_fd = max_fd.max(Some(fd));
        }

        if !self.is_full() {
            for listener in self.listeners.iter().flatten() {
                let fd = listener.as_raw_fd();
                readiness.readers.insert(fd);
                max_fd = max_fd.max(Some(fd));
            }
        }

        max_fd
    }

    /// Accepts one connection from listener `index` into the first free slot.
    ///
    /// Returns the slot, or `None` when the listener had nothing to accept
    /// after all (the client may have given up in the meantime).
    pub fn accept_one(&mut self, index: usize) -> Result<Option<usize>, SlotError> {
        let slot = self
            .conns
            .iter()
            .position(|c| !c.is_open())
            .ok_or(SlotError::NoFreeSlot)?;

        let Some(listener) = self.listener(index) else {
            return Ok(None);
        };

        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::ConnectionAborted
                ) =>
            {
                trace!(listener = index, error = %e, "nothing to accept");
                return Ok(None);
            }
            Err(e) => return Err(SlotError::Accept(e)),
        };

        let fd = stream.as_raw_fd();
        self.conns[slot].attach(stream);
        self.open += 1;
        debug!(slot, fd, %peer, open = self.open, "accepted connection");
        Ok(Some(slot))
    }

    /// Closes the connection in `slot`. Returns false if it was not open.
    pub fn close(&mut self, slot: usize) -> bool {
        let Some(conn) = self.conns.get_mut(slot) else {
            return false;
        };
        if conn.close().is_none() {
            return false;
        }
        self.open = self.open.saturating_sub(1);
        true
    }

    /// Sends a bare `status` reply straight to the descriptor and closes the slot.
    pub fn fail(&mut self, slot: usize, status: StatusCode) {
        if let Some(conn) = self.conns.get_mut(slot) {
            conn.send_fallback(status);
        }
        self.close(slot);
    }

    /// Closes every connection idle for longer than the idle timeout.
    pub fn close_idle(&mut self) -> usize {
        self.close_idle_at(Instant::now())
    }

    /// [`close_idle`](Self::close_idle) against an explicit clock reading.
    pub fn close_idle_at(&mut self, now: Instant) -> usize {
        let Some(cutoff) = now.checked_sub(self.idle_timeout) else {
            return 0;
        };

        let mut closed = 0;
        for slot in 0..self.conns.len() {
            let conn = &self.conns[slot];
            if conn.is_open() && conn.last_activity() < cutoff {
                debug!(slot, fd = conn.fd(), "closing idle connection");
                if self.close(slot) {
                    closed += 1;
                }
            }
        }

        if closed > 0 {
            info!(closed, open = self.open, "idle sweep");
        }
        closed
    }

    /// Writes the pending reply of `slot` once.
    ///
    /// A connection that finished its conversation or failed is closed;
    /// `None` means the slot was closed because of an error.
    pub fn flush(&mut self, slot: usize) -> Option<WriteProgress> {
        let conn = self.conns.get_mut(slot)?;
        match conn.write_step() {
            Ok(progress) => {
                if conn.state() == ConnectionState::Empty {
                    self.close(slot);
                }
                Some(progress)
            }
            Err(e) => {
                debug!(slot, error = %e, "write failed, closing");
                self.close(slot);
                None
            }
        }
    }

    /// Advances every ready descriptor once.
    ///
    /// Listeners marked readable accept one connection each while a slot is
    /// free, and the new descriptor is read in the same pass. Each open
    /// connection marked readable is read; one that the peer closed is
    /// reclaimed and skipped, otherwise it is written if it is sending and
    /// marked writable. Returns how many connections became ready for the
    /// handler in this pass.
    ///
    /// Descriptor numbers freed since the wait may already belong to a new
    /// connection, so write readiness only counts for a slot that was
    /// sending before the wait.
    pub fn drive(&mut self, readiness: &mut Readiness) -> Result<usize, SlotError> {
        for index in 0..MAX_LISTENERS {
            if self.is_full() {
                break;
            }
            let Some(fd) = self.listener(index).map(AsRawFd::as_raw_fd) else {
                continue;
            };
            if !readiness.readers.contains(fd) {
                continue;
            }
            if let Some(slot) = self.accept_one(index)? {
                if let Some(fd) = self.conns[slot].fd() {
                    readiness.readers.insert(fd);
                    readiness.writers.remove(fd);
                }
            }
        }

        let mut ready = 0;

        for slot in 0..self.conns.len() {
            let Some(fd) = self.conns[slot].fd() else {
                continue;
            };

            if readiness.readers.contains(fd) {
                match self.conns[slot].read_step() {
                    Ok(ReadProgress::Ready) => ready += 1,
                    Ok(ReadProgress::Closed) => debug!(slot, fd, "peer closed"),
                    Ok(ReadProgress::Pending) => {}
                    Err(ConnError::RequestTooLarge { limit }) => {
                        warn!(slot, fd, limit, "request too large, closing");
                        self.fail(slot, StatusCode::PayloadTooLarge);
                        continue;
                    }
                    Err(e) => {
                        debug!(slot, fd, error = %e, "read failed, closing");
                        self.close(slot);
                        continue;
                    }
                }
            }

            if self.conns[slot].state() == ConnectionState::Empty {
                self.close(slot);
                continue;
            }

            if self.conns[slot].is_writer() && readiness.writers.contains(fd) {
                self.flush(slot);
            }
        }

        Ok(ready)
    }
}
