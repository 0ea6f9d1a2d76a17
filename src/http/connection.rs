use std::io::{self, IoSlice, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, trace};

use crate::buffer::{Buffer, BufferError};
use crate::http::framing::{self, HEADER_TERMINATOR};
use crate::http::response::{Body, Response, StatusCode};
use crate::http::writer;
use crate::server::stream::Stream;

/// Bytes added to a full request buffer before the next read.
pub const READ_GROW_STEP: usize = 16;

/// Read size used to drain a full buffer while a request is being answered.
const DISCARD_CHUNK: usize = 64;

/// Lifecycle of a connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No descriptor attached; the slot is free.
    Empty,
    /// Accumulating a request.
    Reading,
    /// A complete request is buffered and waits for a handler.
    Ready,
    /// Reply header and body are being flushed.
    Sending,
}

/// Outcome of one [`Connection::read_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// Nothing conclusive yet, or the connection was not reading.
    Pending,
    /// The request just became complete.
    Ready,
    /// The peer closed; the connection is now `Empty`.
    Closed,
}

/// Outcome of one [`Connection::write_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// Some (possibly zero) bytes went out, more remain.
    Partial(usize),
    /// The whole reply has been written.
    Flushed,
}

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("request exceeds the {limit} byte request buffer")]
    RequestTooLarge { limit: usize },
    #[error("connection has no open descriptor")]
    Detached,
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Initial and maximum capacity of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub initial: usize,
    pub max: usize,
}

impl BufferLimits {
    pub const fn new(initial: usize, max: usize) -> Self {
        Self { initial, max }
    }

    pub fn buffer(&self) -> Buffer {
        Buffer::with_limit(self.initial, self.max)
    }
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self::new(48, 1000)
    }
}

/// Per-connection settings shared by every slot of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub request: BufferLimits,
    pub reply_header: BufferLimits,
    /// Keep the descriptor open after a reply has been flushed.
    pub keep_alive: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            request: BufferLimits::default(),
            reply_header: BufferLimits::default(),
            keep_alive: true,
        }
    }
}

/// One network endpoint and its request/reply state.
///
/// The buffers are allocated once and reused for every connection that
/// occupies the slot. The transport is `None` exactly when the state is
/// [`ConnectionState::Empty`] (the owning pool restores this after every
/// step that ends a conversation).
#[derive(Debug)]
pub struct Connection<S = Stream> {
    stream: Option<S>,
    state: ConnectionState,
    request: Buffer,
    reply_header: Buffer,
    reply: Body,
    /// Body length frozen when the reply was set.
    reply_len: usize,
    send_pos: usize,
    /// Total request length once the head has been scanned.
    expected_len: Option<usize>,
    last_activity: Instant,
    keep_alive: bool,
}

impl<S> Connection<S> {
    pub fn new(options: &ConnectionOptions) -> Self {
        Self {
            stream: None,
            state: ConnectionState::Empty,
            request: options.request.buffer(),
            reply_header: options.reply_header.buffer(),
            reply: Body::Empty,
            reply_len: 0,
            send_pos: 0,
            expected_len: None,
            last_activity: Instant::now(),
            keep_alive: options.keep_alive,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// True while the connection wants write readiness.
    pub fn is_writer(&self) -> bool {
        self.state == ConnectionState::Sending
    }

    pub fn stream(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// The buffered request bytes.
    pub fn request(&self) -> &[u8] {
        self.request.as_bytes()
    }

    pub fn request_buffer(&self) -> &Buffer {
        &self.request
    }

    pub fn reply_header(&self) -> &Buffer {
        &self.reply_header
    }

    /// Direct access for handlers that build the head themselves.
    pub fn reply_header_mut(&mut self) -> &mut Buffer {
        &mut self.reply_header
    }

    pub fn reply(&self) -> &Body {
        &self.reply
    }

    pub fn send_pos(&self) -> usize {
        self.send_pos
    }

    /// Combined length of reply header and body.
    pub fn reply_total(&self) -> usize {
        self.reply_header.len() + self.reply_len
    }

    pub fn expected_len(&self) -> Option<usize> {
        self.expected_len
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Populates a free slot with a freshly accepted transport.
    pub fn attach(&mut self, stream: S) {
        self.reset();
        self.stream = Some(stream);
        self.state = ConnectionState::Reading;
        self.touch();
    }

    /// Releases the transport (dropping it closes the descriptor) and
    /// resets the slot for reuse. Buffers keep their storage.
    pub fn close(&mut self) -> Option<S> {
        let stream = self.stream.take();
        self.reset();
        stream
    }

    /// Sets the body sent after the reply header. The body length is
    /// frozen here, so bytes read into an aliased request buffer while
    /// sending are not transmitted.
    pub fn set_reply(&mut self, body: Body) {
        self.reply_len = body.len_with(self.request.len());
        self.reply = body;
        self.send_pos = 0;
    }

    /// Serialises `response` into the reply header buffer and sets its body.
    ///
    /// On error the header buffer is left empty and the reply is unset.
    pub fn prepare_reply(&mut self, response: &Response) -> Result<(), BufferError> {
        self.reply_header.reset();
        let body_len = response.body.len_with(self.request.len());

        if let Err(e) = writer::write_head(
            &mut self.reply_header,
            response.status,
            &response.headers,
            body_len,
        ) {
            self.reply_header.reset();
            self.reply = Body::Empty;
            self.reply_len = 0;
            return Err(e);
        }

        self.set_reply(response.body.clone());
        Ok(())
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Empty;
        self.request.reset();
        self.reply_header.reset();
        self.reply = Body::Empty;
        self.reply_len = 0;
        self.send_pos = 0;
        self.expected_len = None;
    }

    fn finish_reply(&mut self) {
        self.request.reset();
        self.reply_header.reset();
        self.reply = Body::Empty;
        self.reply_len = 0;
        self.send_pos = 0;
        self.expected_len = None;
        self.state = if self.keep_alive {
            ConnectionState::Reading
        } else {
            ConnectionState::Empty
        };
    }

    fn frame(&mut self) -> Result<ReadProgress, ConnError> {
        let buffered = self.request.len();
        if buffered < HEADER_TERMINATOR.len() {
            return Ok(ReadProgress::Pending);
        }

        let expected = match self.expected_len {
            Some(expected) => expected,
            None => match framing::expected_length(self.request.as_bytes()) {
                Some(expected) => expected,
                None => return Ok(ReadProgress::Pending),
            },
        };

        if expected > self.request.capacity_max() {
            return Err(ConnError::RequestTooLarge {
                limit: self.request.capacity_max(),
            });
        }

        if buffered < expected {
            self.expected_len = Some(expected);
            return Ok(ReadProgress::Pending);
        }

        self.expected_len = None;
        self.state = ConnectionState::Ready;
        debug!(bytes = expected, "request complete");
        Ok(ReadProgress::Ready)
    }
}

impl<S: AsRawFd> Connection<S> {
    /// The open descriptor, `None` for an empty slot.
    pub fn fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|s| s.as_raw_fd())
    }
}

impl<S: Read + Write> Connection<S> {
    /// Reads whatever the transport has and advances the framing.
    ///
    /// A full request buffer grows by [`READ_GROW_STEP`] first; reaching the
    /// ceiling without a complete request is [`ConnError::RequestTooLarge`].
    /// While `Ready` or `Sending` the bytes are kept but not framed, so a
    /// hang-up is still noticed. A request buffer that is already full then
    /// neither grows nor fails; further bytes are discarded.
    pub fn read_step(&mut self) -> Result<ReadProgress, ConnError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ConnError::Detached);
        };

        if self.state == ConnectionState::Empty {
            self.state = ConnectionState::Reading;
        }

        if self.state != ConnectionState::Reading && self.request.is_full() {
            let mut scratch = [0u8; DISCARD_CHUNK];
            return match stream.read(&mut scratch) {
                Ok(0) => {
                    self.state = ConnectionState::Empty;
                    Ok(ReadProgress::Closed)
                }
                Ok(n) => {
                    self.touch();
                    trace!(bytes = n, "discarded read while answering");
                    Ok(ReadProgress::Pending)
                }
                Err(e) if is_transient(&e) => Ok(ReadProgress::Pending),
                Err(e) => Err(e.into()),
            };
        }

        if self.request.is_full() {
            let grown = self.request.capacity() + READ_GROW_STEP;
            self.request.resize(grown)?;
            if self.request.is_full() {
                return Err(ConnError::RequestTooLarge {
                    limit: self.request.capacity_max(),
                });
            }
        }

        let n = match self.request.read_from(stream) {
            Ok(0) => {
                self.state = ConnectionState::Empty;
                return Ok(ReadProgress::Closed);
            }
            Ok(n) => n,
            Err(e) if is_transient(&e) => return Ok(ReadProgress::Pending),
            Err(e) => return Err(e.into()),
        };

        self.touch();
        trace!(bytes = n, buffered = self.request.len(), "read");

        if self.state != ConnectionState::Reading {
            return Ok(ReadProgress::Pending);
        }

        self.frame()
    }

    /// Writes the unsent tails of the reply header and body with a single
    /// vectored write.
    pub fn write_step(&mut self) -> Result<WriteProgress, ConnError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ConnError::Detached);
        };

        self.state = ConnectionState::Sending;

        let head = self.reply_header.as_bytes();
        let body: &[u8] = match &self.reply {
            Body::Empty => &[],
            Body::Request => {
                let request = self.request.as_bytes();
                &request[..self.reply_len.min(request.len())]
            }
            Body::Shared(bytes) => &bytes[..self.reply_len.min(bytes.len())],
        };
        let total = head.len() + body.len();

        let sent = if self.send_pos < total {
            let mut slices = [IoSlice::new(&[]), IoSlice::new(&[])];
            let mut count = 0;

            if self.send_pos < head.len() {
                slices[count] = IoSlice::new(&head[self.send_pos..]);
                count += 1;
            }

            let body_pos = self.send_pos.saturating_sub(head.len());
            if body_pos < body.len() {
                slices[count] = IoSlice::new(&body[body_pos..]);
                count += 1;
            }

            match stream.write_vectored(&slices[..count]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => n,
                Err(e) if is_transient(&e) => 0,
                Err(e) => return Err(e.into()),
            }
        } else {
            0
        };

        self.send_pos += sent;
        self.touch();
        trace!(bytes = sent, sent = self.send_pos, total, "write");

        if self.send_pos >= total {
            self.finish_reply();
            return Ok(WriteProgress::Flushed);
        }

        Ok(WriteProgress::Partial(sent))
    }

    /// Best-effort canned reply written straight to the transport, for the
    /// paths where the structured reply is unusable. The caller closes the
    /// connection afterwards.
    pub fn send_fallback(&mut self, status: StatusCode) {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = writer::send_fallback(stream, status) {
                debug!(error = %e, "fallback reply not delivered");
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
