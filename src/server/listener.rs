use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, info};

use crate::server::stream::{Peer, Stream};

/// Accept backlog of every listening socket. Once it is full the kernel
/// refuses further attempts instead of queueing them for a pool that has no
/// free slot.
pub const LISTEN_BACKLOG: i32 = 1;

/// A listening socket owned by the slot pool.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Local { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// TCP listener with address reuse; IPv6 addresses also accept IPv4.
    pub fn tcp(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        if addr.is_ipv6() {
            socket.set_only_v6(false)?;
        }
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;

        let listener = TcpListener::from(socket);
        info!("Listening on {}", listener.local_addr()?);
        Ok(Listener::Tcp(listener))
    }

    /// Local stream socket at `path`. A stale socket file is replaced.
    pub fn local(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
        socket.bind(&SockAddr::unix(path)?)?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;

        let listener = UnixListener::from(OwnedFd::from(socket));
        info!("Listening on {}", path.display());
        Ok(Listener::Local {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accepts one pending connection and makes it non-blocking.
    pub fn accept(&self) -> io::Result<(Stream, Peer)> {
        let (stream, peer) = match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept()?;
                (Stream::Tcp(stream), Peer::Tcp(addr))
            }
            Listener::Local { listener, .. } => {
                let (stream, _) = listener.accept()?;
                (Stream::Local(stream), Peer::Local)
            }
        };
        stream.set_nonblocking(true)?;
        Ok((stream, peer))
    }

    /// Bound address of a TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            Listener::Local { .. } => None,
        }
    }

    /// Filesystem path of a local listener.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Listener::Tcp(_) => None,
            Listener::Local { path, .. } => Some(path),
        }
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Listener::Tcp(listener) => listener.as_raw_fd(),
            Listener::Local { listener, .. } => listener.as_raw_fd(),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Local { path, .. } = self {
            let _ = fs::remove_file(path);
        }
    }
}
