//! Socket handle: a small state machine (`Uninit -> Initialized -> Connected
//! -> Closed`) wrapping a `socket2::Socket`, covering TCP, UDP and
//! Unix-domain in one type the way `CSocketBase`/`CLocalSocket` did.

use crate::error::NetError;
use byte_buffer::ByteBuffer;
use socket2::{Domain, SockAddr, Socket as RawSocket, Type};
use std::io::{self, Read, Write};
use std::net::SocketAddr as StdSocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};

/// Address a socket binds, listens or connects to.
#[derive(Debug, Clone)]
pub enum Addr {
    Inet { host: String, port: u16 },
    Unix { path: String },
}

/// Construction parameters for a `Socket`, mirroring `CSockParam`.
#[derive(Debug, Clone)]
pub struct SocketParams {
    pub addr: Addr,
    pub is_server: bool,
    pub is_non_blocking: bool,
    pub is_udp: bool,
}

impl SocketParams {
    pub fn tcp_server(host: impl Into<String>, port: u16) -> SocketParams {
        SocketParams { addr: Addr::Inet { host: host.into(), port }, is_server: true, is_non_blocking: true, is_udp: false }
    }

    pub fn tcp_client(host: impl Into<String>, port: u16) -> SocketParams {
        SocketParams { addr: Addr::Inet { host: host.into(), port }, is_server: false, is_non_blocking: false, is_udp: false }
    }

    pub fn unix_server(path: impl Into<String>) -> SocketParams {
        SocketParams { addr: Addr::Unix { path: path.into() }, is_server: true, is_non_blocking: true, is_udp: false }
    }

    pub fn unix_client(path: impl Into<String>) -> SocketParams {
        SocketParams { addr: Addr::Unix { path: path.into() }, is_server: false, is_non_blocking: false, is_udp: false }
    }

    pub fn non_blocking(mut self, yes: bool) -> SocketParams {
        self.is_non_blocking = yes;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninit,
    Initialized,
    Connected,
    Closed,
}

enum Handle {
    None,
    /// Bound and listening; `Link` turns an incoming connection into a new
    /// `Socket` in `Connected` state.
    Listener(RawSocket),
    /// Created but not yet connected (client, pre-`Link`).
    Pending(RawSocket),
    /// Connected (client post-`Link`, or server-accepted).
    Stream(RawSocket),
}

/// Outcome of a `send`. `WouldBlock` means nothing was written; the caller
/// resends the whole buffer later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    WouldBlock,
}

/// Outcome of a `recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    Data(usize),
    WouldBlock,
    PeerClosed,
}

/// A single socket handle. Not `Clone`: ownership of the underlying fd is
/// singular, matching the original's non-copyable `CSocketBase`.
pub struct Socket {
    handle: Handle,
    state: State,
    params: Option<SocketParams>,
}

fn resolve_inet(host: &str, port: u16) -> Result<StdSocketAddr, NetError> {
    format!("{host}:{port}").parse().map_err(|_| NetError::AddrParse)
}

fn sock_addr_for(addr: &Addr) -> Result<SockAddr, NetError> {
    match addr {
        Addr::Inet { host, port } => Ok(SockAddr::from(resolve_inet(host, *port)?)),
        Addr::Unix { path } => SockAddr::unix(path).map_err(NetError::Io),
    }
}

impl Socket {
    /// A freshly constructed, unconfigured handle.
    pub fn uninit() -> Socket {
        Socket { handle: Handle::None, state: State::Uninit, params: None }
    }

    pub fn state_is_connected(&self) -> bool {
        self.state == State::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Creates the underlying fd and, for a server, binds and listens.
    /// Does not connect a client socket — that happens in `link`.
    pub fn init(&mut self, params: SocketParams) -> Result<(), NetError> {
        if self.state != State::Uninit {
            return Err(NetError::AlreadyInitialized);
        }

        let domain = match &params.addr {
            Addr::Inet { host, port } => Domain::for_address(resolve_inet(host, *port)?),
            Addr::Unix { .. } => Domain::UNIX,
        };
        let ty = if params.is_udp { Type::DGRAM } else { Type::STREAM };
        let raw = RawSocket::new(domain, ty, None).map_err(NetError::Io)?;

        if params.is_server {
            let addr = sock_addr_for(&params.addr)?;
            match &params.addr {
                Addr::Inet { .. } => raw.set_reuse_address(true).map_err(NetError::Io)?,
                Addr::Unix { path } => {
                    let _ = std::fs::remove_file(path);
                }
            }
            raw.bind(&addr).map_err(NetError::Io)?;
            if !params.is_udp {
                raw.listen(32).map_err(NetError::Io)?;
            }
        }

        if params.is_non_blocking {
            raw.set_nonblocking(true).map_err(NetError::Io)?;
        }

        self.handle = if params.is_server { Handle::Listener(raw) } else { Handle::Pending(raw) };
        self.state = State::Initialized;
        self.params = Some(params);
        Ok(())
    }

    /// Server: accepts one pending connection and returns it as a new,
    /// already-`Connected` `Socket`. Client: connects. UDP: no-op, since a
    /// connectionless socket has nothing to link.
    pub fn link(&mut self) -> Result<Option<Socket>, NetError> {
        if self.state == State::Uninit || self.state == State::Closed {
            return Err(NetError::NotInitialized);
        }
        let is_udp = self.params.as_ref().map(|p| p.is_udp).unwrap_or(false);
        if is_udp {
            self.state = State::Connected;
            return Ok(None);
        }

        match &mut self.handle {
            Handle::Listener(raw) => {
                let params = self.params.as_ref().expect("initialized socket has params");
                if !params.is_server {
                    return Err(NetError::NotAServer);
                }
                let (peer, _peer_addr) = raw.accept().map_err(NetError::Io)?;
                if params.is_non_blocking {
                    peer.set_nonblocking(true).map_err(NetError::Io)?;
                }
                let mut client = Socket::uninit();
                client.handle = Handle::Stream(peer);
                client.state = State::Connected;
                client.params = Some(params.clone());
                Ok(Some(client))
            }
            Handle::Pending(raw) => {
                let params = self.params.as_ref().expect("initialized socket has params");
                let addr = sock_addr_for(&params.addr)?;
                raw.connect(&addr).map_err(NetError::Io)?;
                self.state = State::Connected;
                Ok(None)
            }
            Handle::Stream(_) => {
                self.state = State::Connected;
                Ok(None)
            }
            Handle::None => Err(NetError::NotInitialized),
        }
    }

    fn stream_mut(&mut self) -> Result<&mut RawSocket, NetError> {
        match &mut self.handle {
            Handle::Stream(s) => Ok(s),
            _ => Err(NetError::NotConnected),
        }
    }

    /// Writes the whole buffer, retrying on `EINTR`. A `WouldBlock` on the
    /// very first write attempt is reported as such; partial progress
    /// followed by `WouldBlock` is not separately tracked (neither was it in
    /// the original), so the caller must be prepared to resend.
    pub fn send(&mut self, data: &[u8]) -> Result<SendOutcome, NetError> {
        if self.state != State::Connected {
            return Err(NetError::NotConnected);
        }
        let sock = self.stream_mut()?;
        let mut written = 0usize;
        while written < data.len() {
            match sock.write(&data[written..]) {
                Ok(0) => return Err(NetError::Io(io::Error::new(io::ErrorKind::WriteZero, "peer closed"))),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(SendOutcome::WouldBlock),
                Err(e) => return Err(NetError::Io(e)),
            }
        }
        Ok(SendOutcome::Sent)
    }

    /// Reads into `buf` up to its current logical length, then republishes
    /// the buffer's length as the number of bytes actually read. Neither an
    /// interrupt nor a would-block is an error; both simply yield no data.
    pub fn recv(&mut self, buf: &mut ByteBuffer) -> Result<RecvOutcome, NetError> {
        if self.state != State::Connected {
            return Err(NetError::NotConnected);
        }
        let cap = buf.len();
        let sock = self.stream_mut()?;
        let result = {
            let slice = &mut buf.spare_capacity_mut()[..cap];
            sock.read(slice)
        };
        match result {
            Ok(0) => {
                buf.resize(0);
                Ok(RecvOutcome::PeerClosed)
            }
            Ok(n) => {
                buf.resize(n);
                Ok(RecvOutcome::Data(n))
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted || e.kind() == io::ErrorKind::WouldBlock => {
                buf.resize(0);
                Ok(RecvOutcome::WouldBlock)
            }
            Err(e) => Err(NetError::Io(e)),
        }
    }

    /// Idempotent. Unlinks the bound Unix-domain path iff this handle is the
    /// one that created it.
    pub fn close(&mut self) -> Result<(), NetError> {
        if self.state == State::Closed {
            return Ok(());
        }
        if matches!(self.handle, Handle::Listener(_)) {
            if let Some(SocketParams { addr: Addr::Unix { path }, is_server: true, .. }) = &self.params {
                let _ = std::fs::remove_file(path);
            }
        }
        self.handle = Handle::None;
        self.state = State::Closed;
        Ok(())
    }

    /// Raw fd for registration with a `Readiness` set, or for passing to a
    /// child process. Borrowed, not taken: the caller's own `Socket` still
    /// owns (and will eventually close) the descriptor.
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        match &self.handle {
            Handle::None => None,
            Handle::Listener(s) | Handle::Pending(s) | Handle::Stream(s) => Some(s.as_raw_fd()),
        }
    }

    pub fn params(&self) -> Option<&SocketParams> {
        self.params.as_ref()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn free_tcp_port() -> u16 {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    }

    #[test]
    fn tcp_accept_and_roundtrip() {
        let port = free_tcp_port();
        let mut server = Socket::uninit();
        server.init(SocketParams::tcp_server("127.0.0.1", port)).unwrap();

        let handle = thread::spawn(move || {
            let mut client = Socket::uninit();
            client.init(SocketParams::tcp_client("127.0.0.1", port)).unwrap();
            client.link().unwrap();
            client.send(b"ping").unwrap();
            client
        });

        // the listener is non-blocking; poll until a connection lands
        let mut accepted = None;
        for _ in 0..1000 {
            match server.link() {
                Ok(Some(s)) => {
                    accepted = Some(s);
                    break;
                }
                Ok(None) => unreachable!("listener link always yields a new socket or an error"),
                Err(_) => thread::yield_now(),
            }
        }
        let mut accepted = accepted.expect("connection should arrive");
        let mut buf = ByteBuffer::with_capacity(16);
        buf.resize(16);
        let outcome = loop {
            match accepted.recv(&mut buf) {
                Ok(RecvOutcome::WouldBlock) => continue,
                other => break other.unwrap(),
            }
        };
        assert_eq!(outcome, RecvOutcome::Data(4));
        assert_eq!(buf.as_slice(), b"ping");

        handle.join().unwrap();
    }

    #[test]
    fn unix_server_unlinks_path_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.sock").to_string_lossy().into_owned();

        let mut server = Socket::uninit();
        server.init(SocketParams::unix_server(&path)).unwrap();
        assert!(std::path::Path::new(&path).exists());

        server.close().unwrap();
        assert!(!std::path::Path::new(&path).exists());

        // idempotent
        server.close().unwrap();
    }

    #[test]
    fn double_init_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.sock").to_string_lossy().into_owned();
        let mut s = Socket::uninit();
        s.init(SocketParams::unix_server(&path)).unwrap();
        let err = s.init(SocketParams::unix_server(&path)).unwrap_err();
        assert!(matches!(err, NetError::AlreadyInitialized));
    }

    #[test]
    fn send_recv_before_connect_fails() {
        let mut s = Socket::uninit();
        s.init(SocketParams::tcp_client("127.0.0.1", 1)).unwrap();
        assert!(matches!(s.send(b"x"), Err(NetError::NotConnected)));
    }
}
