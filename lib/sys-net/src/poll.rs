//! Readiness multiplexer: wraps `mio::Poll` the way `CEpoll` wrapped
//! `epoll_create`/`epoll_ctl`/`epoll_wait`, but returns the caller's own
//! opaque cookie instead of a raw `epoll_data_t` union.

use crate::error::NetError;
use mio::{Events, Interest, Token};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Opaque user data associated with a registration, returned verbatim in
/// the event batch. Stands in for the original's `void*`-typed
/// `epoll_data_t` cookie; kept as a plain integer since Rust has no
/// sound way to round-trip an arbitrary pointer through a raw union.
pub type Cookie = u64;

/// What a caller asked to be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interests {
    Readable,
    ReadableWritable,
}

impl Interests {
    fn to_mio(self) -> Interest {
        match self {
            Interests::Readable => Interest::READABLE,
            Interests::ReadableWritable => Interest::READABLE.add(Interest::WRITABLE),
        }
    }
}

/// One delivered event.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub cookie: Cookie,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

struct Registration {
    token: Token,
    cookie: Cookie,
}

/// Edge-triggered readiness set. `mio::Poll` is edge-triggered by
/// construction on Linux epoll, matching `spec.md` §4.C without an explicit
/// edge/level flag.
pub struct Readiness {
    poll: mio::Poll,
    events: Events,
    by_fd: HashMap<RawFd, Registration>,
    by_token: HashMap<Token, Cookie>,
    next_token: usize,
    open: bool,
}

impl Readiness {
    /// `count_hint` only sizes the event batch buffer; registration capacity
    /// is unbounded either way.
    pub fn create(count_hint: usize) -> Result<Readiness, NetError> {
        let poll = mio::Poll::new().map_err(NetError::Io)?;
        Ok(Readiness {
            poll,
            events: Events::with_capacity(count_hint.max(128)),
            by_fd: HashMap::new(),
            by_token: HashMap::new(),
            next_token: 0,
            open: true,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Registers `fd` for `interests`, associating `cookie` with it.
    /// Rejects an `fd` that is already registered, matching the original's
    /// "duplicate Add fails" rule.
    pub fn add(&mut self, fd: RawFd, cookie: Cookie, interests: Interests) -> Result<(), NetError> {
        if !self.open {
            return Err(NetError::NotInitialized);
        }
        if self.by_fd.contains_key(&fd) {
            return Err(NetError::DuplicateRegistration);
        }
        let token = Token(self.next_token);
        self.next_token += 1;
        let mut source = mio::unix::SourceFd(&fd);
        self.poll
            .registry()
            .register(&mut source, token, interests.to_mio())
            .map_err(NetError::Io)?;
        self.by_fd.insert(fd, Registration { token, cookie });
        self.by_token.insert(token, cookie);
        Ok(())
    }

    pub fn modify(&mut self, fd: RawFd, cookie: Cookie, interests: Interests) -> Result<(), NetError> {
        let reg = self.by_fd.get_mut(&fd).ok_or(NetError::NotRegistered)?;
        let mut source = mio::unix::SourceFd(&fd);
        self.poll
            .registry()
            .reregister(&mut source, reg.token, interests.to_mio())
            .map_err(NetError::Io)?;
        reg.cookie = cookie;
        self.by_token.insert(reg.token, cookie);
        Ok(())
    }

    pub fn del(&mut self, fd: RawFd) -> Result<(), NetError> {
        let reg = self.by_fd.remove(&fd).ok_or(NetError::NotRegistered)?;
        self.by_token.remove(&reg.token);
        let mut source = mio::unix::SourceFd(&fd);
        self.poll.registry().deregister(&mut source).map_err(NetError::Io)
    }

    /// Waits up to `timeout` for events; interrupted-syscall is mapped to
    /// an empty batch, not an error, per `spec.md` §4.C.
    pub fn wait(&mut self, timeout: Duration) -> Result<Vec<ReadyEvent>, NetError> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(NetError::Io(e)),
        }
        let mut out = Vec::with_capacity(self.events.iter().count());
        for ev in self.events.iter() {
            if let Some(&cookie) = self.by_token.get(&ev.token()) {
                out.push(ReadyEvent {
                    cookie,
                    readable: ev.is_readable(),
                    writable: ev.is_writable(),
                    error: ev.is_error(),
                });
            }
        }
        Ok(out)
    }

    /// Closing the set is how the task bus and the accept/dispatch core
    /// signal their worker loops to return; there is no kernel handle to
    /// release beyond dropping `mio::Poll` itself.
    pub fn close(&mut self) {
        self.open = false;
        self.by_fd.clear();
        self.by_token.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn readable_event_carries_cookie() {
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut set = Readiness::create(8).unwrap();
        set.add(a.as_raw_fd(), 0xdead_beef, Interests::Readable).unwrap();

        use std::io::Write;
        b.write_all(b"x").unwrap();

        let events = set.wait(Duration::from_millis(200)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cookie, 0xdead_beef);
        assert!(events[0].readable);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut set = Readiness::create(8).unwrap();
        set.add(a.as_raw_fd(), 1, Interests::Readable).unwrap();
        let err = set.add(a.as_raw_fd(), 2, Interests::Readable).unwrap_err();
        assert!(matches!(err, NetError::DuplicateRegistration));
    }

    #[test]
    fn del_then_wait_yields_nothing() {
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut set = Readiness::create(8).unwrap();
        set.add(a.as_raw_fd(), 7, Interests::Readable).unwrap();
        set.del(a.as_raw_fd()).unwrap();

        use std::io::Write;
        b.write_all(b"x").unwrap();
        let events = set.wait(Duration::from_millis(50)).unwrap();
        assert!(events.is_empty());
    }
}
