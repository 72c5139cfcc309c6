//! Fork-based process spawner: `CProcess` from the original, rebuilt around
//! `nix`'s `fork`/`socketpair`/`sendmsg`/`recvmsg` wrappers instead of raw
//! libc calls.
//!
//! `socketpair` + `fork` produces four descriptors in the original; here
//! `spawn` performs that as one atomic "split" and hands back two distinct
//! `Channel`s, each owning exactly one end, so a misplaced `close` can't
//! leave a dangling descriptor (`spec.md` §9's ownership-across-fork note).

mod error;

pub use error::SpawnError;

use nix::sys::socket::{
    recvmsg, sendmsg, socketpair, AddressFamily, ControlMessage, ControlMessageOwned, MsgFlags, SockFlag, SockType,
};
use nix::sys::uio::IoSlice;
use nix::unistd::{fork, ForkResult, Pid};
use std::io::IoSliceMut;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};

/// Fixed, uninterpreted filler so the datagram is never a zero-length
/// ancillary-only message, which some kernels reject. Kept per `spec.md`
/// §9 but never read back on the receive side.
const FILLER_A: [u8; 10] = *b"edoyun\0\0\0\0";
const FILLER_B: [u8; 10] = *b"jueding\0\0\0";

/// One end of the parent/child socketpair. Owns its fd; closed on drop.
pub struct Channel {
    sock: OwnedFd,
}

impl Channel {
    fn from_owned(sock: OwnedFd) -> Channel {
        Channel { sock }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }

    /// Sends `fd` as an `SCM_RIGHTS` ancillary message alongside the two
    /// filler iovecs. `fd == -1` sends the filler alone, with no ancillary
    /// data at all — building an `SCM_RIGHTS` message around an invalid fd
    /// would itself fail at the syscall, so the shutdown sentinel is
    /// represented by the message's *absence* of ancillary data rather than
    /// by a `-1` riding inside one.
    pub fn send_fd(&self, fd: RawFd) -> Result<(), SpawnError> {
        let iov = [IoSlice::new(&FILLER_A), IoSlice::new(&FILLER_B)];
        if fd < 0 {
            sendmsg::<nix::sys::socket::UnixAddr>(self.sock.as_raw_fd(), &iov, &[], MsgFlags::empty(), None).map_err(SpawnError::SendMsg)?;
            return Ok(());
        }
        let fds = [fd];
        let cmsg = [ControlMessage::ScmRights(&fds)];
        sendmsg::<nix::sys::socket::UnixAddr>(self.sock.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None).map_err(SpawnError::SendMsg)?;
        Ok(())
    }

    /// Receives one message. Returns the transferred fd, or `-1` if the
    /// message carried no ancillary data (the shutdown sentinel sent by
    /// `send_fd(-1)`). Any *other* kind of ancillary data is a protocol
    /// violation and is an error, matching the original's "fail if it is
    /// not SCM_RIGHTS".
    pub fn recv_fd(&self) -> Result<RawFd, SpawnError> {
        let mut filler_a = [0u8; 10];
        let mut filler_b = [0u8; 10];
        let mut iov = [IoSliceMut::new(&mut filler_a), IoSliceMut::new(&mut filler_b)];
        let mut cmsg_space = nix::cmsg_space!([RawFd; 1]);

        let msg = recvmsg::<nix::sys::socket::UnixAddr>(self.sock.as_raw_fd(), &mut iov, Some(&mut cmsg_space), MsgFlags::empty())
            .map_err(SpawnError::RecvMsg)?;

        if msg.bytes == 0 {
            return Err(SpawnError::EmptyMessage);
        }

        let mut fds = msg.cmsgs().map_err(|_| SpawnError::NoAncillaryFd)?;
        match fds.next() {
            None => Ok(-1),
            Some(ControlMessageOwned::ScmRights(rights)) => {
                rights.first().copied().ok_or(SpawnError::NoAncillaryFd)
            }
            Some(_) => Err(SpawnError::NoAncillaryFd),
        }
    }
}

/// Forks a child that runs a caller-supplied entry point, and establishes
/// a bidirectional `Channel` across the fork boundary.
pub struct Spawner {
    entry: Option<Box<dyn FnOnce(Channel) -> i32 + Send>>,
}

impl Spawner {
    pub fn new() -> Spawner {
        Spawner { entry: None }
    }

    /// Records the child's entry point, replacing any prior one.
    pub fn set_entry<F>(&mut self, entry: F)
    where
        F: FnOnce(Channel) -> i32 + Send + 'static,
    {
        self.entry = Some(Box::new(entry));
    }

    /// Creates a `socketpair`, then forks. The child runs the entry with
    /// its end of the channel and `_exit`s with its return code; the parent
    /// gets its own end of the channel back together with the child pid.
    /// Does not wait on the child — see `reap`.
    pub fn spawn(&mut self) -> Result<(Pid, Channel), SpawnError> {
        let entry = self.entry.take().ok_or(SpawnError::NoEntry)?;
        let (child_sock, parent_sock) =
            socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::empty()).map_err(SpawnError::SocketPair)?;

        match unsafe { fork() }.map_err(SpawnError::Fork)? {
            ForkResult::Child => {
                drop(parent_sock);
                let channel = Channel::from_owned(child_sock);
                let code = entry(channel);
                unsafe { libc::_exit(code) };
            }
            ForkResult::Parent { child } => {
                drop(child_sock);
                Ok((child, Channel::from_owned(parent_sock)))
            }
        }
    }

    /// Non-blocking reap of a child's exit status. The spawner itself never
    /// waits on children; this is exposed for callers (a supervisor) that
    /// want to avoid leaking zombies.
    pub fn reap(pid: Pid) -> Result<Option<i32>, SpawnError> {
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Ok(Some(code)),
            Ok(_) => Ok(None),
            Err(nix::Error::ECHILD) => Ok(None),
            Err(e) => Err(SpawnError::Fork(e)),
        }
    }

    /// Standard double-fork daemonization: fork, `setsid`, fork again, close
    /// stdio, `umask(0)`, ignore `SIGCHLD`.
    pub fn switch_daemon() -> Result<(), SpawnError> {
        use nix::sys::signal::{signal, SigHandler, Signal};
        use nix::sys::stat::{umask, Mode};
        use nix::unistd::setsid;

        match unsafe { fork() }.map_err(SpawnError::Daemonize)? {
            ForkResult::Parent { .. } => std::process::exit(0),
            ForkResult::Child => {}
        }

        setsid().map_err(SpawnError::Daemonize)?;

        match unsafe { fork() }.map_err(SpawnError::Daemonize)? {
            ForkResult::Parent { .. } => std::process::exit(0),
            ForkResult::Child => {}
        }

        for fd in 0..3 {
            unsafe {
                libc::close(fd);
            }
        }
        umask(Mode::empty());
        unsafe {
            signal(Signal::SIGCHLD, SigHandler::SigIgn).map_err(SpawnError::Daemonize)?;
        }
        Ok(())
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Spawner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::{AsRawFd as _, FromRawFd as _};

    #[test]
    fn spawn_runs_entry_and_reports_exit_code() {
        let mut spawner = Spawner::new();
        spawner.set_entry(|_channel| 7);
        let (pid, _channel) = spawner.spawn().unwrap();

        let status = nix::sys::wait::waitpid(pid, None).unwrap();
        match status {
            nix::sys::wait::WaitStatus::Exited(_, code) => assert_eq!(code, 7),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn fd_round_trips_across_fork() {
        let (mut ours, theirs) = std::os::unix::net::UnixStream::pair().unwrap();
        use std::io::Write;
        ours.write_all(b"PING").unwrap();

        let mut spawner = Spawner::new();
        spawner.set_entry(move |channel| match channel.recv_fd() {
            Ok(fd) if fd >= 0 => {
                let mut stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
                let mut buf = [0u8; 4];
                use std::io::Read;
                stream.read_exact(&mut buf).map(|_| 0).unwrap_or(1)
            }
            _ => 2,
        });

        let (pid, parent_channel) = spawner.spawn().unwrap();
        parent_channel.send_fd(theirs.as_raw_fd()).unwrap();
        drop(theirs);

        let status = nix::sys::wait::waitpid(pid, None).unwrap();
        assert!(matches!(status, nix::sys::wait::WaitStatus::Exited(_, 0)));
    }

    #[test]
    fn shutdown_sentinel_recv_is_negative_one() {
        let mut spawner = Spawner::new();
        spawner.set_entry(|channel| match channel.recv_fd() {
            Ok(-1) => 0,
            _ => 1,
        });
        let (pid, parent_channel) = spawner.spawn().unwrap();
        parent_channel.send_fd(-1).unwrap();

        let status = nix::sys::wait::waitpid(pid, None).unwrap();
        assert!(matches!(status, nix::sys::wait::WaitStatus::Exited(_, 0)));
    }
}
