//! `CLoggerServer::Trace`: a thread-local client connection, lazily
//! established on first use so every thread pays the connect cost at most
//! once and none of them contend on a shared socket.

use crate::record::LogRecord;
use std::cell::RefCell;
use sys_net::{Socket, SocketParams};

pub const SOCKET_PATH: &str = "./log/server.sock";

thread_local! {
    static CONNECTION: RefCell<Option<Socket>> = RefCell::new(None);
}

pub struct Client;

impl Client {
    /// Sends `record` to the log server. Never surfaces a failure to the
    /// caller: a dead or absent log server is a diagnostics problem, not a
    /// reason to fail the caller's own work, matching the original's
    /// `Trace()` (which prints and returns on any failure).
    pub fn trace(record: LogRecord) {
        trace_bytes(record.as_bytes());
    }
}

pub(crate) fn trace_bytes(bytes: &[u8]) {
    CONNECTION.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            match connect() {
                Ok(socket) => *slot = Some(socket),
                Err(_) => {
                    eprintln!("logserver client: connect to {} failed, dropping record", SOCKET_PATH);
                    return;
                }
            }
        }
        let failed = match slot.as_mut() {
            Some(socket) => socket.send(bytes).is_err(),
            None => true,
        };
        if failed {
            eprintln!("logserver client: send failed, dropping record");
            *slot = None;
        }
    });
}

fn connect() -> Result<Socket, sys_net::NetError> {
    let mut socket = Socket::uninit();
    socket.init(SocketParams::unix_client(SOCKET_PATH))?;
    socket.link()?;
    Ok(socket)
}
