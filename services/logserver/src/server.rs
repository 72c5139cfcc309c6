//! `CLoggerServer`: directory/file/socket setup plus a single background
//! writer thread that accepts client connections and appends whatever they
//! send to the day's log file.

use crate::client::SOCKET_PATH;
use crate::error::LogServerError;
use byte_buffer::ByteBuffer;
use chrono::Local;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sys_net::{Interests, RecvOutcome, Readiness, Socket, SocketParams};
use thread_control::Worker;

const LISTENER_COOKIE: u64 = 0;
const RECV_CAP: usize = 1024 * 1024;
const LOG_DIR: &str = "log";

fn ensure_log_dir() -> Result<(), LogServerError> {
    if fs::metadata(LOG_DIR).is_err() {
        fs::create_dir(LOG_DIR)?;
        fs::set_permissions(LOG_DIR, fs::Permissions::from_mode(0o775))?;
    }
    Ok(())
}

fn log_file_path() -> String {
    let now = Local::now();
    format!("{}/{} {:03}.log", LOG_DIR, now.format("%Y-%m-%d %H-%M-%S"), now.timestamp_subsec_millis())
}

struct Shared {
    listener: Socket,
    readiness: Readiness,
    clients: HashMap<u64, Socket>,
    next_cookie: u64,
    file: File,
}

fn writer_loop(shared: Arc<Mutex<Shared>>) -> i32 {
    loop {
        if !shared.lock().expect("logserver mutex poisoned").readiness.is_open() {
            return 0;
        }

        let events = {
            let mut guard = shared.lock().expect("logserver mutex poisoned");
            match guard.readiness.wait(Duration::from_millis(1)) {
                Ok(events) => events,
                Err(_) => continue,
            }
        };

        for event in events {
            if event.cookie == LISTENER_COOKIE {
                accept_one(&shared);
            } else {
                recv_and_append(&shared, event.cookie);
            }
        }
    }
}

fn accept_one(shared: &Arc<Mutex<Shared>>) {
    let mut guard = shared.lock().expect("logserver mutex poisoned");
    let client = match guard.listener.link() {
        Ok(Some(client)) => client,
        _ => return,
    };
    let fd = match client.as_raw_fd() {
        Some(fd) => fd,
        None => return,
    };
    let cookie = guard.next_cookie;
    guard.next_cookie += 1;
    if guard.readiness.add(fd, cookie, Interests::Readable).is_ok() {
        guard.clients.insert(cookie, client);
    }
}

fn recv_and_append(shared: &Arc<Mutex<Shared>>, cookie: u64) {
    let mut guard = shared.lock().expect("logserver mutex poisoned");
    let mut buf = ByteBuffer::with_capacity(RECV_CAP);
    buf.resize(RECV_CAP);

    let outcome = match guard.clients.get_mut(&cookie) {
        Some(client) => client.recv(&mut buf),
        None => return,
    };

    match outcome {
        Ok(RecvOutcome::Data(_)) => {
            let _ = guard.file.write_all(buf.as_slice());
            let _ = guard.file.sync_data();
        }
        _ => {
            if let Some(client) = guard.clients.get(&cookie) {
                if let Some(fd) = client.as_raw_fd() {
                    let _ = guard.readiness.del(fd);
                }
            }
            guard.clients.remove(&cookie);
        }
    }
}

/// One listening socket (`./log/server.sock`), one append-only log file
/// under `./log/`, one background writer thread.
pub struct LogServer {
    path: String,
    shared: Arc<Mutex<Shared>>,
    writer: Worker,
}

impl LogServer {
    pub fn start() -> Result<LogServer, LogServerError> {
        ensure_log_dir()?;
        let path = log_file_path();
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;

        let mut listener = Socket::uninit();
        listener.init(SocketParams::unix_server(SOCKET_PATH))?;
        let fd = listener.as_raw_fd().ok_or(LogServerError::NoFd)?;

        let mut readiness = Readiness::create(8)?;
        readiness.add(fd, LISTENER_COOKIE, Interests::Readable)?;

        let shared = Arc::new(Mutex::new(Shared {
            listener,
            readiness,
            clients: HashMap::new(),
            next_cookie: LISTENER_COOKIE + 1,
            file,
        }));

        let loop_shared = shared.clone();
        let mut writer = Worker::with_body(move || writer_loop(loop_shared));
        writer.start()?;

        Ok(LogServer { path, shared, writer })
    }

    /// Path of the log file this instance is appending to.
    pub fn log_file_path(&self) -> &str {
        &self.path
    }

    pub fn close(&mut self) -> Result<(), LogServerError> {
        {
            let mut guard = self.shared.lock().expect("logserver mutex poisoned");
            guard.readiness.close();
            let _ = guard.listener.close();
        }
        self.writer.stop()?;
        let _ = std::fs::remove_file(SOCKET_PATH);
        Ok(())
    }
}

impl Drop for LogServer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
