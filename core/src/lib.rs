//! Accept/dispatch engine: `CServer` from the original. Binds a listening
//! socket, forks a business process once, then runs two `TaskBus` workers
//! that accept connections and hand each accepted fd across to the child
//! over a `subprocess::Channel`.

mod error;

pub use error::ConnectorError;

use logserver::log_error;
use nix::unistd::Pid;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subprocess::{Channel, Spawner};
use sys_net::{Interests, Readiness, Socket, SocketParams};
use task_bus::TaskBus;

const LISTENER_COOKIE: u64 = 0;
const WORKER_COUNT: usize = 2;

struct ListenerShared {
    listener: Option<Socket>,
    readiness: Readiness,
}

/// The child process's entry point: receives each accepted connection's fd
/// over its end of the channel and does whatever the caller's business
/// logic requires with it. Out of scope here — callers supply their own
/// (`spec.md` §4.G's `CBusiness` equivalent).
pub trait Business: FnOnce(Channel) -> i32 + Send + 'static {}
impl<F> Business for F where F: FnOnce(Channel) -> i32 + Send + 'static {}

/// Listens on `ip:port`, forwards every accepted connection to a forked
/// business process. `init` does the one-time setup; `run` blocks until
/// `close` is called (from another thread, or a signal handler the caller
/// installs); `close` is idempotent only in the sense that a second call is
/// a harmless no-op on an already-closed listener.
pub struct Connector {
    shared: Arc<Mutex<ListenerShared>>,
    task_bus: Option<TaskBus>,
    channel: Option<Arc<Mutex<Channel>>>,
    child_pid: Option<Pid>,
}

impl Connector {
    pub fn init<B: Business>(business: B, ip: impl Into<String>, port: u16) -> Result<Connector, ConnectorError> {
        let mut spawner = Spawner::new();
        spawner.set_entry(business);
        let (child_pid, channel) = spawner.spawn()?;

        let task_bus = TaskBus::start(WORKER_COUNT)?;

        let mut listener = Socket::uninit();
        listener.init(SocketParams::tcp_server(ip, port).non_blocking(true))?;
        let fd = listener.as_raw_fd().ok_or(ConnectorError::NoFd)?;

        let mut readiness = Readiness::create(WORKER_COUNT + 1)?;
        readiness.add(fd, LISTENER_COOKIE, Interests::Readable)?;

        let shared = Arc::new(Mutex::new(ListenerShared { listener: Some(listener), readiness }));
        let channel = Arc::new(Mutex::new(channel));

        for _ in 0..WORKER_COUNT {
            let shared = shared.clone();
            let channel = channel.clone();
            task_bus.add_task(move || accept_worker_loop(shared, channel))?;
        }

        Ok(Connector { shared, task_bus: Some(task_bus), channel: Some(channel), child_pid: Some(child_pid) })
    }

    /// Blocks until `close()` clears the listener, polling every 10 µs —
    /// matches the original's busy-wait `Run()`.
    pub fn run(&self) {
        loop {
            if self.shared.lock().expect("connector mutex poisoned").listener.is_none() {
                return;
            }
            std::thread::sleep(Duration::from_micros(10));
        }
    }

    pub fn child_pid(&self) -> Option<Pid> {
        self.child_pid
    }

    /// Detaches and closes the listener, sends the `-1` shutdown sentinel
    /// to the business process, and tears down the task bus.
    pub fn close(&mut self) -> Result<(), ConnectorError> {
        {
            let mut guard = self.shared.lock().expect("connector mutex poisoned");
            if let Some(listener) = guard.listener.take() {
                if let Some(fd) = listener.as_raw_fd() {
                    let _ = guard.readiness.del(fd);
                }
            }
            guard.readiness.close();
        }

        if let Some(channel) = self.channel.take() {
            let _ = channel.lock().expect("channel mutex poisoned").send_fd(-1);
        }

        if let Some(mut task_bus) = self.task_bus.take() {
            task_bus.close()?;
        }

        Ok(())
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn accept_worker_loop(shared: Arc<Mutex<ListenerShared>>, channel: Arc<Mutex<Channel>>) -> i32 {
    loop {
        let open = {
            let guard = shared.lock().expect("connector mutex poisoned");
            guard.listener.is_some() && guard.readiness.is_open()
        };
        if !open {
            return 0;
        }

        let events = {
            let mut guard = shared.lock().expect("connector mutex poisoned");
            match guard.readiness.wait(Duration::from_millis(10)) {
                Ok(events) => events,
                Err(_) => continue,
            }
        };

        for event in events {
            if event.error {
                continue;
            }
            if event.cookie == LISTENER_COOKIE {
                accept_and_dispatch(&shared, &channel);
            }
        }
    }
}

fn accept_and_dispatch(shared: &Arc<Mutex<ListenerShared>>, channel: &Arc<Mutex<Channel>>) {
    let client = {
        let mut guard = shared.lock().expect("connector mutex poisoned");
        let listener = match guard.listener.as_mut() {
            Some(listener) => listener,
            None => return,
        };
        match listener.link() {
            Ok(Some(client)) => client,
            _ => return,
        }
    };

    let fd = match client.as_raw_fd() {
        Some(fd) => fd,
        None => return,
    };

    let result = channel.lock().expect("channel mutex poisoned").send_fd(fd);
    // the parent's own copy of the fd is closed once handed off, matching
    // the original's unconditional `delete pClient` right after `SendSocket`
    drop(client);

    if result.is_err() {
        log_error!("send client {} to business process failed", fd);
    }
}
