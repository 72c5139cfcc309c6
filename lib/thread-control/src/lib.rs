//! Joinable worker thread: `CThread` from the original, rebuilt without its
//! process-wide `std::map<pthread_t, CThread*>`. `spec.md` §9 flags that
//! registry as a data race waiting to happen; here each thread publishes a
//! raw pointer to its own pause/stop flags into its *own* thread-local
//! storage, so the signal handler that runs on a thread only ever reads
//! that thread's own state — partitioned by construction, not by convention.

mod error;

pub use error::ThreadError;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::cell::Cell;
use std::os::unix::thread::JoinHandleExt;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const STOP_JOIN_TIMEOUT: Duration = Duration::from_millis(100);

thread_local! {
    static PAUSE_FLAG: Cell<*const AtomicBool> = Cell::new(ptr::null());
    static STOP_FLAG: Cell<*const AtomicBool> = Cell::new(ptr::null());
}

extern "C" fn handle_pause_signal(_signo: libc::c_int) {
    let paused = PAUSE_FLAG.with(Cell::get);
    if paused.is_null() {
        return;
    }
    let stopping = STOP_FLAG.with(Cell::get);
    // SAFETY: both pointers were published by this same thread before the
    // handler was installed, and stay valid for the handler's lifetime.
    while unsafe { &*paused }.load(Ordering::SeqCst) {
        if !stopping.is_null() && unsafe { &*stopping }.load(Ordering::SeqCst) {
            unsafe { libc::pthread_exit(ptr::null_mut()) };
        }
        unsafe { libc::usleep(1_000) };
    }
}

extern "C" fn handle_kill_signal(_signo: libc::c_int) {
    unsafe { libc::pthread_exit(ptr::null_mut()) };
}

fn install_signal_handlers() {
    let action = SigAction::new(SigHandler::Handler(handle_pause_signal), SaFlags::empty(), SigSet::empty());
    // SAFETY: installs a plain one-arg handler, no prior handler is relied upon.
    unsafe { sigaction(Signal::SIGUSR1, &action) }.expect("install SIGUSR1 handler");

    let action = SigAction::new(SigHandler::Handler(handle_kill_signal), SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(Signal::SIGUSR2, &action) }.expect("install SIGUSR2 handler");
}

type Done = (Mutex<bool>, Condvar);

/// A joinable worker bound to a nullary body, with cooperative pause/resume
/// and a bounded-timeout stop.
pub struct Worker {
    body: Option<Box<dyn FnOnce() -> i32 + Send>>,
    handle: Option<JoinHandle<i32>>,
    paused: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    done: Arc<Done>,
}

impl Worker {
    pub fn new() -> Worker {
        Worker {
            body: None,
            handle: None,
            paused: Arc::new(AtomicBool::new(false)),
            should_stop: Arc::new(AtomicBool::new(false)),
            done: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn with_body<F>(body: F) -> Worker
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        let mut worker = Worker::new();
        worker.set_thread_func(body);
        worker
    }

    /// Sets (or replaces) the body this worker runs on `start`.
    pub fn set_thread_func<F>(&mut self, body: F)
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        self.body = Some(Box::new(body));
    }

    /// Spawns the worker thread. The new thread installs its pause/kill
    /// signal handlers before running the body.
    pub fn start(&mut self) -> Result<(), ThreadError> {
        if self.handle.is_some() {
            return Err(ThreadError::AlreadyStarted);
        }
        let body = self.body.take().ok_or(ThreadError::NoBody)?;
        let paused = self.paused.clone();
        let should_stop = self.should_stop.clone();
        let done = self.done.clone();

        self.paused.store(false, Ordering::SeqCst);
        self.should_stop.store(false, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .spawn(move || {
                PAUSE_FLAG.with(|c| c.set(Arc::as_ptr(&paused)));
                STOP_FLAG.with(|c| c.set(Arc::as_ptr(&should_stop)));
                install_signal_handlers();

                let code = body();

                let (lock, cvar) = &*done;
                *lock.lock().unwrap() = true;
                cvar.notify_all();
                code
            })
            .map_err(ThreadError::Spawn)?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Toggles the pause flag and signals the thread; idempotent — a second
    /// call resumes a paused worker rather than erroring.
    pub fn pause(&self) -> Result<(), ThreadError> {
        let handle = self.handle.as_ref().ok_or(ThreadError::NotRunning)?;
        if self.paused.swap(!self.paused.load(Ordering::SeqCst), Ordering::SeqCst) {
            // was paused, now resumed: no signal needed, the spin loop polls the flag itself
            return Ok(());
        }
        let pthread_id = handle.as_pthread_t();
        let ret = unsafe { libc::pthread_kill(pthread_id as libc::pthread_t, libc::SIGUSR1) };
        if ret != 0 {
            self.paused.store(false, Ordering::SeqCst);
            return Err(ThreadError::Signal(ret));
        }
        Ok(())
    }

    /// Requests the thread stop and joins it with a 100ms bound. On
    /// timeout, detaches (a dropped `JoinHandle` that was never joined
    /// detaches its pthread on this platform) and delivers the kill signal
    /// as a last resort.
    pub fn stop(&mut self) -> Result<(), ThreadError> {
        let handle = match self.handle.take() {
            Some(h) => h,
            None => return Ok(()),
        };
        self.should_stop.store(true, Ordering::SeqCst);
        let pthread_id = handle.as_pthread_t();

        let (lock, cvar) = &*self.done;
        let guard = lock.lock().unwrap();
        let (_guard, wait_result) = cvar.wait_timeout_while(guard, STOP_JOIN_TIMEOUT, |done| !*done).unwrap();

        if wait_result.timed_out() {
            unsafe {
                libc::pthread_kill(pthread_id as libc::pthread_t, libc::SIGUSR2);
            }
            drop(handle);
        } else {
            let _ = handle.join();
        }
        Ok(())
    }

    /// The original's `isValid()` inverted and renamed: `isValid` actually
    /// meant "thread is not running", which reads backwards at every call
    /// site.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Default for Worker {
    fn default() -> Self {
        Worker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread::sleep;

    #[test]
    fn start_runs_body_and_stop_joins_cleanly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let mut worker = Worker::with_body(move || {
            c.fetch_add(1, Ordering::SeqCst);
            0
        });
        assert!(!worker.is_running());
        worker.start().unwrap();
        assert!(worker.is_running());

        // give the body a moment to run before stop
        sleep(Duration::from_millis(20));
        worker.stop().unwrap();
        assert!(!worker.is_running());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pause_toggle_is_idempotent_on_a_spinning_worker() {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        let mut worker = Worker::with_body(move || {
            while r.load(Ordering::SeqCst) {
                sleep(Duration::from_millis(5));
            }
            0
        });
        worker.start().unwrap();
        sleep(Duration::from_millis(20));

        worker.pause().unwrap(); // pause
        worker.pause().unwrap(); // resume

        running.store(false, Ordering::SeqCst);
        worker.stop().unwrap();
    }

    #[test]
    fn stop_on_never_started_worker_is_a_noop() {
        let mut worker = Worker::new();
        worker.stop().unwrap();
        assert!(!worker.is_running());
    }
}
