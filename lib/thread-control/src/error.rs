use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread already started")]
    AlreadyStarted,

    #[error("no body set for this worker")]
    NoBody,

    #[error("worker is not running")]
    NotRunning,

    #[error("thread spawn failed: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("pthread_kill failed with errno {0}")]
    Signal(i32),
}
