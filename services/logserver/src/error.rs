use sys_net::NetError;
use thread_control::ThreadError;

#[derive(Debug, thiserror::Error)]
pub enum LogServerError {
    #[error("server already started")]
    AlreadyStarted,

    #[error("listener has no file descriptor")]
    NoFd,

    #[error("log directory or file unavailable")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Thread(#[from] ThreadError),
}
