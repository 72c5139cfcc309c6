use sys_net::NetError;
use thiserror::Error;
use thread_control::ThreadError;

#[derive(Debug, Error)]
pub enum TaskBusError {
    #[error("listener socket has no underlying fd")]
    NoFd,

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Thread(#[from] ThreadError),

    #[error("task submission failed to send")]
    SendFailed,
}
