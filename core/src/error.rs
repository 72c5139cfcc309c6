use subprocess::SpawnError;
use sys_net::NetError;
use task_bus::TaskBusError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connector already initialized")]
    AlreadyInitialized,

    #[error("listener has no file descriptor")]
    NoFd,

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    TaskBus(#[from] TaskBusError),
}
