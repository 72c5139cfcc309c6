use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("entry point not set")]
    NoEntry,

    #[error("socketpair failed: {0}")]
    SocketPair(#[source] nix::Error),

    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    #[error("sendmsg failed: {0}")]
    SendMsg(#[source] nix::Error),

    #[error("recvmsg failed: {0}")]
    RecvMsg(#[source] nix::Error),

    #[error("received message carried no SCM_RIGHTS ancillary data")]
    NoAncillaryFd,

    #[error("received a zero-byte message")]
    EmptyMessage,

    #[error("daemonization step failed: {0}")]
    Daemonize(#[source] nix::Error),
}
