use std::io;
use thiserror::Error;

/// Errors raised by `socket` and `poll`. Split along the same line as
/// `flux::shared::NetworkError`: most variants are plain construction or
/// usage mistakes, `Io` carries whatever the kernel actually said.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("socket already initialized")]
    AlreadyInitialized,

    #[error("socket not initialized")]
    NotInitialized,

    #[error("socket not connected")]
    NotConnected,

    #[error("socket is not a listening/server socket")]
    NotAServer,

    #[error("address could not be parsed")]
    AddrParse,

    #[error("duplicate readiness registration for this cookie")]
    DuplicateRegistration,

    #[error("fd is not registered with this readiness set")]
    NotRegistered,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl NetError {
    /// Mirrors `ErrorUtils::has_failed`: transient conditions (the peer
    /// isn't ready yet) are not fatal, everything else is.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            NetError::Io(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted
        )
    }
}
