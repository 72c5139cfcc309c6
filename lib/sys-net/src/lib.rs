//! Socket abstraction and readiness multiplexer: `CSocketBase`/`CLocalSocket`
//! and `CEpoll` from the original, rebuilt on `socket2` + `mio`.

mod error;
mod poll;
mod socket;

pub use error::NetError;
pub use poll::{Cookie, Interests, ReadyEvent, Readiness};
pub use socket::{Addr, RecvOutcome, SendOutcome, Socket, SocketParams};
