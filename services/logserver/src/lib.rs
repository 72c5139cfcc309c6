//! Out-of-band log sink: a background server process/thread that owns the
//! log file, and a client façade any thread in any process can use to
//! reach it over `./log/server.sock`. Grounded on the original's
//! `CLoggerServer`/`LogInfo`/`TRACE*`/`LOG*`/`DUMP*` family.

mod client;
mod error;
mod macros;
mod record;
mod server;

pub use client::Client;
pub use error::LogServerError;
pub use record::{strip_fn_suffix, Level, LogRecord, StreamedRecord};
pub use server::LogServer;
