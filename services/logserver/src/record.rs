//! `LogInfo` from the original: a record builder with three constructors
//! (formatted, streamed, binary dump), rebuilt around a plain [`ByteBuffer`]
//! instead of `operator<<`/implicit `Buffer` conversion.

use byte_buffer::ByteBuffer;
use chrono::Local;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Debug,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

/// Current pid, rendered the way the original renders `getpid()`.
pub fn pid() -> i32 {
    std::process::id() as i32
}

/// Current native thread id, rendered the way the original renders
/// `pthread_self()`. Not the same number space as `std::thread::ThreadId`,
/// which doesn't expose a raw integer.
pub fn tid() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

fn header(file: &str, line: u32, func: &str, level: Level) -> String {
    let now = Local::now();
    format!(
        "{} {:03} pid={} tid={} [{}] {}:{} {} - ",
        now.format("%Y-%m-%d %H-%M-%S"),
        now.timestamp_subsec_millis(),
        pid(),
        tid(),
        level,
        file,
        line,
        func,
    )
}

/// A finished record, ready to hand to [`crate::Client::trace`].
pub struct LogRecord(ByteBuffer);

impl LogRecord {
    pub fn formatted(file: &str, line: u32, func: &str, level: Level, args: fmt::Arguments) -> LogRecord {
        let mut buf = ByteBuffer::new();
        buf.append_str(&header(file, line, func, level));
        buf.append_str(&args.to_string());
        buf.append_byte(b'\n');
        LogRecord(buf)
    }

    /// Renders `data` as a hex dump beneath the header, mirroring `DUMPI`/
    /// `DUMPD`/... in the original.
    pub fn dump(file: &str, line: u32, func: &str, level: Level, data: &[u8]) -> LogRecord {
        let mut buf = ByteBuffer::new();
        buf.append_str(&header(file, line, func, level));
        buf.append_str(&format!("{} bytes:\n", data.len()));
        for chunk in data.chunks(16) {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            buf.append_str(&hex.join(" "));
            buf.append_byte(b'\n');
        }
        LogRecord(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<LogRecord> for ByteBuffer {
    fn from(record: LogRecord) -> ByteBuffer {
        record.0
    }
}

/// A streamed record, built up by chained `push` calls and flushed to the
/// trace sink when it drops — the closest idiomatic match for the
/// original's `operator<<` chain, which flushes implicitly when the
/// temporary `LogInfo` reaches the end of its statement.
pub struct StreamedRecord {
    buf: ByteBuffer,
}

impl StreamedRecord {
    pub fn new(file: &str, line: u32, func: &str, level: Level) -> StreamedRecord {
        let mut buf = ByteBuffer::new();
        buf.append_str(&header(file, line, func, level));
        StreamedRecord { buf }
    }

    pub fn push(mut self, value: impl fmt::Display) -> Self {
        self.buf.append_str(&value.to_string());
        self
    }
}

impl Drop for StreamedRecord {
    fn drop(&mut self) {
        self.buf.append_byte(b'\n');
        crate::client::trace_bytes(self.buf.as_slice());
    }
}

/// Internal helper used by the `function_name!` trick in the log macros:
/// turns a monomorphized function item's `type_name` into the enclosing
/// function's path, then strips the `::f` suffix it adds.
pub fn strip_fn_suffix(type_name: &'static str) -> &'static str {
    &type_name[..type_name.len() - 3]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_record_contains_header_and_message() {
        let record = LogRecord::formatted("a.rs", 10, "f", Level::Info, format_args!("hi {}", 5));
        let text = String::from_utf8(record.as_bytes().to_vec()).unwrap();
        assert!(text.contains("[INFO]"));
        assert!(text.contains("a.rs:10"));
        assert!(text.contains("hi 5"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn dump_record_renders_hex_bytes() {
        let record = LogRecord::dump("a.rs", 1, "f", Level::Debug, &[0xde, 0xad, 0xbe, 0xef]);
        let text = String::from_utf8(record.as_bytes().to_vec()).unwrap();
        assert!(text.contains("de ad be ef"));
        assert!(text.contains("4 bytes"));
    }
}
