//! `TRACEI`/`TRACED`/... and `LOGI`/`LOGD`/... from the original, rebuilt
//! as macros that capture call-site file/line/function the way `__FILE__`/
//! `__LINE__`/`__FUNCTION__` did, and fan out to [`crate::Client::trace`].

/// Resolves to the name of the function it's expanded inside, via the
/// well-known `type_name::<T>` trick (there is no `__FUNCTION__` in Rust).
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        $crate::strip_fn_suffix(type_name_of(f))
    }};
}

/// Sends a formatted record at `$level`. Accepts an optional `slog`-style
/// key/value tail after a `;`, e.g.
/// `log_at!(Level::Warning, "retry {}/{}", n, max; "peer" => addr)` — the
/// pairs are rendered inline since records route through this crate's own
/// sink, not through `slog` itself.
#[macro_export]
macro_rules! log_at {
    ($level:expr, $fmt:expr $(, $arg:expr)* ; $($key:expr => $val:expr),+ $(,)?) => {{
        let mut message = format!($fmt $(, $arg)*);
        $( message.push_str(&format!(" {}={}", $key, $val)); )+
        $crate::Client::trace($crate::LogRecord::formatted(
            file!(),
            line!(),
            $crate::function_name!(),
            $level,
            format_args!("{}", message),
        ))
    }};
    ($level:expr, $($arg:tt)*) => {
        $crate::Client::trace($crate::LogRecord::formatted(
            file!(),
            line!(),
            $crate::function_name!(),
            $level,
            format_args!($($arg)*),
        ))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Info, $($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Debug, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Warning, $($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Error, $($arg)*) };
}

#[macro_export]
macro_rules! log_fatal {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Fatal, $($arg)*) };
}

/// Starts a streamed record at `$level`; chain `.push(...)` calls, the
/// record flushes on drop. Mirrors the original's `LOGI << a << b;`.
#[macro_export]
macro_rules! log_stream {
    ($level:expr) => {
        $crate::StreamedRecord::new(file!(), line!(), $crate::function_name!(), $level)
    };
}

/// Sends a hex dump of `$data` at `$level`, mirroring `DUMPI`/`DUMPD`/....
#[macro_export]
macro_rules! log_dump {
    ($level:expr, $data:expr) => {
        $crate::Client::trace($crate::LogRecord::dump(
            file!(),
            line!(),
            $crate::function_name!(),
            $level,
            $data,
        ))
    };
}
