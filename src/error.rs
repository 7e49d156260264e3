use std::{fmt, result};

/// Crate-wide error type.
///
/// Every variant carries a `file:line message` string produced by the
/// [err_at] macro. Variants group errors the way the design's error
/// section groups them: configuration/structural/IO failures are fatal
/// (bubbled all the way to the caller, who aborts); policy rejections
/// during insert/erase are never represented here, they are change-log
/// counters instead.
#[derive(Debug)]
pub enum Error {
    /// Settings file missing, unreadable, or a field out of range.
    Config(String),
    /// A joint invariant across stores was found broken. Indicates a bug
    /// or on-disk corruption.
    Corruption(String),
    /// Any I/O failure talking to the backing stores or bloom files.
    IOError(String),
    /// A file name did not match the expected `<name>-hashdb.*` shape.
    InvalidFile(String),
    /// Caller-supplied argument is out of the legal range.
    InvalidInput(String),
    /// Encoding or decoding a packed word or an XML document failed.
    DecodeFail(String),
    /// A value could not be converted to/from its on-disk representation.
    FailConvert(String),
    /// A worker thread panicked or could not be joined.
    ThreadFail(String),
    /// A channel used for inter-thread dispatch is closed or broken.
    IPCFail(String),
    /// An operation the caller asked for has no implementation.
    NotImplemented(String),
    /// An invariant that must never break did anyway; not recoverable.
    Fatal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            Config(msg) => write!(f, "Config: {}", msg),
            Corruption(msg) => write!(f, "Corruption: {}", msg),
            IOError(msg) => write!(f, "IOError: {}", msg),
            InvalidFile(msg) => write!(f, "InvalidFile: {}", msg),
            InvalidInput(msg) => write!(f, "InvalidInput: {}", msg),
            DecodeFail(msg) => write!(f, "DecodeFail: {}", msg),
            FailConvert(msg) => write!(f, "FailConvert: {}", msg),
            ThreadFail(msg) => write!(f, "ThreadFail: {}", msg),
            IPCFail(msg) => write!(f, "IPCFail: {}", msg),
            NotImplemented(msg) => write!(f, "NotImplemented: {}", msg),
            Fatal(msg) => write!(f, "Fatal: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Build or wrap a [Result], tagging the `file:line` of the call site
/// onto the error message.
///
/// ```ignore
/// err_at!(IOError, fs::read(path))?;
/// err_at!(InvalidInput, msg: "bad offset {}", offset);
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $fmt:expr) => {{
        let msg = format!("{}:{} {}", file!(), line!(), format!($fmt));
        Err::<_, $crate::Error>($crate::Error::$v(msg))
    }};
    ($v:ident, msg: $fmt:expr, $($arg:expr),+) => {{
        let msg = format!("{}:{} {}", file!(), line!(), format!($fmt, $($arg),+));
        Err::<_, $crate::Error>($crate::Error::$v(msg))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let msg = format!("{}:{} {}", file!(), line!(), err);
                Err($crate::Error::$v(msg))
            }
        }
    }};
    ($v:ident, $e:expr, $ctx:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let msg = format!("{}:{} {} {}", file!(), line!(), $ctx, err);
                Err($crate::Error::$v(msg))
            }
        }
    }};
    ($v:ident, $e:expr, $fmt:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let ctx = format!($fmt, $($arg),+);
                let msg = format!("{}:{} {} {}", file!(), line!(), ctx, err);
                Err($crate::Error::$v(msg))
            }
        }
    }};
}
