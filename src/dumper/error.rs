use std::str::Utf8Error;

/// Failure of a single raw memory read.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("null pointer dereference")]
    Null,
    #[error("address {addr:#x} ({len} bytes) is not readable")]
    Unreadable { addr: usize, len: usize },
    #[error("short read at {addr:#x}: {read} of {len} bytes")]
    ShortRead { addr: usize, len: usize, read: usize },
    #[error("address arithmetic overflow at {0:#x}")]
    Overflow(usize),
    #[error("ptrace read at {addr:#x}: {source}")]
    Ptrace { addr: usize, source: nix::Error },
    #[error("read process mappings: {0}")]
    Maps(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("implausible {what}: {value}")]
    InvalidCount { what: &'static str, value: i64 },
    #[error("value has no addressable storage")]
    NoAddress,
    #[error("template parameter #{0} missing")]
    MissingTemplateParameter(usize),
    #[error("backend hint `{0}` missing or invalid")]
    MissingHint(&'static str),
    #[error("string data is not zero terminated")]
    Unterminated,
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(&'static str),
    #[error("no dumper for type `{0}`")]
    UnknownType(String),
    #[error("object has no property `{0}`")]
    UnknownProperty(String),
    #[error("memory fault: {0}")]
    Fault(String),
}

impl DumpError {
    /// Return a hint to a dispatcher: true if error caused by inspected process data
    /// (unreadable or corrupted memory), false if request itself can not be served.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DumpError::Memory(_) => true,
            DumpError::InvalidCount { .. } => true,
            DumpError::Unterminated => true,
            DumpError::Fault(_) => true,
            DumpError::NoAddress => false,
            DumpError::MissingTemplateParameter(_) => false,
            DumpError::MissingHint(_) => false,
            DumpError::UnsupportedLayout(_) => false,
            DumpError::UnknownType(_) => false,
            DumpError::UnknownProperty(_) => false,
        }
    }
}

/// Errors of request decoding at the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("unsupported protocol version {0}")]
    Protocol(i32),
    #[error("input buffer: field `{0}` is missing or not terminated")]
    MissingField(&'static str),
    #[error("too many template parameters ({0})")]
    TooManyTemplateParameters(usize),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "dumper", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "dumper", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!($crate::dm_warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!($crate::dm_warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!($crate::dm_debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!($crate::dm_debug, $res, $msg)
    };
}
