//! Crate-wide error type.
//!
//! Every failure mode named in the command/response/config surface lives
//! here so callers can match on a closed set of kinds instead of
//! stringly-typed causes. Module-local errors (`wal::WalError`,
//! `wal::segment::SegmentError`) convert into this type at the boundary
//! where they cross into `Storage`.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("unknown engine type: {0}")]
    EngineUnknown(String),

    #[error("invalid network address: {0}")]
    AddressInvalid(String),

    #[error("{field} must be in [{min}, {max}], got {got}")]
    ParamOutOfRange {
        field: &'static str,
        min: String,
        max: String,
        got: String,
    },

    #[error("empty query")]
    EmptyQuery,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("wrong argument count for {kind}: expected {expected}, got {got}")]
    ArgCountMismatch {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("key not found")]
    KeyNotFound,

    #[error("I/O failure: {0}")]
    IOFailure(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("partial write while flushing WAL batch")]
    PartialWrite,

    #[error("connection closed")]
    ConnectionClosed,
}

impl Clone for Error {
    /// WAL completion signals must be resolvable for every record in a
    /// failed batch, so the failure needs to be shareable. `io::Error` does
    /// not implement `Clone`, so it is re-expressed as its message.
    fn clone(&self) -> Self {
        match self {
            Error::ConfigInvalid(s) => Error::ConfigInvalid(s.clone()),
            Error::EngineUnknown(s) => Error::EngineUnknown(s.clone()),
            Error::AddressInvalid(s) => Error::AddressInvalid(s.clone()),
            Error::ParamOutOfRange {
                field,
                min,
                max,
                got,
            } => Error::ParamOutOfRange {
                field,
                min: min.clone(),
                max: max.clone(),
                got: got.clone(),
            },
            Error::EmptyQuery => Error::EmptyQuery,
            Error::UnknownCommand(s) => Error::UnknownCommand(s.clone()),
            Error::ArgCountMismatch {
                kind,
                expected,
                got,
            } => Error::ArgCountMismatch {
                kind,
                expected: *expected,
                got: *got,
            },
            Error::InvalidArg(s) => Error::InvalidArg(s.clone()),
            Error::KeyNotFound => Error::KeyNotFound,
            Error::IOFailure(e) => Error::IOFailure(std::io::Error::new(e.kind(), e.to_string())),
            Error::Cancelled => Error::Cancelled,
            Error::PartialWrite => Error::PartialWrite,
            Error::ConnectionClosed => Error::ConnectionClosed,
        }
    }
}
