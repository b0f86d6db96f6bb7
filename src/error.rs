//! Error types for evsql.
//!
//! Failures of the external driver arrive as [`DriverError`] and are
//! classified by the machine that observed them.

use std::io;

use thiserror::Error;

use crate::driver::DriverError;

#[derive(Error, Debug)]
pub enum Error {
    /// Authentication or network failure while establishing the session.
    #[error("connect failed: {0}")]
    ConnectError(DriverError),

    /// The server rejected a prepare, execute or plain query.
    #[error("statement failed: {0}")]
    StatementError(DriverError),

    /// Protocol error while streaming rows.
    #[error("fetch failed: {0}")]
    FetchError(DriverError),

    /// The caller used the connection out of order.
    #[error("{0}")]
    Misuse(String),

    #[error("parameter index {index} out of range (statement takes {size})")]
    ParamIndex { index: usize, size: usize },

    #[error("column index {index} out of range (result has {count})")]
    ColumnIndex { index: usize, count: usize },

    #[error("no column named {0:?}")]
    ColumnName(String),

    #[error("timestamp {0} is out of range")]
    Timestamp(i64),

    #[error("column is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A machine is suspended and the request was made outside a callback.
    #[error("connection is busy with another operation")]
    Busy,

    #[error("connection is closing")]
    Closing,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("reactor registration failed: {0}")]
    Reactor(#[from] io::Error),
}

impl Error {
    /// Whether this error carries its own message instead of deferring to
    /// the driver's last error text.
    pub(crate) fn overrides_driver_text(&self) -> bool {
        !matches!(
            self,
            Error::ConnectError(_) | Error::StatementError(_) | Error::FetchError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
