//! The external non-blocking driver contract.
//!
//! A driver performs the wire I/O and protocol encoding for one session.
//! Every logical operation is split into a `*_start` call and a `*_cont`
//! call. Either returns [`Step::Wait`] with the conditions it needs before
//! it can make progress, or [`Step::Done`] with the operation's output.
//!
//! The connection never calls another entry point while a start/cont pair
//! is outstanding.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::os::fd::RawFd;
use std::time::Duration;

use bytes::Bytes;
use smallvec::SmallVec;
use thiserror::Error;

use crate::config::ConnectOptions;
use crate::params::Param;
use crate::result::ColumnBuffer;

// ============================================================================
// Wait Status
// ============================================================================

/// Set of I/O conditions, used both as the driver's wait status and as the
/// readiness the reactor reports back.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ready(u8);

impl Ready {
    pub const EMPTY: Ready = Ready(0);
    pub const READ: Ready = Ready(1);
    pub const WRITE: Ready = Ready(2);
    pub const TIMEOUT: Ready = Ready(4);

    /// Create from raw bits, dropping unknown ones.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        Ready(bits & 0b111)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set.
    #[inline]
    pub fn contains(self, other: Ready) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any bit of `other` is set.
    #[inline]
    pub fn intersects(self, other: Ready) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the socket itself must be watched.
    #[inline]
    pub fn wants_io(self) -> bool {
        self.intersects(Ready::READ | Ready::WRITE)
    }
}

impl BitOr for Ready {
    type Output = Ready;

    fn bitor(self, rhs: Ready) -> Ready {
        Ready(self.0 | rhs.0)
    }
}

impl BitOrAssign for Ready {
    fn bitor_assign(&mut self, rhs: Ready) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Ready {
    type Output = Ready;

    fn bitand(self, rhs: Ready) -> Ready {
        Ready(self.0 & rhs.0)
    }
}

impl fmt::Debug for Ready {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("EMPTY");
        }
        let mut sep = "";
        for (bit, name) in [(Ready::READ, "READ"), (Ready::WRITE, "WRITE"), (Ready::TIMEOUT, "TIMEOUT")] {
            if self.contains(bit) {
                write!(f, "{sep}{name}")?;
                sep = "|";
            }
        }
        Ok(())
    }
}

/// Progress of one driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// The operation finished with this output.
    Done(T),
    /// The operation would block until one of these conditions holds.
    Wait(Ready),
}

// ============================================================================
// Driver Outputs
// ============================================================================

/// Error reported by the driver for one operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct DriverError {
    pub code: u32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// One row of a plain query, as raw column contents (`None` is SQL NULL).
pub type Row = SmallVec<[Option<Bytes>; 8]>;

/// Metadata of one prepared statement result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name (or alias) as reported by the server
    pub name: String,
    /// Maximum display length reported by the server (0 if unknown)
    pub length: usize,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Outcome of one statement fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// The bound column buffers hold a new row.
    Row,
    /// The result set is exhausted.
    NoData,
}

// ============================================================================
// Driver Trait
// ============================================================================

/// Non-blocking database driver for one session.
pub trait Driver {
    fn connect_start(&mut self, options: &ConnectOptions) -> Step<DriverResult<()>>;
    fn connect_cont(&mut self, ready: Ready) -> Step<DriverResult<()>>;

    fn query_start(&mut self, sql: &str) -> Step<DriverResult<()>>;
    fn query_cont(&mut self, ready: Ready) -> Step<DriverResult<()>>;

    /// Open the result set of the last plain query for row streaming.
    ///
    /// Returns the column count, or `None` if the statement produced no
    /// result set.
    fn use_result(&mut self) -> DriverResult<Option<usize>>;

    /// Fetch the next row of the open result set; `None` is end of data.
    fn fetch_row_start(&mut self) -> Step<DriverResult<Option<Row>>>;
    fn fetch_row_cont(&mut self, ready: Ready) -> Step<DriverResult<Option<Row>>>;

    /// Discard whatever remains of the open result set.
    fn free_result(&mut self);

    /// Compile a statement. Outputs the number of parameter placeholders.
    fn prepare_start(&mut self, sql: &str) -> Step<DriverResult<usize>>;
    fn prepare_cont(&mut self, ready: Ready) -> Step<DriverResult<usize>>;

    fn bind_params(&mut self, params: &[Param]) -> DriverResult<()>;

    fn execute_start(&mut self) -> Step<DriverResult<()>>;
    fn execute_cont(&mut self, ready: Ready) -> Step<DriverResult<()>>;

    /// Result columns of the last execute; empty when it returns none.
    fn result_metadata(&mut self) -> DriverResult<Vec<ColumnMeta>>;

    /// Fetch the next row into `columns`.
    ///
    /// A value longer than its buffer is truncated; the buffer still
    /// records the full length so the caller can grow it and refetch.
    fn stmt_fetch_start(&mut self, columns: &mut [ColumnBuffer]) -> Step<DriverResult<Fetch>>;
    fn stmt_fetch_cont(&mut self, columns: &mut [ColumnBuffer], ready: Ready) -> Step<DriverResult<Fetch>>;

    /// Refetch column `index` (0-based) of the current row into `column`.
    fn fetch_column(&mut self, index: usize, column: &mut ColumnBuffer) -> DriverResult<()>;

    fn stmt_close_start(&mut self) -> Step<DriverResult<()>>;
    fn stmt_close_cont(&mut self, ready: Ready) -> Step<DriverResult<()>>;

    fn close_start(&mut self) -> Step<()>;
    fn close_cont(&mut self, ready: Ready) -> Step<()>;

    /// Socket of the session, once one exists.
    fn socket(&self) -> Option<RawFd>;

    /// Interval to wait when the driver asks for [`Ready::TIMEOUT`].
    fn timeout(&self) -> Duration;

    /// Text of the last error the driver saw.
    fn last_error(&self) -> &str;

    fn affected_rows(&self) -> u64;

    fn insert_id(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_bits() {
        let ready = Ready::READ | Ready::TIMEOUT;
        assert!(ready.contains(Ready::READ));
        assert!(!ready.contains(Ready::WRITE));
        assert!(ready.wants_io());
        assert!(!Ready::TIMEOUT.wants_io());
        assert_eq!(Ready::from_bits(0xff).bits(), 0b111);
        assert_eq!(format!("{:?}", ready), "READ|TIMEOUT");
        assert_eq!(format!("{:?}", Ready::EMPTY), "EMPTY");
    }
}
