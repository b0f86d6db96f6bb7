//! Reactor-driven asynchronous MySQL client.
//!
//! Every [`Connection`] runs its operations as resumable state machines
//! over a non-blocking [`Driver`]. When the driver would block, the
//! connection registers with a [`Reactor`] and returns; the application
//! routes reactor events back through [`Pool::dispatch`] and the machine
//! picks up where it stopped. Results reach the caller through a callback.
//!
//! Architecture:
//! - `driver`: contract of the external non-blocking driver
//! - `reactor`: readiness/timer contract, plus a tokio implementation
//! - `connection`: per-connection state machines
//! - `pool`: connection reuse and teardown
//! - `params`: prepared statement parameters
//! - `result`: typed access to prepared statement rows
//!
//! Everything runs on one thread; nothing here is `Send`.

mod error;

pub mod config;
pub mod connection;
pub mod driver;
pub mod params;
pub mod pool;
pub mod reactor;
pub mod result;


pub use config::{ConnectOptions, PoolConfig};
pub use connection::{Callback, Connection, Membership, Operation, Stage};
pub use driver::{ColumnMeta, Driver, DriverError, DriverResult, Fetch, Ready, Row, Step};
pub use error::{Error, Result};
pub use params::{Param, ParamSet, ParamType, Timestamp};
pub use pool::Pool;
pub use reactor::{Events, Interest, Reactor, Registration, Token, TokioReactor};
pub use result::{ColumnBuffer, StatementResult};
