//! Connection state machines.
//!
//! A [`Connection`] owns one database session and runs at most one
//! operation at a time. Every operation is a small machine over a driver
//! start/continue pair:
//!
//! - `Start` calls the driver's `*_start`
//! - `Waiting` calls the driver's `*_cont` with the readiness the reactor saw
//! - when the driver reports completion the machine performs its completion
//!   action right away and either chains into the next machine or hands
//!   control to the caller's callback
//!
//! Whenever the driver would block, the connection registers with the
//! reactor and returns. The pool routes the reactor's event back here and
//! the same machine resumes in its `Waiting` stage.
//!
//! Callbacks run synchronously from the stepping loop and never re-enter
//! it. Requests made from inside a callback (`query`, `prepare`, `execute`,
//! `close_statement`, `close`) are recorded and take effect once the
//! callback returns.

use std::borrow::Cow;
use std::fmt;
use std::io;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::ConnectOptions;
use crate::driver::{Driver, DriverResult, Fetch, Ready, Row, Step};
use crate::error::{Error, Result};
use crate::params::ParamSet;
use crate::reactor::{Interest, Reactor, Registration, Token};
use crate::result::StatementResult;

/// Caller callback. Returning `true` stops the current row loop.
pub type Callback<D, R> = Box<dyn FnMut(&mut Connection<D, R>) -> bool>;

/// Step of one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Waiting,
}

/// The machine a connection is running, as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Idle,
    Connect(Stage),
    Query(Stage),
    FetchRow(Stage),
    Prepare(Stage),
    Execute(Stage),
    StmtFetch(Stage),
    StmtClose(Stage),
    Close(Stage),
    /// Close requested, waiting for the deferred teardown turn
    Teardown,
    Closed,
}

/// Who holds a connection. Exactly one applies at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Idle in the pool
    Available,
    /// Checked out by a caller
    Owned,
    /// Being torn down by the pool
    Destroying,
}

/// Result of stepping a connection, consumed by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Idle,
    Pending,
    /// Teardown finished; the pool decides whether to keep the connection.
    Release,
    /// Session closed; the pool drops the connection.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Query,
    Prepare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterStmtClose {
    /// Continue with a new query or prepare
    Begin(Intent),
    /// Caller asked for the release; report it
    Notify,
    /// Pool-internal teardown
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Idle,
    Connect(Stage, Intent),
    Query(Stage),
    FetchRow(Stage),
    Prepare(Stage),
    Execute(Stage),
    StmtFetch(Stage),
    StmtClose(Stage, AfterStmtClose),
    Close(Stage),
    /// Invoke the callback once with the current state, then go idle
    Report,
    Teardown,
    Released,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Request {
    Query(String),
    Prepare(String),
    Execute,
    CloseStatement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Suspend,
}

// ============================================================================
// Connection
// ============================================================================

/// One database session driven by the reactor.
pub struct Connection<D: Driver, R: Reactor> {
    token: Token,
    options: ConnectOptions,
    driver: D,
    reactor: R,

    op: Op,
    /// Present iff a reactor wait is outstanding
    registration: Option<Registration>,
    membership: Membership,

    connected: bool,
    prepared: bool,
    /// The driver holds a statement handle that must be released
    stmt_open: bool,
    /// A plain query result set is open in the driver
    result_open: bool,
    closing: bool,
    /// A driver call was abandoned mid-flight; the session cannot be reused
    interrupted: bool,
    eof: bool,
    failure: Option<Error>,

    sql: String,
    pending: Option<Request>,
    params: Option<ParamSet>,
    result: Option<StatementResult>,
    row: Option<Row>,
    columns: usize,

    callback: Option<Callback<D, R>>,
    in_callback: bool,
    callback_changed: bool,
}

impl<D: Driver, R: Reactor> Connection<D, R> {
    pub(crate) fn new(token: Token, options: ConnectOptions, driver: D, reactor: R) -> Self {
        Self {
            token,
            options,
            driver,
            reactor,
            op: Op::Idle,
            registration: None,
            membership: Membership::Owned,
            connected: false,
            prepared: false,
            stmt_open: false,
            result_open: false,
            closing: false,
            interrupted: false,
            eof: false,
            failure: None,
            sql: String::new(),
            pending: None,
            params: None,
            result: None,
            row: None,
            columns: 0,
            callback: None,
            in_callback: false,
            callback_changed: false,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Identity of this connection in reactor events.
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    pub fn is_available(&self) -> bool {
        self.membership == Membership::Available
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn operation(&self) -> Operation {
        match self.op {
            Op::Idle | Op::Report => Operation::Idle,
            Op::Connect(stage, _) => Operation::Connect(stage),
            Op::Query(stage) => Operation::Query(stage),
            Op::FetchRow(stage) => Operation::FetchRow(stage),
            Op::Prepare(stage) => Operation::Prepare(stage),
            Op::Execute(stage) => Operation::Execute(stage),
            Op::StmtFetch(stage) => Operation::StmtFetch(stage),
            Op::StmtClose(stage, _) => Operation::StmtClose(stage),
            Op::Close(stage) => Operation::Close(stage),
            Op::Teardown | Op::Released => Operation::Teardown,
            Op::Closed => Operation::Closed,
        }
    }

    /// Whether the last operation failed.
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// The failure of the last operation.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Message describing the last failure.
    ///
    /// Misuse and reactor failures carry their own message; everything else
    /// reports the driver's last error text.
    pub fn error(&self) -> Cow<'_, str> {
        match &self.failure {
            Some(e) if e.overrides_driver_text() => Cow::Owned(e.to_string()),
            _ => Cow::Borrowed(self.driver.last_error()),
        }
    }

    /// Whether the current row loop reached the end of its result set.
    pub fn result_eof(&self) -> bool {
        self.eof
    }

    pub fn affected_rows(&self) -> u64 {
        self.driver.affected_rows()
    }

    pub fn insert_id(&self) -> u64 {
        self.driver.insert_id()
    }

    /// Typed result of the last execute, present while its rows stream.
    pub fn get_exec_result(&self) -> Option<&StatementResult> {
        self.result.as_ref()
    }

    /// Parameters of the prepared statement, present when it takes any.
    pub fn get_exec_bind(&mut self) -> Option<&mut ParamSet> {
        self.params.as_mut()
    }

    pub fn params(&self) -> Option<&ParamSet> {
        self.params.as_ref()
    }

    /// Drop the typed result early. An active statement fetch loop stops.
    ///
    /// Fails with [`Error::Busy`] while a driver call is suspended, since the
    /// driver still writes into the result's buffers.
    pub fn release_result(&mut self) -> Result<()> {
        if !self.in_callback && self.registration.is_some() {
            return Err(Error::Busy);
        }
        self.result = None;
        Ok(())
    }

    /// Column count of the current plain query result set.
    pub fn column_count(&self) -> usize {
        self.columns
    }

    /// Raw columns of the current plain query row; `None` entries are NULL.
    pub fn row(&self) -> Option<&[Option<Bytes>]> {
        self.row.as_deref()
    }

    // ------------------------------------------------------------------------
    // Caller operations
    // ------------------------------------------------------------------------

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Connection<D, R>) -> bool + 'static,
    {
        self.callback = Some(Box::new(callback));
        self.callback_changed = true;
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
        self.callback_changed = true;
    }

    /// Run a plain statement, connecting first if needed.
    ///
    /// The callback fires once per row, then once more with
    /// [`result_eof`](Self::result_eof) set. A statement without a result
    /// set fires it once.
    pub fn query(&mut self, sql: impl Into<String>) -> Result<()> {
        self.request(Request::Query(sql.into()))
    }

    /// Compile a statement, connecting first if needed.
    ///
    /// The callback fires once; bind parameters and call
    /// [`execute`](Self::execute) from there.
    pub fn prepare(&mut self, sql: impl Into<String>) -> Result<()> {
        self.request(Request::Prepare(sql.into()))
    }

    /// Bind the parameters and execute the prepared statement.
    ///
    /// Rows stream to the callback like [`query`](Self::query), read through
    /// [`get_exec_result`](Self::get_exec_result).
    pub fn execute(&mut self) -> Result<()> {
        self.request(Request::Execute)
    }

    /// Release the prepared statement, then fire the callback once.
    pub fn close_statement(&mut self) -> Result<()> {
        self.request(Request::CloseStatement)
    }

    /// Give the connection back to the pool.
    ///
    /// The callback is dropped and never fires again. Teardown runs on a
    /// later reactor turn, so this is safe to call from inside a callback.
    /// Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.closing || self.membership != Membership::Owned {
            return;
        }
        if !self.in_callback && self.op != Op::Idle {
            // the suspended driver call is abandoned
            self.interrupted = true;
        }

        self.closing = true;
        self.callback = None;
        self.callback_changed = true;
        self.pending = None;
        self.detach();
        self.op = Op::Teardown;
        self.reactor.defer(self.token);
    }

    fn request(&mut self, request: Request) -> Result<()> {
        if self.closing {
            return Err(Error::Closing);
        }
        if self.in_callback {
            if let Some(replaced) = self.pending.replace(request) {
                debug!(token = self.token.0, ?replaced, "request superseded");
            }
            return Ok(());
        }
        if self.op != Op::Idle {
            return Err(Error::Busy);
        }

        self.begin(request);
        self.resume(Ready::EMPTY);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Pool interface
    // ------------------------------------------------------------------------

    pub(crate) fn set_membership(&mut self, membership: Membership) {
        self.membership = membership;
    }

    /// Whether the session can serve another caller.
    pub(crate) fn is_reusable(&self) -> bool {
        self.connected && !self.interrupted
    }

    /// Route one reactor event.
    pub(crate) fn on_event(&mut self, ready: Ready) -> Outcome {
        if self.op == Op::Teardown {
            self.begin_teardown();
            return self.resume(Ready::EMPTY);
        }
        if self.registration.take().is_none() {
            trace!(token = self.token.0, ?ready, "stale event ignored");
            return Outcome::Pending;
        }
        self.resume(ready)
    }

    /// Reset for the next caller and mark idle.
    pub(crate) fn recycle(&mut self) {
        self.cleanup();
        self.callback = None;
        self.closing = false;
        self.op = Op::Idle;
        self.membership = Membership::Available;
    }

    /// Close the session. Finishes when this returns [`Outcome::Closed`]
    /// here or from a later event.
    pub(crate) fn shutdown(&mut self) -> Outcome {
        self.membership = Membership::Destroying;
        self.callback = None;
        self.detach();
        if !self.connected || self.interrupted {
            self.op = Op::Closed;
            return Outcome::Closed;
        }
        self.op = Op::Close(Stage::Start);
        self.resume(Ready::EMPTY)
    }

    // ------------------------------------------------------------------------
    // Stepping loop
    // ------------------------------------------------------------------------

    fn resume(&mut self, ready: Ready) -> Outcome {
        // readiness applies to the first continue call only
        let mut ready = ready;

        loop {
            let ready = std::mem::take(&mut ready);

            let flow = match self.op {
                Op::Idle => return Outcome::Idle,
                Op::Teardown => return Outcome::Pending,
                Op::Released => return Outcome::Release,
                Op::Closed => return Outcome::Closed,
                Op::Report => {
                    self.notify();
                    self.settle(Op::Idle, true);
                    Flow::Continue
                }
                Op::Connect(stage, intent) => {
                    let step = match stage {
                        Stage::Start => self.driver.connect_start(&self.options),
                        Stage::Waiting => self.driver.connect_cont(ready),
                    };
                    self.finish(step, Op::Connect(Stage::Waiting, intent), |conn, done| {
                        conn.connect_done(intent, done)
                    })
                }
                Op::Query(stage) => {
                    let step = match stage {
                        Stage::Start => self.driver.query_start(&self.sql),
                        Stage::Waiting => self.driver.query_cont(ready),
                    };
                    self.finish(step, Op::Query(Stage::Waiting), Self::query_done)
                }
                Op::FetchRow(stage) => {
                    let step = match stage {
                        Stage::Start => self.driver.fetch_row_start(),
                        Stage::Waiting => self.driver.fetch_row_cont(ready),
                    };
                    self.finish(step, Op::FetchRow(Stage::Waiting), Self::row_done)
                }
                Op::Prepare(stage) => {
                    let step = match stage {
                        Stage::Start => {
                            // the driver allocates a statement handle here
                            self.stmt_open = true;
                            self.driver.prepare_start(&self.sql)
                        }
                        Stage::Waiting => self.driver.prepare_cont(ready),
                    };
                    self.finish(step, Op::Prepare(Stage::Waiting), Self::prepare_done)
                }
                Op::Execute(stage) => {
                    let step = match stage {
                        Stage::Start => self.driver.execute_start(),
                        Stage::Waiting => self.driver.execute_cont(ready),
                    };
                    self.finish(step, Op::Execute(Stage::Waiting), Self::execute_done)
                }
                Op::StmtFetch(stage) => match self.result.as_mut() {
                    Some(result) => {
                        let step = match stage {
                            Stage::Start => self.driver.stmt_fetch_start(result.buffers_mut()),
                            Stage::Waiting => {
                                self.driver.stmt_fetch_cont(result.buffers_mut(), ready)
                            }
                        };
                        self.finish(step, Op::StmtFetch(Stage::Waiting), Self::stmt_fetch_done)
                    }
                    None => {
                        // the caller released the result
                        self.op = Op::Idle;
                        Flow::Continue
                    }
                },
                Op::StmtClose(stage, after) => {
                    let step = match stage {
                        Stage::Start => self.driver.stmt_close_start(),
                        Stage::Waiting => self.driver.stmt_close_cont(ready),
                    };
                    self.finish(step, Op::StmtClose(Stage::Waiting, after), |conn, done| {
                        conn.stmt_close_done(after, done)
                    })
                }
                Op::Close(stage) => {
                    let step = match stage {
                        Stage::Start => self.driver.close_start(),
                        Stage::Waiting => self.driver.close_cont(ready),
                    };
                    self.finish(step, Op::Close(Stage::Waiting), |conn, ()| conn.close_done())
                }
            };

            if flow == Flow::Suspend {
                return Outcome::Pending;
            }
        }
    }

    fn finish<T>(&mut self, step: Step<T>, waiting: Op, done: impl FnOnce(&mut Self, T)) -> Flow {
        match step {
            Step::Wait(wait) => self.suspend(waiting, wait),
            Step::Done(output) => {
                done(self, output);
                Flow::Continue
            }
        }
    }

    /// Register with the reactor and record the stage to resume in.
    fn suspend(&mut self, waiting: Op, wait: Ready) -> Flow {
        self.detach();

        let fd = if wait.wants_io() { self.driver.socket() } else { None };
        let timeout = wait.contains(Ready::TIMEOUT).then(|| self.driver.timeout());

        let registered = if wait.wants_io() && fd.is_none() {
            Err(io::Error::new(io::ErrorKind::NotConnected, "driver has no socket to wait on"))
        } else {
            self.reactor.register(self.token, Interest { fd, ready: wait, timeout })
        };

        match registered {
            Ok(registration) => {
                trace!(token = self.token.0, op = ?waiting, ?wait, ?fd, ?timeout, "suspended");
                self.registration = Some(registration);
                self.op = waiting;
                Flow::Suspend
            }
            Err(e) => {
                // the driver call stays outstanding, so the session is lost
                self.interrupted = true;
                self.op = match waiting {
                    Op::StmtClose(_, AfterStmtClose::Release) => Op::Released,
                    Op::Close(_) => Op::Closed,
                    _ => Op::Report,
                };
                self.fail(Error::Reactor(e));
                Flow::Continue
            }
        }
    }

    fn detach(&mut self) {
        if let Some(registration) = self.registration.take() {
            self.reactor.deregister(registration);
        }
    }

    /// Invoke the callback. Returns whether the caller asked to stop.
    fn notify(&mut self) -> bool {
        let Some(mut callback) = self.callback.take() else {
            return true;
        };

        self.in_callback = true;
        self.callback_changed = false;
        let stop = callback(self);
        self.in_callback = false;

        if !self.callback_changed {
            self.callback = Some(callback);
        }
        stop
    }

    /// Pick the next machine after a callback.
    fn settle(&mut self, next: Op, stop: bool) {
        if self.closing {
            // close() already moved to teardown
            return;
        }
        if let Some(request) = self.pending.take() {
            self.begin(request);
            return;
        }
        self.op = if stop { Op::Idle } else { next };
    }

    fn fail(&mut self, error: Error) {
        debug!(token = self.token.0, %error, "operation failed");
        self.failure = Some(error);
    }

    /// Reset session-scoped state. Identity, connection status and the
    /// callback survive.
    fn cleanup(&mut self) {
        self.detach();

        if self.result_open {
            if !self.interrupted {
                self.driver.free_result();
            }
            self.result_open = false;
        }

        self.result = None;
        self.params = None;
        self.row = None;
        self.columns = 0;
        self.prepared = false;
        self.eof = false;
        self.failure = None;
        self.pending = None;
        self.sql.clear();
    }

    // ------------------------------------------------------------------------
    // Machine entry points
    // ------------------------------------------------------------------------

    fn begin(&mut self, request: Request) {
        match request {
            Request::Query(sql) => self.open(sql, Intent::Query),
            Request::Prepare(sql) => self.open(sql, Intent::Prepare),
            Request::Execute => self.begin_execute(),
            Request::CloseStatement => {
                if self.stmt_open {
                    self.op = Op::StmtClose(Stage::Start, AfterStmtClose::Notify);
                } else {
                    self.cleanup();
                    self.op = Op::Report;
                }
            }
        }
    }

    fn open(&mut self, sql: String, intent: Intent) {
        self.cleanup();
        self.sql = sql;

        self.op = if self.stmt_open {
            Op::StmtClose(Stage::Start, AfterStmtClose::Begin(intent))
        } else {
            self.entry(intent)
        };
    }

    /// First machine of a buffered query or prepare.
    fn entry(&self, intent: Intent) -> Op {
        match (self.connected, intent) {
            (false, _) => Op::Connect(Stage::Start, intent),
            (true, Intent::Query) => Op::Query(Stage::Start),
            (true, Intent::Prepare) => Op::Prepare(Stage::Start),
        }
    }

    fn begin_execute(&mut self) {
        self.result = None;
        self.eof = false;
        self.failure = None;

        if !self.connected || !self.prepared {
            self.fail(Error::Misuse("execute called before a successful prepare".to_string()));
            self.op = Op::Report;
            return;
        }

        if let Some(params) = &self.params {
            if let Err(e) = self.driver.bind_params(params.as_slice()) {
                self.fail(Error::StatementError(e));
                self.op = Op::Report;
                return;
            }
        }

        self.op = Op::Execute(Stage::Start);
    }

    fn begin_teardown(&mut self) {
        self.cleanup();
        self.op = if self.stmt_open && !self.interrupted {
            Op::StmtClose(Stage::Start, AfterStmtClose::Release)
        } else {
            Op::Released
        };
    }

    // ------------------------------------------------------------------------
    // Completion actions
    // ------------------------------------------------------------------------

    fn connect_done(&mut self, intent: Intent, done: DriverResult<()>) {
        match done {
            Ok(()) => {
                debug!(token = self.token.0, host = %self.options.host, port = self.options.port, "connected");
                self.connected = true;
                self.op = self.entry(intent);
            }
            Err(e) => {
                self.fail(Error::ConnectError(e));
                self.op = Op::Report;
            }
        }
    }

    fn query_done(&mut self, done: DriverResult<()>) {
        if let Err(e) = done {
            self.fail(Error::StatementError(e));
            self.op = Op::Report;
            return;
        }

        match self.driver.use_result() {
            Ok(Some(columns)) => {
                self.columns = columns;
                self.result_open = true;
                self.op = Op::FetchRow(Stage::Start);
            }
            Ok(None) => self.op = Op::Report,
            Err(e) => {
                self.fail(Error::FetchError(e));
                self.op = Op::Report;
            }
        }
    }

    fn row_done(&mut self, done: DriverResult<Option<Row>>) {
        match done {
            Ok(Some(row)) => {
                self.row = Some(row);
                let stop = self.notify();
                self.settle(Op::FetchRow(Stage::Start), stop);
            }
            Ok(None) => {
                self.row = None;
                self.eof = true;
                self.op = Op::Report;
            }
            Err(e) => {
                self.row = None;
                self.fail(Error::FetchError(e));
                self.op = Op::Report;
            }
        }
    }

    fn prepare_done(&mut self, done: DriverResult<usize>) {
        match done {
            Ok(count) => {
                debug!(token = self.token.0, params = count, "prepared");
                self.prepared = true;
                self.params = (count > 0).then(|| ParamSet::new(count));
            }
            Err(e) => self.fail(Error::StatementError(e)),
        }
        self.op = Op::Report;
    }

    fn execute_done(&mut self, done: DriverResult<()>) {
        if let Err(e) = done {
            self.fail(Error::StatementError(e));
            self.op = Op::Report;
            return;
        }

        match self.driver.result_metadata() {
            Ok(meta) if meta.is_empty() => self.op = Op::Report,
            Ok(meta) => {
                debug!(token = self.token.0, columns = meta.len(), "executed");
                self.result = Some(StatementResult::new(meta));
                self.op = Op::StmtFetch(Stage::Start);
            }
            Err(e) => {
                self.fail(Error::StatementError(e));
                self.op = Op::Report;
            }
        }
    }

    fn stmt_fetch_done(&mut self, done: DriverResult<Fetch>) {
        match done {
            Ok(Fetch::Row) => {
                if let Err(e) = self.refetch_truncated() {
                    self.fail(Error::FetchError(e));
                    self.op = Op::Report;
                    return;
                }
                let stop = self.notify();
                self.settle(Op::StmtFetch(Stage::Start), stop);
            }
            Ok(Fetch::NoData) => {
                self.eof = true;
                self.op = Op::Report;
            }
            Err(e) => {
                self.fail(Error::FetchError(e));
                self.op = Op::Report;
            }
        }
    }

    /// Grow every column the last fetch truncated and fetch it again.
    fn refetch_truncated(&mut self) -> DriverResult<()> {
        let Some(result) = self.result.as_mut() else {
            return Ok(());
        };

        for (index, column) in result.buffers_mut().iter_mut().enumerate() {
            if column.is_truncated() {
                trace!(token = self.token.0, index, length = column.length(), "refetching column");
                column.grow();
                self.driver.fetch_column(index, column)?;
            }
        }
        Ok(())
    }

    fn stmt_close_done(&mut self, after: AfterStmtClose, done: DriverResult<()>) {
        self.stmt_open = false;
        self.prepared = false;

        match after {
            AfterStmtClose::Begin(intent) => {
                if let Err(e) = done {
                    debug!(token = self.token.0, error = %e, "statement release failed");
                }
                self.op = self.entry(intent);
            }
            AfterStmtClose::Notify => {
                self.cleanup();
                if let Err(e) = done {
                    self.fail(Error::StatementError(e));
                }
                self.op = Op::Report;
            }
            AfterStmtClose::Release => {
                if let Err(e) = done {
                    warn!(token = self.token.0, error = %e, "statement release failed during teardown");
                }
                self.op = Op::Released;
            }
        }
    }

    fn close_done(&mut self) {
        debug!(token = self.token.0, "session closed");
        self.connected = false;
        self.op = Op::Closed;
    }
}

impl<D: Driver, R: Reactor> Drop for Connection<D, R> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<D: Driver, R: Reactor> fmt::Debug for Connection<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token)
            .field("host", &self.options.host)
            .field("port", &self.options.port)
            .field("database", &self.options.database)
            .field("operation", &self.operation())
            .field("membership", &self.membership)
            .field("connected", &self.connected)
            .field("failed", &self.failed())
            .finish_non_exhaustive()
    }
}
