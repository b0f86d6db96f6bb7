//! Reactor contract.
//!
//! The reactor watches sockets and timers on behalf of suspended
//! connections. It does not call back into connections itself: every event
//! is reported as a `(Token, Ready)` pair which the application routes to
//! [`Pool::dispatch`](crate::Pool::dispatch).
//!
//! Registrations are one-shot. Once a wait has fired, its [`Registration`]
//! is dead and the connection registers again if it needs to.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::driver::Ready;

pub mod tokio;

pub use self::tokio::{Events, TokioReactor};

/// Identifies the connection an event belongs to. Never reused by a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

/// Handle of one outstanding wait. Consumed by [`Reactor::deregister`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Registration(u64);

impl Registration {
    /// Wrap a reactor-specific identifier.
    pub fn new(id: u64) -> Self {
        Registration(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// What a suspended connection waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    /// Socket to watch; `None` for a timeout-only wait.
    pub fd: Option<RawFd>,
    /// Conditions to wait for.
    pub ready: Ready,
    /// Fire with [`Ready::TIMEOUT`] after this long.
    pub timeout: Option<Duration>,
}

/// Readiness and timer service shared by every connection of a pool.
///
/// Implementations are cheap handles; every connection keeps a clone.
pub trait Reactor: Clone {
    /// Start a one-shot wait on behalf of `token`.
    fn register(&self, token: Token, interest: Interest) -> io::Result<Registration>;

    /// Cancel a wait that has not fired yet.
    fn deregister(&self, registration: Registration);

    /// Report `token` with [`Ready::TIMEOUT`] on a later turn, outside the
    /// current call stack.
    fn defer(&self, token: Token);
}
