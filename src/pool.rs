//! Connection pool.
//!
//! The pool owns every connection it creates. Callers borrow one with
//! [`Pool::acquire`], drive it through its callback and hand it back with
//! [`Connection::close`]. Teardown then runs on a later reactor turn:
//! connections that can be reused go back to the idle set, the rest are
//! closed and dropped.
//!
//! Reactor events reach connections through [`Pool::dispatch`].

use tracing::{debug, trace};

use crate::config::PoolConfig;
use crate::connection::{Connection, Membership, Outcome};
use crate::driver::{Driver, Ready};
use crate::reactor::{Reactor, Token};

/// Reusable set of connections sharing one reactor.
pub struct Pool<D: Driver, R: Reactor> {
    /// Pool configuration
    config: PoolConfig,
    /// Reactor handle cloned into every connection
    reactor: R,
    /// Builds one driver per new connection
    connector: Box<dyn FnMut() -> D>,
    /// Every connection still alive, in creation order
    conns: Vec<Connection<D, R>>,
    next_token: u64,
    /// Live connections the pool has not decided to destroy
    created: usize,
}

impl<D: Driver, R: Reactor> Pool<D, R> {
    /// Create an empty pool. No connection is opened until the first
    /// [`acquire`](Self::acquire).
    pub fn new<F>(config: PoolConfig, reactor: R, connector: F) -> Self
    where
        F: FnMut() -> D + 'static,
    {
        Self {
            config,
            reactor,
            connector: Box::new(connector),
            conns: Vec::new(),
            next_token: 0,
            created: 0,
        }
    }

    /// Check out a connection.
    ///
    /// Returns the first idle connection, or creates a new one. Creation is
    /// never refused; the cap only limits how many idle connections are
    /// kept. The returned connection has no callback set.
    pub fn acquire(&mut self) -> &mut Connection<D, R> {
        let index = match self.conns.iter().position(Connection::is_available) {
            Some(index) => {
                trace!(token = self.conns[index].token().0, "reusing idle connection");
                index
            }
            None => {
                self.next_token += 1;
                let token = Token(self.next_token);
                let driver = (self.connector)();
                self.conns.push(Connection::new(
                    token,
                    self.config.connect.clone(),
                    driver,
                    self.reactor.clone(),
                ));
                self.created += 1;
                debug!(token = token.0, created = self.created, "connection created");
                self.conns.len() - 1
            }
        };

        let conn = &mut self.conns[index];
        conn.set_membership(Membership::Owned);
        conn
    }

    /// Connection checked out under `token`.
    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection<D, R>> {
        self.conns
            .iter_mut()
            .find(|conn| conn.token() == token && conn.membership() == Membership::Owned)
    }

    /// Route one reactor event to the connection it belongs to.
    ///
    /// Events for connections that no longer exist are ignored.
    pub fn dispatch(&mut self, token: Token, ready: Ready) {
        let Some(index) = self.position(token) else {
            trace!(token = token.0, ?ready, "event for unknown connection");
            return;
        };

        match self.conns[index].on_event(ready) {
            Outcome::Release => self.release(index),
            Outcome::Closed => self.remove(index),
            Outcome::Idle | Outcome::Pending => {}
        }
    }

    /// Keep or destroy a connection whose teardown finished.
    fn release(&mut self, index: usize) {
        let idle = self.idle();
        let cap = self.config.max_connections;
        let conn = &mut self.conns[index];

        if idle >= cap || !conn.is_reusable() {
            self.created = self.created.saturating_sub(1);
            debug!(
                token = conn.token().0,
                idle,
                reusable = conn.is_reusable(),
                created = self.created,
                "destroying connection"
            );
            if conn.shutdown() == Outcome::Closed {
                self.remove(index);
            }
        } else {
            conn.recycle();
            trace!(token = conn.token().0, idle = idle + 1, "connection returned to pool");
        }
    }

    fn remove(&mut self, index: usize) {
        let conn = self.conns.remove(index);
        trace!(token = conn.token().0, "connection dropped");
    }

    fn position(&self, token: Token) -> Option<usize> {
        self.conns.iter().position(|conn| conn.token() == token)
    }

    fn count(&self, membership: Membership) -> usize {
        self.conns.iter().filter(|conn| conn.membership() == membership).count()
    }

    /// Live connections, excluding those being destroyed.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Connections checked out by callers, including those handed back and
    /// waiting for teardown.
    pub fn busy(&self) -> usize {
        self.count(Membership::Owned)
    }

    /// Connections waiting in the pool.
    pub fn idle(&self) -> usize {
        self.count(Membership::Available)
    }

    /// Connections whose session close is still running.
    pub fn closing(&self) -> usize {
        self.count(Membership::Destroying)
    }

    /// Nothing is checked out and nothing is being destroyed.
    pub fn is_quiescent(&self) -> bool {
        self.conns.iter().all(Connection::is_available)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn reactor(&self) -> &R {
        &self.reactor
    }
}

impl<D: Driver, R: Reactor> std::fmt::Debug for Pool<D, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("max_connections", &self.config.max_connections)
            .field("created", &self.created)
            .field("busy", &self.busy())
            .field("idle", &self.idle())
            .field("closing", &self.closing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::Membership;
    use crate::tests::Harness;

    #[test]
    fn test_acquire_creates_lazily() {
        let mut h = Harness::new(3, |_| {});
        assert_eq!(h.pool.created(), 0);
        assert!(h.pool.is_quiescent());

        let conn = h.pool.acquire();
        assert_eq!(conn.membership(), Membership::Owned);
        assert!(!conn.is_connected());
        assert_eq!(conn.options().database, "test");

        assert_eq!(h.pool.created(), 1);
        assert_eq!(h.pool.busy(), 1);
        assert!(!h.pool.is_quiescent());
    }

    #[test]
    fn test_get_mut_only_returns_checked_out() {
        let mut h = Harness::new(3, |_| {});
        let token = h.pool.acquire().token();
        assert!(h.pool.get_mut(token).is_some());

        let conn = h.pool.get_mut(token).unwrap();
        conn.query("select 1").unwrap();
        conn.close();
        // handed back but not torn down yet
        assert!(h.pool.get_mut(token).is_some());

        h.run();
        assert!(h.pool.get_mut(token).is_none());
        assert_eq!(h.pool.idle(), 1);
    }

    #[test]
    fn test_zero_cap_keeps_nothing_idle() {
        let mut h = Harness::new(0, |_| {});
        let conn = h.pool.acquire();
        conn.query("select 1").unwrap();
        conn.close();
        h.run();

        assert_eq!(h.pool.idle(), 0);
        assert_eq!(h.pool.created(), 0);
        assert_eq!(h.driver(0).count("close_start"), 1);
    }

    #[test]
    fn test_debug_reports_counts() {
        let mut h = Harness::new(5, |_| {});
        h.pool.acquire();
        let debug = format!("{:?}", h.pool);
        assert!(debug.contains("max_connections: 5"));
        assert!(debug.contains("busy: 1"));
    }
}
