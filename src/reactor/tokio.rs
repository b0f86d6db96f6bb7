//! Single-threaded reactor on top of tokio.
//!
//! [`TokioReactor`] handles are given to the pool; the matching [`Events`]
//! stream is polled by the application, which routes each event with
//! [`Pool::dispatch`]. Both sides share one table of waits, so the whole
//! reactor must stay on the thread that created it (it is `!Send`).
//!
//! Registering a socket requires a running tokio runtime with IO enabled.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::future::{poll_fn, Future};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use ::tokio::io::unix::AsyncFd;
use ::tokio::io::Interest as TokioInterest;
use ::tokio::time::{sleep, Sleep};

use super::{Interest, Reactor, Registration, Token};
use crate::driver::{Driver, Ready};
use crate::pool::Pool;

/// Borrowed socket descriptor. The driver owns and closes it.
struct Descriptor(RawFd);

impl AsRawFd for Descriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

struct Wait {
    token: Token,
    ready: Ready,
    fd: Option<AsyncFd<Descriptor>>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Wait {
    /// Poll every condition of this wait, returning the ones that hold.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Ready {
        let mut fired = Ready::EMPTY;

        if let Some(fd) = &self.fd {
            if self.ready.contains(Ready::READ) {
                match fd.poll_read_ready(cx) {
                    Poll::Ready(Ok(_guard)) => fired |= Ready::READ,
                    // let the driver discover the socket error
                    Poll::Ready(Err(_)) => fired |= Ready::READ,
                    Poll::Pending => {}
                }
            }
            if self.ready.contains(Ready::WRITE) {
                match fd.poll_write_ready(cx) {
                    Poll::Ready(Ok(_guard)) => fired |= Ready::WRITE,
                    Poll::Ready(Err(_)) => fired |= Ready::WRITE,
                    Poll::Pending => {}
                }
            }
        }

        if let Some(sleep) = self.sleep.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                fired |= Ready::TIMEOUT;
            }
        }

        fired
    }
}

#[derive(Default)]
struct Shared {
    next_id: u64,
    waits: HashMap<u64, Wait>,
    deferred: VecDeque<Token>,
    waker: Option<Waker>,
}

impl Shared {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

// ============================================================================
// Reactor Handle
// ============================================================================

/// Cloneable reactor handle.
#[derive(Clone)]
pub struct TokioReactor {
    shared: Rc<RefCell<Shared>>,
}

impl TokioReactor {
    /// Create a reactor and the event stream it reports to.
    pub fn new() -> (Self, Events) {
        let shared = Rc::new(RefCell::new(Shared::default()));
        (
            Self {
                shared: Rc::clone(&shared),
            },
            Events { shared },
        )
    }

    /// Number of waits that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        let shared = self.shared.borrow();
        shared.waits.len() + shared.deferred.len()
    }
}

impl std::fmt::Debug for TokioReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokioReactor")
    }
}

impl Reactor for TokioReactor {
    fn register(&self, token: Token, interest: Interest) -> io::Result<Registration> {
        let fd = match interest.fd {
            Some(fd) if interest.ready.wants_io() => {
                let tokio_interest = match (
                    interest.ready.contains(Ready::READ),
                    interest.ready.contains(Ready::WRITE),
                ) {
                    (true, true) => TokioInterest::READABLE | TokioInterest::WRITABLE,
                    (false, true) => TokioInterest::WRITABLE,
                    _ => TokioInterest::READABLE,
                };
                Some(AsyncFd::with_interest(Descriptor(fd), tokio_interest)?)
            }
            _ => None,
        };

        let wait = Wait {
            token,
            ready: interest.ready,
            fd,
            sleep: interest.timeout.map(|timeout| Box::pin(sleep(timeout))),
        };

        let mut shared = self.shared.borrow_mut();
        shared.next_id += 1;
        let id = shared.next_id;
        shared.waits.insert(id, wait);
        shared.wake();

        Ok(Registration::new(id))
    }

    fn deregister(&self, registration: Registration) {
        // dropping the AsyncFd removes the socket from the OS poller
        self.shared.borrow_mut().waits.remove(&registration.id());
    }

    fn defer(&self, token: Token) {
        let mut shared = self.shared.borrow_mut();
        shared.deferred.push_back(token);
        shared.wake();
    }
}

// ============================================================================
// Event Stream
// ============================================================================

/// Stream of fired waits, in the order they are observed.
pub struct Events {
    shared: Rc<RefCell<Shared>>,
}

impl Events {
    /// Poll for the next fired wait.
    pub fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<(Token, Ready)> {
        let mut shared = self.shared.borrow_mut();

        if let Some(token) = shared.deferred.pop_front() {
            return Poll::Ready((token, Ready::TIMEOUT));
        }

        let fired = shared.waits.iter_mut().find_map(|(id, wait)| {
            let ready = wait.poll_ready(cx);
            (!ready.is_empty()).then_some((*id, wait.token, ready))
        });

        if let Some((id, token, ready)) = fired {
            shared.waits.remove(&id);
            return Poll::Ready((token, ready));
        }

        shared.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Wait for the next fired wait.
    pub async fn next(&mut self) -> (Token, Ready) {
        poll_fn(|cx| self.poll_next(cx)).await
    }

    /// Whether any wait can still fire.
    pub fn has_pending(&self) -> bool {
        let shared = self.shared.borrow();
        !shared.waits.is_empty() || !shared.deferred.is_empty()
    }

    /// Route events into `pool` until no wait is left that could fire.
    pub async fn drive<D: Driver>(&mut self, pool: &mut Pool<D, TokioReactor>) {
        while self.has_pending() {
            let (token, ready) = self.next().await;
            pool.dispatch(token, ready);
        }
    }
}

impl std::fmt::Debug for Events {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Events")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn read_interest(fd: RawFd) -> Interest {
        Interest {
            fd: Some(fd),
            ready: Ready::READ,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_socket_readiness_fires_once() {
        let (reactor, mut events) = TokioReactor::new();
        let (ours, mut peer) = UnixStream::pair().unwrap();
        ours.set_nonblocking(true).unwrap();

        reactor.register(Token(7), read_interest(ours.as_raw_fd())).unwrap();
        assert_eq!(reactor.pending(), 1);

        peer.write_all(b"x").unwrap();

        let (token, ready) = events.next().await;
        assert_eq!(token, Token(7));
        assert!(ready.contains(Ready::READ));
        assert_eq!(reactor.pending(), 0);
    }

    #[tokio::test]
    async fn test_timeout_only_wait() {
        let (reactor, mut events) = TokioReactor::new();
        reactor
            .register(
                Token(3),
                Interest {
                    fd: None,
                    ready: Ready::TIMEOUT,
                    timeout: Some(Duration::from_millis(10)),
                },
            )
            .unwrap();

        let (token, ready) = events.next().await;
        assert_eq!(token, Token(3));
        assert_eq!(ready, Ready::TIMEOUT);
    }

    #[tokio::test]
    async fn test_deregister_cancels_wait() {
        let (reactor, mut events) = TokioReactor::new();
        let (ours, mut peer) = UnixStream::pair().unwrap();
        ours.set_nonblocking(true).unwrap();

        let registration = reactor.register(Token(1), read_interest(ours.as_raw_fd())).unwrap();
        reactor.deregister(registration);
        reactor.defer(Token(2));
        peer.write_all(b"x").unwrap();

        let (token, ready) = events.next().await;
        assert_eq!(token, Token(2));
        assert_eq!(ready, Ready::TIMEOUT);
        assert_eq!(reactor.pending(), 0);

        // the same socket can be watched again after deregistration
        reactor.register(Token(1), read_interest(ours.as_raw_fd())).unwrap();
        let (token, _) = events.next().await;
        assert_eq!(token, Token(1));
    }

    #[tokio::test]
    async fn test_deferred_events_come_first_in_order() {
        let (reactor, mut events) = TokioReactor::new();
        reactor.defer(Token(5));
        reactor.defer(Token(6));

        assert_eq!(events.next().await.0, Token(5));
        assert_eq!(events.next().await.0, Token(6));
    }
}
