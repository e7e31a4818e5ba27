//! Transport abstraction for a single client connection
//!
//! A [`Connection`] is the shared handle every other component holds: it has a
//! stable identity, knows whether the socket is still open, accepts outbound
//! text and owns the sending side of the connection's mailbox. The mailbox is
//! the connection's execution context: one driver task drains it in order, so
//! anything posted there runs serialized with the connection's own input.
//!
//! The socket itself is handled by the reader/writer tasks in `network`; this
//! module only sees decoded lines and text to write.

use crate::session::{MatchSession, SessionOp};
use log::debug;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity. Participants are compared by this,
/// never by nickname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Work for the writer task
#[derive(Debug)]
pub enum Outbound {
    Text(String),
    /// Flush what is queued, then shut the socket down.
    Close,
}

/// Everything that runs on a connection's execution context
#[derive(Debug)]
pub enum Event {
    /// A decoded line from the client, without its terminator.
    Line(String),
    /// The transport is gone; always the last event the reader posts.
    Closed,
    /// The matchmaker paired this (waiting) connection into a session.
    Paired(MatchSession),
    /// An operation for the session this connection owns.
    Session(MatchSession, SessionOp),
}

pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    closed: watch::Sender<bool>,
    outbound: mpsc::UnboundedSender<Outbound>,
    mailbox: mpsc::UnboundedSender<Event>,
}

/// Receiving ends handed to the writer and driver tasks.
pub struct ConnectionChannels {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub mailbox: mpsc::UnboundedReceiver<Event>,
}

impl Connection {
    pub fn new(peer: SocketAddr) -> (Arc<Self>, ConnectionChannels) {
        let (closed, _) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();

        let connection = Arc::new(Connection {
            id: ConnectionId::next(),
            peer,
            closed,
            outbound: outbound_tx,
            mailbox: mailbox_tx,
        });

        let channels = ConnectionChannels {
            outbound: outbound_rx,
            mailbox: mailbox_rx,
        };

        (connection, channels)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_active(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Queues text for the client. Writes to a closed connection are dropped.
    pub fn send(&self, text: impl Into<String>) {
        if !self.is_active() {
            debug!("Dropping write to inactive connection {}", self.id);
            return;
        }
        // The writer only goes away after a close, which makes this a drop too.
        let _ = self.outbound.send(Outbound::Text(text.into()));
    }

    /// Closes the connection after everything already queued is flushed.
    ///
    /// Safe to call any number of times from any thread; returns true only
    /// for the call that actually closed it.
    pub fn close(&self) -> bool {
        let first = self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });

        if first {
            debug!("Closing connection {}", self.id);
            let _ = self.outbound.send(Outbound::Close);
        }
        first
    }

    /// Resolves once the connection has been closed by either side.
    pub async fn closed(&self) {
        let mut watcher = self.closed.subscribe();
        while !*watcher.borrow_and_update() {
            if watcher.changed().await.is_err() {
                return;
            }
        }
    }

    /// Hands an event to this connection's execution context.
    ///
    /// Fails, returning the event, once the driver has stopped accepting work.
    pub fn post(&self, event: Event) -> Result<(), Event> {
        self.mailbox.send(event).map_err(|rejected| rejected.0)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Read-idle timer for one connection.
///
/// Armed with a duration, it yields a single deadline; [`IdleTimer::fire`]
/// consumes the arming so a timeout is delivered at most once until the timer
/// is armed again. Re-arming always replaces the previous deadline.
#[derive(Debug, Default)]
pub struct IdleTimer {
    duration: Option<Duration>,
    deadline: Option<Instant>,
}

impl IdleTimer {
    pub fn arm(&mut self, after: Duration) {
        self.duration = Some(after);
        self.deadline = Some(Instant::now() + after);
    }

    /// Restarts the countdown with the last armed duration (input activity).
    pub fn rearm(&mut self) {
        if let Some(after) = self.duration {
            self.arm(after);
        }
    }

    pub fn disarm(&mut self) {
        self.duration = None;
        self.deadline = None;
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn fire(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_peer() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn drain_texts(channels: &mut ConnectionChannels) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(message) = channels.outbound.try_recv() {
            if let Outbound::Text(text) = message {
                texts.push(text);
            }
        }
        texts
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (a, _ca) = Connection::new(test_peer());
        let (b, _cb) = Connection::new(test_peer());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.peer(), test_peer());
    }

    #[test]
    fn test_send_while_active() {
        let (conn, mut channels) = Connection::new(test_peer());
        assert!(conn.is_active());

        conn.send("hello\r\n");
        assert_eq!(drain_texts(&mut channels), vec!["hello\r\n".to_string()]);
    }

    #[test]
    fn test_close_is_idempotent_and_queues_single_close() {
        let (conn, mut channels) = Connection::new(test_peer());

        conn.send("last words\r\n");
        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.is_active());

        assert!(matches!(channels.outbound.try_recv(), Ok(Outbound::Text(_))));
        assert!(matches!(channels.outbound.try_recv(), Ok(Outbound::Close)));
        assert!(channels.outbound.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (conn, mut channels) = Connection::new(test_peer());
        conn.close();
        conn.send("too late\r\n");
        assert!(drain_texts(&mut channels).is_empty());
    }

    #[test]
    fn test_post_fails_once_mailbox_is_closed() {
        let (conn, mut channels) = Connection::new(test_peer());

        assert!(conn.post(Event::Line("rock".into())).is_ok());
        channels.mailbox.close();

        match conn.post(Event::Closed) {
            Err(Event::Closed) => {}
            other => panic!("Expected rejected event, got {:?}", other),
        }

        // Events accepted before the close are still delivered.
        assert!(matches!(channels.mailbox.try_recv(), Ok(Event::Line(_))));
    }

    #[tokio::test]
    async fn test_closed_future_resolves_after_close() {
        let (conn, _channels) = Connection::new(test_peer());

        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.closed().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        conn.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("closed() did not resolve")
            .unwrap();

        // Already closed: resolves immediately.
        conn.closed().await;
    }

    #[test]
    fn test_idle_timer_fires_once_per_arming() {
        let mut timer = IdleTimer::default();
        assert!(!timer.fire());

        timer.arm(Duration::from_secs(180));
        assert!(timer.deadline().is_some());
        assert!(timer.fire());
        assert!(!timer.fire());
        assert_eq!(timer.duration(), Some(Duration::from_secs(180)));

        timer.rearm();
        assert!(timer.fire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_deadline_follows_paused_clock() {
        let start = Instant::now();
        let mut timer = IdleTimer::default();
        timer.arm(Duration::from_secs(180));
        assert_eq!(timer.deadline(), Some(start + Duration::from_secs(180)));

        tokio::time::advance(Duration::from_secs(60)).await;
        timer.rearm();
        assert_eq!(timer.deadline(), Some(start + Duration::from_secs(240)));
    }

    #[test]
    fn test_idle_timer_arm_replaces_previous() {
        let mut timer = IdleTimer::default();
        timer.arm(Duration::from_secs(180));
        let first = timer.deadline().unwrap();

        timer.arm(Duration::from_secs(1));
        let second = timer.deadline().unwrap();

        assert!(second < first);
        assert_eq!(timer.duration(), Some(Duration::from_secs(1)));

        timer.disarm();
        assert!(timer.deadline().is_none());
        timer.rearm();
        assert!(timer.deadline().is_none());
    }
}
