//! Match sessions
//!
//! A session is split in two:
//! - [`MatchSession`] is the cheap, cloneable handle both participants keep.
//!   It knows the two players and which connection owns the match, and its
//!   operations post work to that owner's mailbox without ever blocking.
//! - [`SessionCore`] is the mutable match state (submitted moves, reminder
//!   flags, finished). It lives inside the owner connection's protocol handler
//!   and is only touched from that connection's execution context, so every
//!   move, idle timeout and disconnect for one match is applied in a single
//!   total order.
//!
//! The owner is the arriving player (`p2`), whose context created the
//! session. Operations it triggers itself are applied inline by its handler;
//! operations from `p1` travel through the owner's mailbox.

use crate::connection::{Connection, Event};
use crate::player::Player;
use log::{debug, info, warn};
use rps_shared::{messages, outcome, Move, Outcome};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub type SessionId = u64;

/// Operations applied to a session on its owner context
#[derive(Debug, Clone)]
pub enum SessionOp {
    Start,
    Submit { player: Player, mv: Move },
    Idle(Player),
    Disconnect(Player),
}

#[derive(Clone)]
pub struct MatchSession {
    inner: Arc<SessionInfo>,
}

struct SessionInfo {
    id: SessionId,
    p1: Player,
    p2: Player,
}

impl MatchSession {
    /// Pairs the waiting player `p1` with the arriving player `p2`.
    pub fn new(p1: Player, p2: Player) -> Self {
        let session = MatchSession {
            inner: Arc::new(SessionInfo {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                p1,
                p2,
            }),
        };
        info!("Session {} created: {}", session.id(), session.key());
        session
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn p1(&self) -> &Player {
        &self.inner.p1
    }

    pub fn p2(&self) -> &Player {
        &self.inner.p2
    }

    pub fn owner(&self) -> &Arc<Connection> {
        self.inner.p2.connection()
    }

    pub fn is_owned_by(&self, connection: &Connection) -> bool {
        self.owner().id() == connection.id()
    }

    pub fn is_participant(&self, player: &Player) -> bool {
        *player == self.inner.p1 || *player == self.inner.p2
    }

    pub fn opponent_of(&self, player: &Player) -> Option<&Player> {
        if *player == self.inner.p1 {
            Some(&self.inner.p2)
        } else if *player == self.inner.p2 {
            Some(&self.inner.p1)
        } else {
            None
        }
    }

    pub fn start(&self) -> bool {
        self.dispatch(SessionOp::Start)
    }

    pub fn submit_move(&self, player: &Player, mv: Move) -> bool {
        self.dispatch(SessionOp::Submit {
            player: player.clone(),
            mv,
        })
    }

    pub fn on_idle(&self, player: &Player) -> bool {
        self.dispatch(SessionOp::Idle(player.clone()))
    }

    pub fn on_disconnect(&self, leaver: &Player) -> bool {
        self.dispatch(SessionOp::Disconnect(leaver.clone()))
    }

    /// Posts an operation to the owner context. Returns false if the owner
    /// no longer accepts work, which only happens after it finished the match.
    pub fn dispatch(&self, op: SessionOp) -> bool {
        match self.owner().post(Event::Session(self.clone(), op)) {
            Ok(()) => true,
            Err(rejected) => {
                debug!(
                    "Session {} owner gone, dropping {:?}",
                    self.id(),
                    rejected
                );
                false
            }
        }
    }

    fn key(&self) -> String {
        format!("p1={} p2={}", self.inner.p1, self.inner.p2)
    }
}

impl fmt::Debug for MatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchSession")
            .field("id", &self.inner.id)
            .field("p1", &self.inner.p1)
            .field("p2", &self.inner.p2)
            .finish()
    }
}

/// Mutable match state, owned by the owner connection's handler.
pub struct SessionCore {
    session: MatchSession,
    moves: [Option<Move>; 2],
    reminded: [bool; 2],
    finished: bool,
}

impl SessionCore {
    pub fn new(session: MatchSession) -> Self {
        SessionCore {
            session,
            moves: [None, None],
            reminded: [false, false],
            finished: false,
        }
    }

    pub fn session(&self) -> &MatchSession {
        &self.session
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn submitted(&self, player: &Player) -> Option<Move> {
        self.seat_of(player).and_then(|seat| self.moves[seat])
    }

    pub fn apply(&mut self, op: SessionOp) {
        match op {
            SessionOp::Start => self.start(),
            SessionOp::Submit { player, mv } => self.submit_move(&player, mv),
            SessionOp::Idle(player) => self.on_idle(&player),
            SessionOp::Disconnect(leaver) => self.on_disconnect(&leaver),
        }
    }

    pub fn start(&mut self) {
        if self.finished {
            debug!("Session {} start ignored, already finished", self.session.id());
            return;
        }

        info!("Session {} started", self.session.id());
        let p1 = self.session.p1().nickname().to_string();
        let p2 = self.session.p2().nickname().to_string();
        self.send(0, messages::opponent_found(&p2));
        self.send(1, messages::opponent_found(&p1));
    }

    pub fn submit_move(&mut self, player: &Player, mv: Move) {
        if self.finished {
            debug!("Move from {} ignored, session finished", player);
            return;
        }
        let Some(seat) = self.seat_of(player) else {
            warn!(
                "Session {} got a move from non-participant {}",
                self.session.id(),
                player
            );
            return;
        };
        let other = 1 - seat;

        if let Some(existing) = self.moves[seat] {
            debug!(
                "Duplicate move from {}: kept {}, ignored {}",
                player, existing, mv
            );
            self.send(seat, messages::ALREADY_MOVED);
            return;
        }

        self.moves[seat] = Some(mv);
        debug!("Move accepted from {}: {}", player, mv);

        let (m1, m2) = match (self.moves[0], self.moves[1]) {
            (Some(m1), Some(m2)) => (m1, m2),
            _ => {
                if !self.reminded[other] {
                    self.reminded[other] = true;
                    self.send(other, messages::YOUR_TURN);
                }
                self.send(seat, messages::WAITING_FOR_MOVE);
                return;
            }
        };

        let o1 = outcome(m1, m2);
        let o2 = o1.mirror();

        if o1 == Outcome::Draw {
            self.reset_round();
            info!("Session {} round draw: both chose {}", self.session.id(), m1);
            self.send(0, messages::draw(m1, m2));
            self.send(1, messages::draw(m2, m1));
            return;
        }

        info!(
            "Session {} round finished: p1 {} ({}) vs p2 {} ({})",
            self.session.id(),
            m1,
            o1,
            m2,
            o2
        );
        self.send(0, messages::result(m1, m2, o1));
        self.send(1, messages::result(m2, m1, o2));
        self.finish("result");
    }

    /// An idle participant forfeits, unless it already moved this round and
    /// is just waiting for the opponent.
    pub fn on_idle(&mut self, player: &Player) {
        if self.finished {
            debug!("Idle from {} ignored, session finished", player);
            return;
        }
        let Some(seat) = self.seat_of(player) else {
            warn!(
                "Session {} got idle from non-participant {}",
                self.session.id(),
                player
            );
            return;
        };

        if self.moves[seat].is_some() {
            debug!("Idle from {} ignored, already moved", player);
            return;
        }

        info!(
            "Session {}: {} timed out, {} wins",
            self.session.id(),
            player,
            self.seat(1 - seat)
        );
        self.send(seat, messages::TIMEOUT_LOSS);
        self.send(1 - seat, messages::OPPONENT_TIMEOUT_WIN);
        self.finish("idle_timeout");
    }

    pub fn on_disconnect(&mut self, leaver: &Player) {
        if self.finished {
            debug!("Disconnect of {} ignored, session finished", leaver);
            return;
        }
        let Some(seat) = self.seat_of(leaver) else {
            warn!(
                "Session {} got disconnect from non-participant {}",
                self.session.id(),
                leaver
            );
            return;
        };

        let winner = self.seat(1 - seat).clone();
        info!(
            "Session {}: {} disconnected, {} wins",
            self.session.id(),
            leaver,
            winner
        );

        if winner.is_active() {
            self.send(1 - seat, messages::OPPONENT_DISCONNECTED_WIN);
        }
        self.finish("disconnect");
    }

    /// Marks the session finished and closes both connections. Only the first
    /// call has any effect; notices are sent by the caller beforehand.
    fn finish(&mut self, reason: &str) {
        if self.finished {
            return;
        }
        self.finished = true;

        info!(
            "Session {} finished ({}): {}",
            self.session.id(),
            reason,
            self.session.key()
        );

        self.session.p1().connection().close();
        self.session.p2().connection().close();
    }

    fn reset_round(&mut self) {
        self.moves = [None, None];
        self.reminded = [false, false];
    }

    fn seat_of(&self, player: &Player) -> Option<usize> {
        if *player == *self.session.p1() {
            Some(0)
        } else if *player == *self.session.p2() {
            Some(1)
        } else {
            None
        }
    }

    fn seat(&self, seat: usize) -> &Player {
        if seat == 0 {
            self.session.p1()
        } else {
            self.session.p2()
        }
    }

    fn send(&self, seat: usize, text: impl Into<String>) {
        let player = self.seat(seat);
        if player.is_active() {
            player.connection().send(text);
        } else {
            debug!(
                "Session {}: skipped send to inactive {}",
                self.session.id(),
                player
            );
        }
    }
}
