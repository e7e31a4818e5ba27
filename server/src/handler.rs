//! Per-connection protocol state machine
//!
//! One [`ProtocolHandler`] exists per connection and is driven exclusively by
//! that connection's driver task. It owns the connection's [`PlayerContext`]
//! and idle timer, decodes lines into commands, talks to the matchmaker and
//! forwards match events to the session owner. When this connection owns a
//! session, the handler also hosts its [`SessionCore`].
//!
//! ```text
//! AwaitingNickname --nickname--> AwaitingMatch --paired--> InMatch
//!        |                             |                      |
//!      idle/quit                 idle/quit/close        result/forfeit
//!        v                             v                      v
//!      closed                        closed                 closed
//! ```

use crate::connection::{Connection, Event, IdleTimer};
use crate::matchmaker::Matchmaker;
use crate::player::{ConnectionState, Player, PlayerContext};
use crate::session::{MatchSession, SessionCore, SessionOp};
use log::{debug, info, warn};
use rps_shared::messages;
use rps_shared::protocol::Command;
use rps_shared::Move;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Read-idle limits for each connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimeouts {
    pub nickname: Duration,
    pub waiting: Duration,
    pub in_match: Duration,
}

impl Default for IdleTimeouts {
    fn default() -> Self {
        Self {
            nickname: Duration::from_secs(180),
            waiting: Duration::from_secs(180),
            in_match: Duration::from_secs(120),
        }
    }
}

impl IdleTimeouts {
    pub fn for_state(&self, state: ConnectionState) -> Duration {
        match state {
            ConnectionState::AwaitingNickname => self.nickname,
            ConnectionState::AwaitingMatch => self.waiting,
            ConnectionState::InMatch => self.in_match,
        }
    }
}

pub struct ProtocolHandler {
    conn: Arc<Connection>,
    matchmaker: Arc<Matchmaker>,
    timeouts: IdleTimeouts,
    ctx: PlayerContext,
    idle: IdleTimer,
    hosted: Option<SessionCore>,
}

impl ProtocolHandler {
    pub fn new(conn: Arc<Connection>, matchmaker: Arc<Matchmaker>, timeouts: IdleTimeouts) -> Self {
        Self {
            conn,
            matchmaker,
            timeouts,
            ctx: PlayerContext::default(),
            idle: IdleTimer::default(),
            hosted: None,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn context(&self) -> &PlayerContext {
        &self.ctx
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle.deadline()
    }

    pub fn idle_duration(&self) -> Option<Duration> {
        self.idle.duration()
    }

    pub fn hosted_session(&self) -> Option<&SessionCore> {
        self.hosted.as_ref()
    }

    pub fn on_connect(&mut self) {
        info!("Client {} connected from {}", self.conn.id(), self.conn.peer());
        self.set_state(ConnectionState::AwaitingNickname);
        self.conn.send(messages::WELCOME);
    }

    /// Entry point for everything delivered through the connection's mailbox.
    pub fn on_event(&mut self, event: Event) {
        match event {
            Event::Line(line) => {
                if self.conn.is_active() {
                    self.on_line(&line);
                } else {
                    debug!("Ignoring line on closed connection {}", self.conn.id());
                }
            }
            Event::Paired(session) => self.on_paired(session),
            Event::Session(session, op) => self.apply_hosted(&session, op),
            Event::Closed => {}
        }
    }

    pub fn on_line(&mut self, raw: &str) {
        self.idle.rearm();

        let expecting_nickname = self.ctx.state == ConnectionState::AwaitingNickname;
        match Command::parse(raw, expecting_nickname) {
            Command::Empty => self.conn.send(messages::EMPTY_INPUT),
            Command::Help => self.conn.send(messages::HELP),
            Command::Quit => {
                info!("Client {} quit in state {:?}", self.conn.id(), self.ctx.state);
                self.conn.send(messages::BYE);
                self.conn.close();
            }
            Command::Invalid(reply) => {
                debug!(
                    "Invalid input from {} in state {:?}: {:?}",
                    self.conn.id(),
                    self.ctx.state,
                    raw
                );
                self.conn.send(reply);
            }
            Command::Nickname(nickname) => self.on_nickname(nickname),
            Command::Move(mv) => {
                if self.ctx.state != ConnectionState::InMatch {
                    debug!("Move from {} before pairing", self.conn.id());
                    self.conn.send(messages::STILL_WAITING);
                    return;
                }
                self.on_move(mv);
            }
        }
    }

    pub fn on_idle_timeout(&mut self) {
        if !self.idle.fire() {
            return;
        }

        let me = self.me();
        match self.ctx.state {
            ConnectionState::AwaitingNickname => {
                info!("Client {} timed out waiting for nickname", self.conn.id());
                self.conn.send(messages::TIMEOUT_NICKNAME);
                self.conn.close();
            }
            ConnectionState::AwaitingMatch => {
                info!("{} timed out waiting for an opponent", me);
                self.matchmaker.remove_if_waiting(&me);
                self.conn.send(messages::TIMEOUT_WAITING);
                self.conn.close();
            }
            ConnectionState::InMatch => match self.ctx.session.clone() {
                Some(session) => {
                    debug!("{} idle in session {}", me, session.id());
                    self.run_on_owner(&session, SessionOp::Idle(me));
                }
                None => self.fall_back_to_waiting("idle"),
            },
        }

        // A timeout that left the connection open keeps counting.
        if self.conn.is_active() && self.idle.deadline().is_none() {
            self.idle.rearm();
        }
    }

    /// The transport closed. Called once, after the last line was handled.
    pub fn on_disconnect(&mut self) {
        let me = self.me();
        info!(
            "Client {} disconnected ({:?}, nickname {:?})",
            self.conn.id(),
            self.ctx.state,
            self.ctx.nickname()
        );

        match self.ctx.state {
            ConnectionState::AwaitingNickname => {}
            ConnectionState::AwaitingMatch => {
                let removed = self.matchmaker.remove_if_waiting(&me);
                debug!("{} left matchmaking (removed: {})", me, removed);
            }
            ConnectionState::InMatch => {
                if let Some(session) = self.ctx.session.take() {
                    self.run_on_owner(&session, SessionOp::Disconnect(me));
                }
            }
        }
        self.idle.disarm();
    }

    /// This waiting connection was taken out of the slot by another arrival.
    pub fn on_paired(&mut self, session: MatchSession) {
        let me = self.me();
        if !self.conn.is_active() {
            info!("{} was paired after closing, forfeiting session {}", me, session.id());
            session.on_disconnect(&me);
            return;
        }
        if self.ctx.state != ConnectionState::AwaitingMatch {
            warn!(
                "{} paired into session {} while {:?}",
                me,
                session.id(),
                self.ctx.state
            );
        }
        self.attach(session);
    }

    fn on_nickname(&mut self, nickname: String) {
        info!("Client {} registered as {}", self.conn.id(), nickname);
        self.ctx.nickname = Some(nickname);
        self.set_state(ConnectionState::AwaitingMatch);
        self.conn.send(messages::greeting(self.ctx.nickname()));

        let me = self.me();
        match self.matchmaker.try_match(&me) {
            None => info!("{} queued for a match", me),
            Some(session) => self.begin_match(session, me),
        }
    }

    /// Called on the arriving side, which owns the new session.
    fn begin_match(&mut self, session: MatchSession, me: Player) {
        let Some(opponent) = session.opponent_of(&me).cloned() else {
            warn!("{} is not part of session {}", me, session.id());
            return;
        };
        info!("{} matched against {}", me, opponent);

        self.hosted = Some(SessionCore::new(session.clone()));
        self.attach(session.clone());

        // The opponent's context must attach before it can see the notice.
        let reachable = opponent.connection().post(Event::Paired(session.clone())).is_ok();
        self.run_on_owner(&session, SessionOp::Start);

        if !reachable {
            warn!("{} can no longer be reached, forfeiting", opponent);
            self.run_on_owner(&session, SessionOp::Disconnect(opponent));
        }
    }

    fn on_move(&mut self, mv: Move) {
        match self.ctx.session.clone() {
            Some(session) => {
                let me = self.me();
                self.run_on_owner(&session, SessionOp::Submit { player: me, mv });
            }
            None => self.fall_back_to_waiting("move"),
        }
    }

    fn attach(&mut self, session: MatchSession) {
        debug!("Client {} attached to session {}", self.conn.id(), session.id());
        self.ctx.session = Some(session);
        self.set_state(ConnectionState::InMatch);
    }

    fn fall_back_to_waiting(&mut self, trigger: &str) {
        warn!(
            "Client {} got {} in match without a session, back to waiting",
            self.conn.id(),
            trigger
        );
        self.set_state(ConnectionState::AwaitingMatch);
        self.conn.send(messages::NO_ACTIVE_SESSION);
    }

    /// Applies inline when this connection owns the session, otherwise hands
    /// the operation to the owner's mailbox.
    fn run_on_owner(&mut self, session: &MatchSession, op: SessionOp) {
        if session.is_owned_by(&self.conn) {
            self.apply_hosted(session, op);
        } else {
            session.dispatch(op);
        }
    }

    fn apply_hosted(&mut self, session: &MatchSession, op: SessionOp) {
        match self.hosted.as_mut() {
            Some(core) if core.session().id() == session.id() => core.apply(op),
            _ => warn!(
                "Client {} does not host session {}, dropping {:?}",
                self.conn.id(),
                session.id(),
                op
            ),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.ctx.state = state;
        let timeout = self.timeouts.for_state(state);
        self.idle.arm(timeout);
        debug!(
            "Client {} now {:?}, idle timeout {:?}",
            self.conn.id(),
            state,
            timeout
        );
    }

    fn me(&self) -> Player {
        Player::new(self.ctx.nickname(), Arc::clone(&self.conn))
    }
}
