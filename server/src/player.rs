use crate::connection::{Connection, ConnectionId};
use crate::session::MatchSession;
use std::fmt;
use std::sync::Arc;

/// A registered participant: nickname plus the connection it speaks through.
///
/// Equality is connection identity. The nickname is only for display and logs;
/// two players with the same nickname on different connections are different
/// participants.
#[derive(Clone)]
pub struct Player {
    nickname: String,
    connection: Arc<Connection>,
}

impl Player {
    pub fn new(nickname: impl Into<String>, connection: Arc<Connection>) -> Self {
        Player {
            nickname: nickname.into(),
            connection,
        }
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn is_active(&self) -> bool {
        self.connection.is_active()
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Player {}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.nickname, self.id())
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.nickname, self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    AwaitingNickname,
    AwaitingMatch,
    InMatch,
}

/// Mutable per-connection state. Only the connection's own execution context
/// reads or writes it.
#[derive(Debug, Default)]
pub struct PlayerContext {
    pub nickname: Option<String>,
    pub state: ConnectionState,
    pub session: Option<MatchSession>,
}

impl PlayerContext {
    pub fn nickname(&self) -> &str {
        self.nickname.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Arc<Connection> {
        let (conn, _channels) = Connection::new("127.0.0.1:9000".parse().unwrap());
        conn
    }

    #[test]
    fn test_identity_is_connection_not_nickname() {
        let shared = connection();
        let a = Player::new("alice", Arc::clone(&shared));
        let renamed = Player::new("someone_else", Arc::clone(&shared));
        let twin = Player::new("alice", connection());

        assert_eq!(a, renamed);
        assert_ne!(a, twin);
    }

    #[test]
    fn test_player_accessors() {
        let conn = connection();
        let player = Player::new("bob", Arc::clone(&conn));
        assert_eq!(player.nickname(), "bob");
        assert_eq!(player.id(), conn.id());
        assert!(player.is_active());

        conn.close();
        assert!(!player.is_active());
        assert!(player.to_string().starts_with("bob("));
    }

    #[test]
    fn test_context_defaults() {
        let ctx = PlayerContext::default();
        assert_eq!(ctx.state, ConnectionState::AwaitingNickname);
        assert_eq!(ctx.nickname(), "");
        assert!(ctx.session.is_none());
    }
}
