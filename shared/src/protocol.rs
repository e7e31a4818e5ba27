//! Line protocol decoder.
//!
//! Turns one raw client line into exactly one [`Command`]. Decoding is total:
//! anything that is not understood becomes [`Command::Invalid`] carrying the
//! text to send back, so the caller never deals with a parse error.
//!
//! Checks run in a fixed order: blank line, slash commands, then the
//! context-dependent part (nickname while one is expected, move otherwise).

use crate::messages;
use crate::Move;

pub const HELP_TOKEN: &str = "/help";
pub const QUIT_TOKEN: &str = "/quit";

pub const NICKNAME_MIN_LEN: usize = 3;
pub const NICKNAME_MAX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Help,
    Quit,
    Nickname(String),
    Move(Move),
    /// Unusable input; the payload is the reply for the client.
    Invalid(&'static str),
}

impl Command {
    pub fn parse(raw: &str, expecting_nickname: bool) -> Command {
        let line = raw.trim();
        if line.is_empty() {
            return Command::Empty;
        }

        if line.eq_ignore_ascii_case(HELP_TOKEN) {
            return Command::Help;
        }
        if line.eq_ignore_ascii_case(QUIT_TOKEN) {
            return Command::Quit;
        }

        if expecting_nickname {
            return if is_valid_nickname(line) {
                Command::Nickname(line.to_string())
            } else {
                Command::Invalid(messages::BAD_NICKNAME)
            };
        }

        match Move::parse(line) {
            Some(mv) => Command::Move(mv),
            None => Command::Invalid(messages::BAD_MOVE),
        }
    }
}

/// `[A-Za-z0-9_-]{3,16}`
pub fn is_valid_nickname(candidate: &str) -> bool {
    (NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&candidate.len())
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
