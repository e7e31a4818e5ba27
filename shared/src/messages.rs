//! Texts written to clients. Every line ends with `\r\n`.

use crate::{Move, Outcome};

macro_rules! logo {
    () => {
        concat!(
            r"  ____  ____  ____", "\r\n",
            r" |  _ \|  _ \/ ___|", "\r\n",
            r" | |_) | |_) \___ \", "\r\n",
            r" |  _ <|  __/ ___) |", "\r\n",
            r" |_| \_\_|   |____/", "\r\n",
        )
    };
}

pub const LOGO: &str = logo!();

pub const WELCOME: &str = concat!(
    logo!(),
    "\r\n",
    "Welcome to Rock-Paper-Scissors!\r\n",
    "\r\n",
    "Enter your nickname (or type /help):\r\n",
);

pub const HELP: &str = concat!(
    "Commands:\r\n",
    "  /help - show this message\r\n",
    "  /quit - disconnect\r\n",
    "\r\n",
    "Rules:\r\n",
    "  ROCK beats SCISSORS\r\n",
    "  SCISSORS beat PAPER\r\n",
    "  PAPER beats ROCK\r\n",
    "\r\n",
    "Gameplay:\r\n",
    "  Enter nickname (3-16 chars: A-Za-z0-9_-)\r\n",
    "  When matched, type: ROCK / PAPER / SCISSORS (or R / P / S)\r\n",
);

pub const EMPTY_INPUT: &str = "Empty input. Try again:\r\n";
pub const BAD_NICKNAME: &str = "Invalid nickname. Use 3-16 chars [A-Za-z0-9_-].\r\n";
pub const BAD_MOVE: &str = "Invalid move. Type ROCK/PAPER/SCISSORS.\r\n";
pub const STILL_WAITING: &str = "Still waiting for an opponent...\r\n";
pub const NO_ACTIVE_SESSION: &str = "No active session. Waiting for an opponent...\r\n";
pub const YOUR_TURN: &str = "Your turn. Type ROCK/PAPER/SCISSORS:\r\n";
pub const WAITING_FOR_MOVE: &str = "Waiting for opponent's move...\r\n";
pub const ALREADY_MOVED: &str = "You already made a move. Waiting for opponent...\r\n";

pub const TIMEOUT_NICKNAME: &str = "Timeout waiting for nickname. Bye!\r\n";
pub const TIMEOUT_WAITING: &str = "Timeout waiting for opponent. Bye!\r\n";
pub const TIMEOUT_LOSS: &str = "Timeout. You LOSE.\r\nGame over. Bye!\r\n";
pub const OPPONENT_TIMEOUT_WIN: &str = "Opponent timeout. You WIN!\r\nGame over. Bye!\r\n";
pub const OPPONENT_DISCONNECTED_WIN: &str = "Opponent disconnected. You WIN!\r\nGame over. Bye!\r\n";

pub const BYE: &str = "Bye!\r\n";

pub fn greeting(nickname: &str) -> String {
    format!("Hi, {}! Waiting for an opponent...\r\n", nickname)
}

pub fn opponent_found(opponent: &str) -> String {
    format!(
        "Opponent found: {}\r\nType ROCK/PAPER/SCISSORS:\r\n",
        opponent
    )
}

pub fn draw(own: Move, opponent: Move) -> String {
    format!(
        "Draw! You chose {}, opponent chose {}. Try again: ROCK/PAPER/SCISSORS\r\n",
        own, opponent
    )
}

pub fn result(own: Move, opponent: Move, outcome: Outcome) -> String {
    format!(
        "You chose {}, opponent chose {}. You {}!\r\nGame over. Bye!\r\n",
        own, opponent, outcome
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_constant_is_crlf_terminated() {
        let all = [
            LOGO,
            WELCOME,
            HELP,
            EMPTY_INPUT,
            BAD_NICKNAME,
            BAD_MOVE,
            STILL_WAITING,
            NO_ACTIVE_SESSION,
            YOUR_TURN,
            WAITING_FOR_MOVE,
            ALREADY_MOVED,
            TIMEOUT_NICKNAME,
            TIMEOUT_WAITING,
            TIMEOUT_LOSS,
            OPPONENT_TIMEOUT_WIN,
            OPPONENT_DISCONNECTED_WIN,
            BYE,
        ];

        for text in all {
            assert!(text.ends_with("\r\n"), "missing CRLF: {:?}", text);
            assert!(!text.replace("\r\n", "").contains('\n'), "bare LF: {:?}", text);
        }
    }

    #[test]
    fn test_welcome_starts_with_logo_and_ends_with_prompt() {
        assert!(WELCOME.starts_with(LOGO));
        assert!(WELCOME.ends_with("Enter your nickname (or type /help):\r\n"));
    }

    #[test]
    fn test_formatted_messages() {
        assert_eq!(greeting("alice"), "Hi, alice! Waiting for an opponent...\r\n");
        assert!(opponent_found("bob").starts_with("Opponent found: bob\r\n"));

        let d = draw(Move::Rock, Move::Rock);
        assert!(d.contains("Draw! You chose ROCK, opponent chose ROCK"));
        assert!(d.contains("Try again"));

        let r = result(Move::Paper, Move::Rock, Outcome::Win);
        assert!(r.contains("You chose PAPER, opponent chose ROCK. You WIN!"));
        assert!(r.ends_with("Game over. Bye!\r\n"));
    }
}
