//! Game vocabulary shared by the server and its tools: moves, outcomes,
//! the line protocol decoder and the wire texts.

use std::fmt;

pub mod messages;
pub mod protocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Parses a full word or its single-letter shorthand, ignoring case and
    /// surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Move> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ROCK" | "R" => Some(Move::Rock),
            "PAPER" | "P" => Some(Move::Paper),
            "SCISSORS" | "S" => Some(Move::Scissors),
            _ => None,
        }
    }

    /// The move this one defeats.
    pub fn beats(self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Paper => Move::Rock,
            Move::Scissors => Move::Paper,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Move::Rock => "ROCK",
            Move::Paper => "PAPER",
            Move::Scissors => "SCISSORS",
        };
        f.write_str(name)
    }
}

/// Result of a round from one side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Win,
    Lose,
    Draw,
}

impl Outcome {
    /// The same result seen from the opponent's side.
    pub fn mirror(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Lose,
            Outcome::Lose => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Win => "WIN",
            Outcome::Lose => "LOSE",
            Outcome::Draw => "DRAW",
        };
        f.write_str(name)
    }
}

/// Decides a round for `own` against `opponent`.
pub fn outcome(own: Move, opponent: Move) -> Outcome {
    if own == opponent {
        Outcome::Draw
    } else if own.beats() == opponent {
        Outcome::Win
    } else {
        Outcome::Lose
    }
}
