//! Single-slot rendezvous pairing waiting players into sessions
//!
//! The slot holds at most one waiting [`Player`]. Every arrival either parks
//! itself in the empty slot or takes the occupant out and becomes its
//! opponent. All transitions are compare-and-swap on the slot pointer, so the
//! matchmaker never locks and any number of connection tasks can call it at
//! once.
//!
//! An occupant whose connection has closed in the meantime is not swept by
//! anyone; the next caller that sees it clears it and retries.

use crate::player::Player;
use crate::session::MatchSession;
use arc_swap::ArcSwapOption;
use log::{debug, info};
use std::sync::Arc;

#[derive(Default)]
pub struct Matchmaker {
    waiting: ArcSwapOption<Player>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs `me` with the waiting player, or parks `me` in the slot.
    ///
    /// Returns the new session when a partner was taken out of the slot,
    /// `None` when `me` is now the one waiting (or is no longer active).
    pub fn try_match(&self, me: &Player) -> Option<MatchSession> {
        if !me.is_active() {
            debug!("Skipping matchmaking for inactive {}", me);
            return None;
        }

        let candidate = Arc::new(me.clone());

        loop {
            let current = self.waiting.load();

            let Some(other) = current.as_ref() else {
                let previous = self
                    .waiting
                    .compare_and_swap(&current, Some(Arc::clone(&candidate)));
                if previous.is_none() {
                    info!("{} is waiting for an opponent", me);
                    return None;
                }
                continue;
            };
            let other = Arc::clone(other);

            if *other == *me {
                debug!("{} is already waiting", me);
                return None;
            }

            if !other.is_active() {
                self.waiting.compare_and_swap(&current, None::<Arc<Player>>);
                debug!("Dropped stale waiting player {}", other);
                continue;
            }

            let previous = self.waiting.compare_and_swap(&current, None::<Arc<Player>>);
            if !holds(&previous, &other) {
                continue;
            }

            // The occupant may have disconnected between the read and the swap.
            if !other.is_active() {
                debug!("Waiting player {} closed while being taken", other);
                continue;
            }

            info!("Matched {} vs {}", other, me);
            return Some(MatchSession::new((*other).clone(), me.clone()));
        }
    }

    /// Takes `me` out of the slot if it is the one waiting there.
    pub fn remove_if_waiting(&self, me: &Player) -> bool {
        loop {
            let current = self.waiting.load();

            let occupant = match current.as_ref() {
                Some(occupant) if **occupant == *me => Arc::clone(occupant),
                _ => return false,
            };

            let previous = self.waiting.compare_and_swap(&current, None::<Arc<Player>>);
            if holds(&previous, &occupant) {
                info!("Removed {} from matchmaking", occupant);
                return true;
            }
        }
    }

    /// The player currently parked in the slot, if any.
    pub fn waiting(&self) -> Option<Player> {
        self.waiting.load_full().map(|player| (*player).clone())
    }
}

/// Whether a swap result still pointed at `expected`, i.e. the swap happened.
fn holds(previous: &Option<Arc<Player>>, expected: &Arc<Player>) -> bool {
    previous
        .as_ref()
        .map_or(false, |player| Arc::ptr_eq(player, expected))
}
