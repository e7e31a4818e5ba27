//! # Rock-Paper-Scissors Server Library
//!
//! This library provides a line-oriented TCP server that pairs anonymous
//! clients into two-player Rock-Paper-Scissors matches and referees rounds
//! until one side wins, times out or disconnects.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! Arriving players meet in a single waiting slot. The first one parks there,
//! the next one takes it out and the two are paired into a session. The slot
//! is updated with compare-and-swap only, so concurrent arrivals never block
//! each other and every player is paired at most once.
//!
//! ### Refereeing
//! A match collects one move per player per round. A draw replays the round;
//! any other outcome ends the match and closes both connections. A player who
//! goes silent without having moved forfeits; a player who disconnects
//! forfeits.
//!
//! ### Connection Lifecycle
//! Every connection walks through nickname registration, waiting and playing.
//! Each state has its own read-idle timeout, re-armed on every received line.
//!
//! ## Architecture Design
//!
//! ### One Execution Context per Connection
//! Each connection gets a reader task, a writer task and a driver task. The
//! driver owns the connection's protocol state and handles everything posted
//! to the connection's mailbox one event at a time, so per-connection state
//! never needs a lock.
//!
//! ### Single-Owner Sessions
//! A session's mutable state lives in the driver of the connection that
//! created it. The other participant's moves, timeouts and disconnects are
//! posted to that driver, giving every match a single total order of events
//! without a mutex.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Shared connection handle: identity, open/closed flag, outbound queue,
//! mailbox and the idle timer.
//!
//! ### Player Module (`player`)
//! Registered participants and the per-connection protocol context.
//!
//! ### Matchmaker Module (`matchmaker`)
//! The lock-free single-slot rendezvous.
//!
//! ### Session Module (`session`)
//! Match handles and the owner-side match state.
//!
//! ### Handler Module (`handler`)
//! The per-connection protocol state machine.
//!
//! ### Network Module (`network`)
//! TCP listener, line framing and the reader, writer and driver tasks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rps_server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig {
//!         addr: "0.0.0.0:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     // Accepts clients until the task is dropped
//!     Server::bind(config).await?.run().await
//! }
//! ```

pub mod connection;
pub mod handler;
pub mod matchmaker;
pub mod network;
pub mod player;
pub mod session;
