//! parleyd - matchmaking admission queue with turn-rotating chat sessions.
//!
//! Participants arrive under an opaque handle, receive a rotating class tag
//! and wait until the matcher can pair them with a complementary participant
//! or, past a wait threshold, with an automated counterpart. Matched groups
//! get a [`session::TurnSession`] that enforces strict single-speaker turns.
//!
//! [`lobby::Lobby`] is the entry point for an embedding request layer.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ids;
pub mod lobby;
pub mod match_index;
pub mod matcher;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod responder;
pub mod session;
pub mod store;
pub mod telemetry;

pub use error::{LobbyError, LobbyResult, SessionError};
pub use lobby::{Lobby, LobbyBuilder, LobbySettings, WithdrawOutcome};
