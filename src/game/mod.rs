//! Game simulation modules

pub mod agent;
pub mod bots;
pub mod effects;
pub mod engine;
pub mod grid;
pub mod infection;
pub mod items;
pub mod r#match;
pub mod snapshot;
pub mod state;
pub mod stats;

pub use engine::{GameSettings, MatchContext, MatchKind, MatchPhase, RosterEntry};
pub use r#match::{GameMatch, MatchCommand, MatchHandle, MatchRegistry, MatchStatus};

use rand::Rng;
use uuid::Uuid;

use crate::ws::protocol::ClientMsg;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub user_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}

/// Random v4 id drawn from the match PRNG, so a seed replays the same ids
pub fn random_id<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}
