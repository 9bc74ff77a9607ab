//! Matchmaking - queue, match creation and player routing

pub mod queue;
pub mod service;

pub use service::MatchmakingService;
