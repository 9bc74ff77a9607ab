//! Matchmaking service - manages queue, match creation and player routing

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::engine::JoinRejected;
use crate::game::{
    GameMatch, GameSettings, MatchCommand, MatchContext, MatchHandle, MatchKind, MatchRegistry,
    PlayerInput, RosterEntry,
};

use super::queue::{MatchmakingQueue, QueuedPlayer};

const ASSIGNMENT_CAPACITY: usize = 4;
const QUEUE_POLL_MS: u64 = 500;

/// Matchmaking failures, reported back to the client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchmakingError {
    #[error("already in a match")]
    AlreadyInMatch,
    #[error("already queued")]
    AlreadyQueued,
    #[error("a match needs at least one player")]
    EmptyRoster,
    #[error("roster exceeds match capacity of {capacity}")]
    RosterTooLarge { capacity: usize },
    #[error("not in a match")]
    UnknownMatch,
    #[error("match is closed")]
    MatchClosed,
}

impl MatchmakingError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInMatch => "already_in_match",
            Self::AlreadyQueued => "already_queued",
            Self::EmptyRoster => "empty_roster",
            Self::RosterTooLarge { .. } => "roster_too_large",
            Self::UnknownMatch => "unknown_match",
            Self::MatchClosed => "match_closed",
        }
    }
}

/// Result of asking to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Waiting for enough players
    Queued { position: usize, queue_size: usize },
    /// Seated straight into a running public match
    Joined { match_id: Uuid },
}

/// Player connection handle for routing match assignments
#[derive(Clone)]
pub struct PlayerConnection {
    pub user_id: Uuid,
    pub display_name: String,
    /// Matches this player was placed into
    pub assign_tx: mpsc::Sender<MatchHandle>,
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: Mutex<MatchmakingQueue>,
    registry: Arc<MatchRegistry>,
    settings: GameSettings,
    /// Connected players awaiting or in matches
    players: DashMap<Uuid, PlayerConnection>,
    /// Map of player -> current match, kept across disconnects for reconnects
    player_matches: Arc<DashMap<Uuid, Uuid>>,
}

impl MatchmakingService {
    pub fn new(
        registry: Arc<MatchRegistry>,
        settings: GameSettings,
        min_players: usize,
        max_wait_secs: u64,
    ) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new(
                min_players,
                settings.capacity,
                max_wait_secs,
            )),
            registry,
            settings,
            players: DashMap::new(),
            player_matches: Arc::new(DashMap::new()),
        }
    }

    /// Register a player connection (called when WebSocket connects).
    /// Returns the channel on which match assignments arrive; a player that
    /// is still seated in a running match gets that match right away.
    pub fn register_player(&self, user_id: Uuid, display_name: String) -> mpsc::Receiver<MatchHandle> {
        let (assign_tx, assign_rx) = mpsc::channel(ASSIGNMENT_CAPACITY);

        if let Some(handle) = self.current_match(&user_id) {
            info!(user_id = %user_id, match_id = %handle.id, "Reconnecting player to match");
            let _ = assign_tx.try_send(handle);
        }

        self.players.insert(
            user_id,
            PlayerConnection {
                user_id,
                display_name,
                assign_tx,
            },
        );
        assign_rx
    }

    /// Unregister a player (called when WebSocket disconnects)
    pub async fn unregister_player(&self, user_id: Uuid) {
        self.players.remove(&user_id);
        self.queue.lock().await.dequeue(user_id);

        if let Some(handle) = self.current_match(&user_id) {
            if handle.send(MatchCommand::Disconnect { user_id }).await.is_err() {
                self.player_matches.remove(&user_id);
            }
        }

        info!(user_id = %user_id, "Player unregistered from matchmaking");
    }

    /// Ask to play: late-join a running public match, or wait in the queue
    pub async fn join_queue(&self, user_id: Uuid) -> Result<QueueOutcome, MatchmakingError> {
        if self.current_match(&user_id).is_some() {
            return Err(MatchmakingError::AlreadyInMatch);
        }
        let display_name = self
            .players
            .get(&user_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| default_display_name(user_id));

        let mut queue = self.queue.lock().await;
        if queue.contains(&user_id) {
            return Err(MatchmakingError::AlreadyQueued);
        }

        if let Some(handle) = self.registry.find_joinable() {
            match self.late_join(&handle, user_id, display_name.clone()).await {
                Ok(()) => return Ok(QueueOutcome::Joined { match_id: handle.id }),
                Err(e) => warn!(user_id = %user_id, match_id = %handle.id, error = %e, "Late join failed, queueing"),
            }
        }

        let position = queue.enqueue(QueuedPlayer::new(user_id, display_name));
        info!(user_id = %user_id, queue_size = queue.len(), "Player joined matchmaking queue");

        Ok(QueueOutcome::Queued {
            position,
            queue_size: queue.len(),
        })
    }

    async fn late_join(
        &self,
        handle: &MatchHandle,
        user_id: Uuid,
        display_name: String,
    ) -> Result<(), MatchmakingError> {
        let (reply, answer) = oneshot::channel();
        handle
            .send(MatchCommand::Join {
                user_id,
                display_name,
                reply,
            })
            .await
            .map_err(|_| MatchmakingError::MatchClosed)?;

        match answer.await {
            Ok(Ok(())) => {
                self.seat(user_id, handle);
                Ok(())
            }
            Ok(Err(JoinRejected::AlreadyPresent)) => Err(MatchmakingError::AlreadyInMatch),
            Ok(Err(_)) | Err(_) => Err(MatchmakingError::MatchClosed),
        }
    }

    /// Leave the queue, or the current match for good
    pub async fn leave(&self, user_id: Uuid) {
        if self.queue.lock().await.dequeue(user_id).is_some() {
            info!(user_id = %user_id, "Player left matchmaking queue");
            return;
        }

        if let Some((_, match_id)) = self.player_matches.remove(&user_id) {
            if let Some(handle) = self.registry.get(&match_id) {
                let _ = handle.send(MatchCommand::Leave { user_id }).await;
            }
        }
    }

    /// Forward a client message to the player's match
    pub async fn route_input(&self, input: PlayerInput) -> Result<(), MatchmakingError> {
        let handle = self
            .current_match(&input.user_id)
            .ok_or(MatchmakingError::UnknownMatch)?;
        handle
            .send(MatchCommand::Client(input))
            .await
            .map_err(|_| MatchmakingError::MatchClosed)
    }

    /// Human-only match for a fixed roster
    pub fn create_private_match(&self, roster: Vec<RosterEntry>) -> Result<MatchHandle, MatchmakingError> {
        if roster.is_empty() {
            return Err(MatchmakingError::EmptyRoster);
        }
        if roster.len() > self.settings.capacity {
            return Err(MatchmakingError::RosterTooLarge {
                capacity: self.settings.capacity,
            });
        }
        if roster.iter().any(|p| self.current_match(&p.user_id).is_some()) {
            return Err(MatchmakingError::AlreadyInMatch);
        }
        Ok(self.start_match(MatchKind::Private, roster))
    }

    /// Build, register and spawn a match, then route its players to it
    fn start_match(&self, kind: MatchKind, roster: Vec<RosterEntry>) -> MatchHandle {
        let match_id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let player_ids: Vec<Uuid> = roster.iter().map(|p| p.user_id).collect();

        let (game_match, handle) = GameMatch::new(MatchContext {
            match_id,
            seed,
            kind,
            roster,
            settings: self.settings.clone(),
        });

        // Register match
        self.registry.insert(handle.clone());

        info!(
            match_id = %match_id,
            kind = ?kind,
            player_count = player_ids.len(),
            "Created new match"
        );

        // Spawn match task
        let registry = self.registry.clone();
        let player_matches = self.player_matches.clone();
        tokio::spawn(async move {
            game_match.run().await;

            // Cleanup after match ends
            registry.remove(&match_id);
            player_matches.retain(|_, current| *current != match_id);

            info!(match_id = %match_id, "Match removed from registry");
        });

        for user_id in player_ids {
            self.seat(user_id, &handle);
        }

        handle
    }

    /// Record the player's match and hand it to their session if connected
    fn seat(&self, user_id: Uuid, handle: &MatchHandle) {
        self.player_matches.insert(user_id, handle.id);
        if let Some(conn) = self.players.get(&user_id) {
            if conn.assign_tx.try_send(handle.clone()).is_err() {
                warn!(user_id = %user_id, match_id = %handle.id, "Failed to notify player of match");
            }
        }
    }

    /// Run one pass over the queue
    pub async fn process_queue(&self) -> Option<MatchHandle> {
        // Get connected player IDs
        let connected_ids: HashSet<Uuid> = self.players.iter().map(|entry| *entry.key()).collect();

        let players = self.queue.lock().await.try_form_match(&connected_ids)?;
        let roster = players.into_iter().map(RosterEntry::from).collect();
        Some(self.start_match(MatchKind::Public, roster))
    }

    /// Run the matchmaking service (periodic queue processing)
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(QUEUE_POLL_MS));

        loop {
            interval.tick().await;
            self.process_queue().await;
        }
    }

    /// Get current queue size
    pub async fn queue_size(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// The match a player is seated in, if it is still registered
    pub fn current_match(&self, user_id: &Uuid) -> Option<MatchHandle> {
        let match_id = *self.player_matches.get(user_id)?;
        self.registry.get(&match_id)
    }
}

pub fn default_display_name(user_id: Uuid) -> String {
    format!("Player_{}", &user_id.simple().to_string()[..8])
}
