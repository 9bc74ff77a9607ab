//! Matchmaking queue implementation

use std::collections::{HashSet, VecDeque};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::game::RosterEntry;

/// Player in the matchmaking queue
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub user_id: Uuid,
    pub display_name: String,
    pub queued_at: Instant,
}

impl QueuedPlayer {
    pub fn new(user_id: Uuid, display_name: String) -> Self {
        Self {
            user_id,
            display_name,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

impl From<QueuedPlayer> for RosterEntry {
    fn from(player: QueuedPlayer) -> Self {
        RosterEntry {
            user_id: player.user_id,
            display_name: player.display_name,
        }
    }
}

/// The matchmaking queue
pub struct MatchmakingQueue {
    queue: VecDeque<QueuedPlayer>,
    /// Minimum players to start a match
    min_players: usize,
    /// Maximum humans per match
    max_players: usize,
    /// Max time to wait before starting with fewer players
    max_wait_time: Duration,
}

impl MatchmakingQueue {
    pub fn new(min_players: usize, max_players: usize, max_wait_secs: u64) -> Self {
        Self {
            queue: VecDeque::new(),
            min_players: min_players.max(1),
            max_players: max_players.max(1),
            max_wait_time: Duration::from_secs(max_wait_secs),
        }
    }

    /// Add a player to the back of the queue. Returns the 1-based position.
    pub fn enqueue(&mut self, player: QueuedPlayer) -> usize {
        // Remove if already in queue (rejoin)
        self.queue.retain(|p| p.user_id != player.user_id);
        self.queue.push_back(player);
        self.queue.len()
    }

    /// Remove a player from the queue
    pub fn dequeue(&mut self, user_id: Uuid) -> Option<QueuedPlayer> {
        let pos = self.queue.iter().position(|p| p.user_id == user_id)?;
        self.queue.remove(pos)
    }

    /// Check if a player is in the queue
    pub fn contains(&self, user_id: &Uuid) -> bool {
        self.queue.iter().any(|p| &p.user_id == user_id)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Try to form a match from queued players that are still connected.
    /// Returns players to be put in a match, or None if not enough.
    pub fn try_form_match(&mut self, connected: &HashSet<Uuid>) -> Option<Vec<QueuedPlayer>> {
        // Drop anyone whose socket went away
        self.queue.retain(|p| connected.contains(&p.user_id));

        if self.queue.len() >= self.min_players {
            // Have enough players, form a full match
            let count = self.queue.len().min(self.max_players);
            return Some(self.queue.drain(..count).collect());
        }

        // Check if anyone has waited too long; bots fill the rest
        let oldest_wait = self.queue.front().map(|p| p.wait_time())?;
        if oldest_wait >= self.max_wait_time {
            return Some(self.queue.drain(..).collect());
        }

        None
    }
}

impl Default for MatchmakingQueue {
    fn default() -> Self {
        Self::new(2, 10, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: u128) -> QueuedPlayer {
        QueuedPlayer::new(Uuid::from_u128(n), format!("P{}", n))
    }

    fn everyone(ids: &[u128]) -> HashSet<Uuid> {
        ids.iter().map(|n| Uuid::from_u128(*n)).collect()
    }

    #[test]
    fn requeue_moves_player_to_the_back() {
        let mut queue = MatchmakingQueue::default();
        assert_eq!(queue.enqueue(player(1)), 1);
        assert_eq!(queue.enqueue(player(2)), 2);
        assert_eq!(queue.enqueue(player(1)), 2);
        assert_eq!(queue.len(), 2);
        assert!(queue.dequeue(Uuid::from_u128(2)).is_some());
        assert!(queue.dequeue(Uuid::from_u128(2)).is_none());
    }

    #[test]
    fn forms_match_once_minimum_is_reached() {
        let mut queue = MatchmakingQueue::new(2, 3, 60);
        queue.enqueue(player(1));
        assert!(queue.try_form_match(&everyone(&[1])).is_none());

        for n in 2..=4 {
            queue.enqueue(player(n));
        }
        let formed = queue
            .try_form_match(&everyone(&[1, 2, 3, 4]))
            .expect("enough players");
        let ids: Vec<u128> = formed.iter().map(|p| p.user_id.as_u128()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn disconnected_players_are_dropped() {
        let mut queue = MatchmakingQueue::new(2, 10, 60);
        queue.enqueue(player(1));
        queue.enqueue(player(2));
        assert!(queue.try_form_match(&everyone(&[2])).is_none());
        assert!(!queue.contains(&Uuid::from_u128(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_player_waits_out_max_wait() {
        let mut queue = MatchmakingQueue::new(4, 10, 20);
        queue.enqueue(player(1));
        queue.enqueue(player(2));

        tokio::time::advance(Duration::from_secs(19)).await;
        assert!(queue.try_form_match(&everyone(&[1, 2])).is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        let formed = queue
            .try_form_match(&everyone(&[1, 2]))
            .expect("max wait reached");
        assert_eq!(formed.len(), 2);
    }

    #[test]
    fn long_wait_starts_short_handed() {
        let mut queue = MatchmakingQueue::new(4, 10, 0);
        queue.enqueue(player(1));
        let formed = queue.try_form_match(&everyone(&[1])).expect("waited long enough");
        assert_eq!(formed.len(), 1);
        assert!(queue.is_empty());
    }
}
