//! Match task, handles and registry - the async side of the tick scheduler

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{MatchClock, Timer};
use crate::ws::protocol::{ClientMsg, PlayerInfo, ServerMsg};

use super::engine::{
    JoinRejected, MatchContext, MatchEngine, MatchKind, MatchPhase, TickOutcome,
};
use super::snapshot::SnapshotBuilder;
use super::stats::{EndReason, MatchResult};
use super::PlayerInput;

const COMMAND_CAPACITY: usize = 256;
const BROADCAST_CAPACITY: usize = 256;

/// Everything a match task accepts from the outside
#[derive(Debug)]
pub enum MatchCommand {
    /// Message from a player's socket
    Client(PlayerInput),
    /// Late join into a running match
    Join {
        user_id: Uuid,
        display_name: String,
        reply: oneshot::Sender<Result<(), JoinRejected>>,
    },
    /// A session (re)attached; answered with a fresh role briefing
    Reconnect { user_id: Uuid },
    Disconnect { user_id: Uuid },
    Leave { user_id: Uuid },
    Stop,
}

/// The match task has exited
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("match is closed")]
pub struct MatchClosed;

/// Last published view of a match, for listings and join confirmations
#[derive(Debug, Clone, Serialize)]
pub struct MatchStatus {
    pub match_id: Uuid,
    pub kind: MatchKind,
    pub phase: MatchPhase,
    pub created_at: DateTime<Utc>,
    pub grid_size: i32,
    pub capacity: usize,
    pub tick: u64,
    pub humans: usize,
    pub bots: usize,
    pub survivors: usize,
    pub zombies: usize,
    pub remaining_ms: u64,
    pub players: Vec<PlayerInfo>,
}

impl MatchStatus {
    fn capture(engine: &MatchEngine, created_at: DateTime<Utc>, capacity: usize, now: u64) -> Self {
        let state = engine.state();
        Self {
            match_id: engine.id(),
            kind: engine.kind(),
            phase: engine.phase(),
            created_at,
            grid_size: state.grid_size,
            capacity,
            tick: state.tick,
            humans: state.human_count(),
            bots: engine.bots().len(),
            survivors: state.survivor_count(),
            zombies: state.zombie_count(),
            remaining_ms: state.remaining_ms(now),
            players: SnapshotBuilder::roster(state),
        }
    }

    /// Public, running and with a seat a human could take
    pub fn is_joinable(&self) -> bool {
        self.kind == MatchKind::Public
            && self.phase == MatchPhase::Running
            && self.humans < self.capacity
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub kind: MatchKind,
    commands: mpsc::Sender<MatchCommand>,
    events: broadcast::Sender<ServerMsg>,
    status: Arc<RwLock<MatchStatus>>,
}

impl MatchHandle {
    pub fn status(&self) -> MatchStatus {
        self.status.read().clone()
    }

    pub fn human_count(&self) -> usize {
        self.status.read().humans
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events.subscribe()
    }

    pub async fn send(&self, command: MatchCommand) -> Result<(), MatchClosed> {
        self.commands.send(command).await.map_err(|_| MatchClosed)
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().human_count())
            .sum()
    }

    /// Oldest first
    pub fn list(&self) -> Vec<MatchStatus> {
        let mut statuses: Vec<MatchStatus> = self
            .matches
            .iter()
            .map(|m| m.value().status())
            .collect();
        statuses.sort_by_key(|s| s.created_at);
        statuses
    }

    /// Ask every running match to stop; returns how many were signalled
    pub async fn stop_all(&self) -> usize {
        let handles: Vec<MatchHandle> = self.matches.iter().map(|m| m.value().clone()).collect();
        let mut stopped = 0;
        for handle in handles {
            if handle.send(MatchCommand::Stop).await.is_ok() {
                stopped += 1;
            }
        }
        stopped
    }

    /// Find a public match a late joiner can enter
    pub fn find_joinable(&self) -> Option<MatchHandle> {
        self.matches
            .iter()
            .filter(|m| m.value().status().is_joinable())
            .min_by_key(|m| m.value().status().created_at)
            .map(|m| m.value().clone())
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match
pub struct GameMatch {
    engine: MatchEngine,
    clock: MatchClock,
    tick_duration: Duration,
    capacity: usize,
    created_at: DateTime<Utc>,
    commands: mpsc::Receiver<MatchCommand>,
    events: broadcast::Sender<ServerMsg>,
    status: Arc<RwLock<MatchStatus>>,
}

impl GameMatch {
    /// Create a new match. Agents, bots and roles are set up here; the
    /// clock starts in [`run`](Self::run).
    pub fn new(context: MatchContext) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        let clock = MatchClock::start();
        let created_at = Utc::now();
        let capacity = context.settings.capacity;
        let engine = MatchEngine::initialize(&context, clock.now_ms());
        let status = Arc::new(RwLock::new(MatchStatus::capture(
            &engine,
            created_at,
            capacity,
            clock.now_ms(),
        )));

        let handle = MatchHandle {
            id: context.match_id,
            kind: context.kind,
            commands: command_tx,
            events: event_tx.clone(),
            status: status.clone(),
        };

        let game_match = Self {
            engine,
            clock,
            tick_duration: Duration::from_millis(context.settings.tick_ms.max(1)),
            capacity,
            created_at,
            commands: command_rx,
            events: event_tx,
            status,
        };

        (game_match, handle)
    }

    /// Start the match and run the tick loop until it ends
    pub async fn run(mut self) -> Option<MatchResult> {
        let match_id = self.engine.id();
        let now = self.clock.now_ms();
        for briefing in self.engine.start(now) {
            self.broadcast(briefing.into());
        }
        self.publish_status(now);

        info!(
            match_id = %match_id,
            tick_ms = self.tick_duration.as_millis() as u64,
            "Match started"
        );

        let mut ticker = interval(self.tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.run_tick() == TickOutcome::Ended {
                        break;
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            let now = self.clock.now_ms();
                            self.engine.stop(EndReason::Stopped, now);
                        }
                    }
                    if self.engine.is_stopped() {
                        break;
                    }
                }
            }
        }

        self.finish()
    }

    fn run_tick(&mut self) -> TickOutcome {
        let timer = Timer::new();
        let now = self.clock.now_ms();

        let outcome = self.engine.tick(now);
        if outcome == TickOutcome::Running {
            let events = self.engine.drain_events();
            let snapshot = SnapshotBuilder::build(&self.engine, now, events);
            self.broadcast(snapshot);
            self.publish_status(now);
        }

        let elapsed = timer.elapsed_ms();
        if elapsed > self.tick_duration.as_millis() as u64 {
            warn!(
                match_id = %self.engine.id(),
                tick = self.engine.state().tick,
                elapsed_ms = elapsed,
                "Slow tick"
            );
        }

        outcome
    }

    fn handle_command(&mut self, command: MatchCommand) {
        let now = self.clock.now_ms();
        let match_id = self.engine.id();

        match command {
            MatchCommand::Client(input) => match input.msg {
                ClientMsg::Move { direction } => {
                    match self.engine.submit_move(input.user_id, direction, now) {
                        Ok(position) => {
                            debug!(user_id = %input.user_id, x = position.x, y = position.y, "Moved");
                        }
                        Err(reason) => {
                            debug!(user_id = %input.user_id, reason = %reason, "Move rejected");
                        }
                    }
                }
                ClientMsg::LeaveMatch => self.leave(input.user_id, now),
                ClientMsg::JoinQueue | ClientMsg::Ping { .. } => {
                    debug!(user_id = %input.user_id, "Ignoring non-match message");
                }
            },
            MatchCommand::Join {
                user_id,
                display_name,
                reply,
            } => {
                let result = self.engine.join(user_id, display_name, now);
                match &result {
                    Ok(briefing) => {
                        self.broadcast(briefing.clone().into());
                        self.publish_status(now);
                    }
                    Err(e) => {
                        info!(match_id = %match_id, user_id = %user_id, error = %e, "Join refused");
                    }
                }
                let _ = reply.send(result.map(|_| ()));
            }
            MatchCommand::Reconnect { user_id } => match self.engine.reconnect(user_id) {
                Some(briefing) => {
                    info!(match_id = %match_id, user_id = %user_id, "Player attached");
                    self.broadcast(briefing.into());
                }
                None => {
                    warn!(match_id = %match_id, user_id = %user_id, "Reconnect for unknown player");
                }
            },
            MatchCommand::Disconnect { user_id } => {
                if self.engine.disconnect(user_id) {
                    info!(match_id = %match_id, user_id = %user_id, "Player disconnected");
                }
            }
            MatchCommand::Leave { user_id } => self.leave(user_id, now),
            MatchCommand::Stop => {
                info!(match_id = %match_id, "Stop requested");
                self.engine.stop(EndReason::Stopped, now);
            }
        }
    }

    fn leave(&mut self, user_id: Uuid, now: u64) {
        if self.engine.leave(user_id, now) {
            info!(
                match_id = %self.engine.id(),
                user_id = %user_id,
                humans = self.engine.state().human_count(),
                "Player left match"
            );
            self.publish_status(now);
        }
    }

    fn finish(mut self) -> Option<MatchResult> {
        let now = self.clock.now_ms();
        self.engine.stop(EndReason::Stopped, now);
        self.publish_status(now);

        // Events from the ending tick or command go out before MatchEnd
        let events = self.engine.drain_events();
        if !events.is_empty() {
            let snapshot = SnapshotBuilder::build(&self.engine, now, events);
            self.broadcast(snapshot);
        }

        let result = self.engine.result().cloned();
        if let Some(result) = &result {
            self.broadcast(ServerMsg::MatchEnd {
                outcome: result.reason,
                winner: result.winner.clone(),
                duration_ms: result.stats.duration_ms,
                stats: result.stats.clone(),
            });
        }

        self.engine.cleanup();
        info!(match_id = %self.engine.id(), "Match ended");
        result
    }

    fn broadcast(&self, msg: ServerMsg) {
        // no subscribers is fine
        let _ = self.events.send(msg);
    }

    fn publish_status(&self, now: u64) {
        *self.status.write() = MatchStatus::capture(&self.engine, self.created_at, self.capacity, now);
    }
}
