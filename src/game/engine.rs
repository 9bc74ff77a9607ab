//! Match engine - the synchronous per-tick simulation pipeline
//!
//! [`MatchEngine`] owns everything one match needs: the agent map, bots,
//! items and effects, and the match PRNG. The async driver in
//! [`super::r#match`] calls [`MatchEngine::tick`] on a fixed interval and
//! [`MatchEngine::submit_move`] whenever a move arrives. Time is passed in
//! explicitly (milliseconds) so the engine can be driven deterministically.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::GameEvent;

use super::agent::{Agent, AgentId, Role};
use super::bots::BotController;
use super::grid::{random_free_cell, Direction, Position};
use super::infection::InfectionSystem;
use super::items::{ItemSettings, ItemSystem};
use super::state::MatchState;
use super::stats::{compute_statistics, AgentStat, EndReason, MatchResult};

/// Engine lifecycle. Never goes backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Idle,
    Running,
    Stopped,
}

/// Public matches fill empty seats with bots, private ones do not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Public,
    Private,
}

/// Tunables for one match
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub grid_size: i32,
    /// Seats, humans plus bots
    pub capacity: usize,
    pub zombie_ratio: f32,
    pub match_duration_ms: u64,
    pub infection_bonus_ms: u64,
    pub tick_ms: u64,
    pub items: ItemSettings,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            grid_size: 32,
            capacity: 10,
            zombie_ratio: 0.2,
            match_duration_ms: 180_000,
            infection_bonus_ms: 5_000,
            tick_ms: 100,
            items: ItemSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: Uuid,
    pub display_name: String,
}

/// Everything needed to initialize a match
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub match_id: Uuid,
    pub seed: u64,
    pub kind: MatchKind,
    pub roster: Vec<RosterEntry>,
    pub settings: GameSettings,
}

/// Per-player role briefing sent at match start and on (re)join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub agent_id: AgentId,
    pub role: Role,
    pub position: Position,
    pub survivors: usize,
    pub zombies: usize,
}

/// Why a move was ignored. Never surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveRejected {
    #[error("match is not running")]
    NotRunning,
    #[error("unknown agent")]
    UnknownAgent,
    #[error("agent is a bot")]
    NotControllable,
    #[error("agent is disconnected")]
    Disconnected,
    #[error("move cooldown has not elapsed")]
    OnCooldown,
    #[error("target cell is out of bounds")]
    OutOfBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejected {
    #[error("match has ended")]
    MatchEnded,
    #[error("player is already in the match")]
    AlreadyPresent,
    #[error("match is full")]
    MatchFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// `start` has not been called
    Idle,
    Running,
    /// This tick (or an earlier call) ended the match
    Ended,
}

/// Minimum one zombie, and at least one survivor when there are two agents or more
fn zombie_quota(total: usize, ratio: f32) -> usize {
    if total == 0 {
        return 0;
    }
    let wanted = (total as f32 * ratio).round() as usize;
    wanted.clamp(1, total.saturating_sub(1).max(1))
}

/// The authoritative simulation for one match
pub struct MatchEngine {
    id: Uuid,
    kind: MatchKind,
    settings: GameSettings,
    state: MatchState,
    bots: BotController,
    items: ItemSystem,
    rng: ChaCha8Rng,
    phase: MatchPhase,
    events: Vec<GameEvent>,
    result: Option<MatchResult>,
}

impl MatchEngine {
    /// Build agents, bots and roles. The match stays idle until [`start`](Self::start).
    pub fn initialize(context: &MatchContext, now: u64) -> Self {
        let settings = context.settings.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(context.seed);
        let mut state = MatchState::new(
            settings.grid_size,
            settings.match_duration_ms,
            settings.infection_bonus_ms,
            settings.tick_ms,
        );

        for entry in context.roster.iter().take(settings.capacity) {
            if state.agents.contains_key(&entry.user_id) {
                continue;
            }
            let position = random_free_cell(&state.occupied_cells(), settings.grid_size, &mut rng);
            state.agents.insert(
                entry.user_id,
                Agent::new(
                    entry.user_id,
                    entry.display_name.clone(),
                    false,
                    Role::Survivor,
                    position,
                    now,
                ),
            );
        }

        let mut bots = BotController::new();
        if context.kind == MatchKind::Public {
            let open_seats = settings.capacity.saturating_sub(state.agents.len());
            for _ in 0..open_seats {
                let position = random_free_cell(&state.occupied_cells(), settings.grid_size, &mut rng);
                bots.spawn_bot(Role::Survivor, position, now, &mut rng);
                bots.publish(&mut state.agents);
            }
        }

        let quota = zombie_quota(state.agents.len(), settings.zombie_ratio);
        let mut ids: Vec<AgentId> = state.agents.keys().copied().collect();
        ids.shuffle(&mut rng);
        for id in ids.into_iter().take(quota) {
            if let Some(agent) = state.agents.get_mut(&id) {
                agent.role = Role::Zombie;
            }
        }
        bots.absorb(&state.agents);

        info!(
            match_id = %context.match_id,
            humans = state.human_count(),
            bots = bots.len(),
            zombies = state.zombie_count(),
            "Match initialized"
        );

        Self {
            id: context.match_id,
            kind: context.kind,
            items: ItemSystem::new(settings.items),
            settings,
            state,
            bots,
            rng,
            phase: MatchPhase::Idle,
            events: Vec::new(),
            result: None,
        }
    }

    /// Idle -> Running. Returns the role briefing for every human.
    pub fn start(&mut self, now: u64) -> Vec<RoleAssignment> {
        if self.phase != MatchPhase::Idle {
            return Vec::new();
        }
        self.phase = MatchPhase::Running;
        self.state.started_at = Some(now);
        self.items.start(now, &mut self.rng);

        info!(match_id = %self.id, "Match running");

        self.state
            .agents
            .values()
            .filter(|a| !a.is_bot)
            .map(|a| a.id)
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|id| self.role_assignment(id))
            .collect()
    }

    pub fn role_assignment(&self, agent_id: AgentId) -> Option<RoleAssignment> {
        let agent = self.state.agents.get(&agent_id)?;
        Some(RoleAssignment {
            agent_id,
            role: agent.role,
            position: agent.position,
            survivors: self.state.survivor_count(),
            zombies: self.state.zombie_count(),
        })
    }

    /// Run one tick of the pipeline
    pub fn tick(&mut self, now: u64) -> TickOutcome {
        match self.phase {
            MatchPhase::Idle => return TickOutcome::Idle,
            MatchPhase::Stopped => return TickOutcome::Ended,
            MatchPhase::Running => {}
        }
        self.state.tick += 1;

        // Bots
        self.bots.update(&self.state, &self.items, &mut self.rng, now);
        self.bots.publish(&mut self.state.agents);

        // Items and effects
        self.items
            .update(&mut self.state, &mut self.rng, now, &mut self.events);

        // Collisions
        InfectionSystem::resolve(&mut self.state, &mut self.items.effects, now, &mut self.events);

        self.refresh_defensive_flags(now);
        self.bots.absorb(&self.state.agents);

        if self.state.survivor_count() == 0 {
            self.stop(EndReason::ZombiesWin, now);
            return TickOutcome::Ended;
        }

        if self.state.is_time_up(now) {
            self.stop(EndReason::Timeout, now);
            return TickOutcome::Ended;
        }

        TickOutcome::Running
    }

    fn refresh_defensive_flags(&mut self, now: u64) {
        for agent in self.state.agents.values_mut() {
            agent.has_defensive_item = self.items.effects.holds_defensive(agent.id, agent.role, now);
        }
    }

    /// Apply a human move immediately
    pub fn submit_move(
        &mut self,
        agent_id: AgentId,
        direction: Direction,
        now: u64,
    ) -> Result<Position, MoveRejected> {
        if self.phase != MatchPhase::Running {
            return Err(MoveRejected::NotRunning);
        }

        let agent = self
            .state
            .agents
            .get(&agent_id)
            .ok_or(MoveRejected::UnknownAgent)?;
        if agent.is_bot {
            return Err(MoveRejected::NotControllable);
        }
        if !agent.connected {
            return Err(MoveRejected::Disconnected);
        }

        let speed = self
            .items
            .effects
            .speed_multiplier(agent.id, agent.role, now);
        if !agent.can_move_at(now, speed) {
            return Err(MoveRejected::OnCooldown);
        }

        let next = agent
            .position
            .step(direction, self.state.grid_size)
            .ok_or(MoveRejected::OutOfBounds)?;

        if let Some(agent) = self.state.agents.get_mut(&agent_id) {
            agent.position = next;
            agent.last_move_at = Some(now);
        }
        Ok(next)
    }

    /// Add a human after initialization. Public matches give up a bot seat when full.
    pub fn join(
        &mut self,
        user_id: Uuid,
        display_name: String,
        now: u64,
    ) -> Result<RoleAssignment, JoinRejected> {
        if self.phase == MatchPhase::Stopped {
            return Err(JoinRejected::MatchEnded);
        }
        if self.state.agents.contains_key(&user_id) {
            return Err(JoinRejected::AlreadyPresent);
        }

        if self.state.agents.len() >= self.settings.capacity {
            let seat = match self.kind {
                MatchKind::Private => None,
                MatchKind::Public => self
                    .bots
                    .iter()
                    .find(|b| b.agent.is_survivor())
                    .or_else(|| self.bots.iter().next())
                    .map(|b| b.id()),
            };
            let bot_id = seat.ok_or(JoinRejected::MatchFull)?;
            self.bots.remove_bot(bot_id);
            self.state.agents.remove(&bot_id);
            self.events.push(GameEvent::AgentLeft {
                agent_id: bot_id,
                reason: "replaced".to_string(),
            });
        }

        let position = random_free_cell(&self.state.occupied_cells(), self.state.grid_size, &mut self.rng);
        let agent = Agent::new(user_id, display_name.clone(), false, Role::Survivor, position, now);
        self.state.agents.insert(user_id, agent);
        self.events.push(GameEvent::AgentJoined {
            agent_id: user_id,
            display_name,
            role: Role::Survivor,
            is_bot: false,
        });

        info!(match_id = %self.id, user_id = %user_id, "Player joined running match");

        self.role_assignment(user_id).ok_or(JoinRejected::MatchEnded)
    }

    /// Remove a human for good. Ends the match when no humans remain.
    pub fn leave(&mut self, user_id: Uuid, now: u64) -> bool {
        let is_human = self.state.agents.get(&user_id).is_some_and(|a| !a.is_bot);
        if !is_human {
            return false;
        }
        self.state.agents.remove(&user_id);
        self.events.push(GameEvent::AgentLeft {
            agent_id: user_id,
            reason: "left".to_string(),
        });

        if self.state.human_count() == 0 && self.phase != MatchPhase::Stopped {
            self.stop(EndReason::Abandoned, now);
        }
        true
    }

    /// Keep the agent in play but stop accepting its moves
    pub fn disconnect(&mut self, user_id: Uuid) -> bool {
        match self.state.agents.get_mut(&user_id) {
            Some(agent) if !agent.is_bot && agent.connected => {
                agent.connected = false;
                self.events.push(GameEvent::AgentDisconnected { agent_id: user_id });
                true
            }
            _ => false,
        }
    }

    /// Hand control back; returns a fresh role briefing
    pub fn reconnect(&mut self, user_id: Uuid) -> Option<RoleAssignment> {
        if self.phase == MatchPhase::Stopped {
            return None;
        }
        let agent = self.state.agents.get_mut(&user_id).filter(|a| !a.is_bot)?;
        if !agent.connected {
            agent.connected = true;
            self.events.push(GameEvent::AgentReconnected { agent_id: user_id });
        }
        self.role_assignment(user_id)
    }

    /// End the match. Only the first call has an effect.
    pub fn stop(&mut self, reason: EndReason, now: u64) -> Option<&MatchResult> {
        if self.phase == MatchPhase::Stopped {
            return None;
        }
        self.phase = MatchPhase::Stopped;

        let winner = match reason {
            EndReason::Timeout => {
                let survivors: Vec<&Agent> = self
                    .state
                    .agents
                    .values()
                    .filter(|a| a.is_survivor() && a.is_alive)
                    .collect();
                survivors.choose(&mut self.rng).map(|a| AgentStat {
                    agent_id: a.id,
                    display_name: a.display_name.clone(),
                    value: now.saturating_sub(a.joined_at),
                })
            }
            EndReason::ZombiesWin | EndReason::Abandoned | EndReason::Stopped => None,
        };

        let stats = compute_statistics(&self.state, now);
        info!(
            match_id = %self.id,
            reason = ?reason,
            infections = stats.total_infections,
            duration_ms = stats.duration_ms,
            winner = ?winner.as_ref().map(|w| w.agent_id),
            "Match stopped"
        );

        self.result = Some(MatchResult {
            reason,
            winner,
            stats,
        });
        self.result.as_ref()
    }

    /// Drop per-match state. The result stays readable.
    pub fn cleanup(&mut self) {
        self.bots.clear();
        self.items.clear();
        self.state.agents.clear();
        self.events.clear();
        debug!(match_id = %self.id, "Match state discarded");
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_stopped(&self) -> bool {
        self.phase == MatchPhase::Stopped
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn items(&self) -> &ItemSystem {
        &self.items
    }

    pub fn bots(&self) -> &BotController {
        &self.bots
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }

    #[cfg(test)]
    pub(crate) fn items_mut(&mut self) -> &mut ItemSystem {
        &mut self.items
    }
}
