//! Per-match simulation state

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::agent::{Agent, AgentId, Role};
use super::grid::Position;

/// One survivor -> zombie transition
#[derive(Debug, Clone, Serialize)]
pub struct InfectionRecord {
    pub at: u64,
    pub victim: AgentId,
    pub zombie: AgentId,
    pub survivors_remaining: usize,
}

/// Match state (owned by the match engine)
#[derive(Debug)]
pub struct MatchState {
    pub grid_size: i32,
    /// Ordered so iteration, and hence RNG consumption, is reproducible
    pub agents: BTreeMap<AgentId, Agent>,
    pub started_at: Option<u64>,
    pub infection_log: Vec<InfectionRecord>,
    pub base_duration_ms: u64,
    /// Per-infection clock extension
    pub infection_bonus_ms: u64,
    /// Accumulated extension. Uncapped.
    pub time_bonus_ms: u64,
    pub tick_ms: u64,
    pub tick: u64,
}

impl MatchState {
    pub fn new(grid_size: i32, base_duration_ms: u64, infection_bonus_ms: u64, tick_ms: u64) -> Self {
        Self {
            grid_size,
            agents: BTreeMap::new(),
            started_at: None,
            infection_log: Vec::new(),
            base_duration_ms,
            infection_bonus_ms,
            time_bonus_ms: 0,
            tick_ms,
            tick: 0,
        }
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.agents.values().filter(|a| a.role == role).count()
    }

    pub fn survivor_count(&self) -> usize {
        self.count_role(Role::Survivor)
    }

    pub fn zombie_count(&self) -> usize {
        self.count_role(Role::Zombie)
    }

    pub fn human_count(&self) -> usize {
        self.agents.values().filter(|a| !a.is_bot).count()
    }

    pub fn occupied_cells(&self) -> HashSet<Position> {
        self.agents.values().map(|a| a.position).collect()
    }

    /// Total match length including infection bonuses
    pub fn total_duration_ms(&self) -> u64 {
        self.base_duration_ms + self.time_bonus_ms
    }

    pub fn elapsed_ms(&self, now: u64) -> u64 {
        self.started_at
            .map(|start| now.saturating_sub(start))
            .unwrap_or(0)
    }

    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.total_duration_ms()
            .saturating_sub(self.elapsed_ms(now))
    }

    pub fn is_time_up(&self, now: u64) -> bool {
        self.started_at.is_some() && self.elapsed_ms(now) >= self.total_duration_ms()
    }
}
