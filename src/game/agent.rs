//! Agent model shared by human players and bots

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::grid::Position;

pub type AgentId = Uuid;

/// Base movement cooldown for humans (milliseconds)
pub const SURVIVOR_MOVE_COOLDOWN_MS: u64 = 150;
pub const ZOMBIE_MOVE_COOLDOWN_MS: u64 = 200;

/// Team allegiance. Flips on infection or healing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Survivor,
    Zombie,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Survivor => Role::Zombie,
            Role::Zombie => Role::Survivor,
        }
    }

    /// Human move cooldown for this role, scaled by an active speed multiplier
    pub fn move_cooldown_ms(self, speed_multiplier: f32) -> u64 {
        let base = match self {
            Role::Survivor => SURVIVOR_MOVE_COOLDOWN_MS,
            Role::Zombie => ZOMBIE_MOVE_COOLDOWN_MS,
        };
        (base as f32 / speed_multiplier.max(1.0)).round() as u64
    }
}

/// Participant state (authoritative)
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub id: AgentId,
    pub display_name: String,
    pub is_bot: bool,
    pub role: Role,
    pub position: Position,
    pub is_alive: bool,

    // Movement gating
    pub last_move_at: Option<u64>,

    // Set while a zombie that started as a survivor
    pub infected_at: Option<u64>,
    pub infected_by: Option<AgentId>,

    /// Mirrors the effect subsystem, refreshed every tick
    pub has_defensive_item: bool,

    // Session
    pub connected: bool,
    pub joined_at: u64,
}

impl Agent {
    pub fn new(
        id: AgentId,
        display_name: String,
        is_bot: bool,
        role: Role,
        position: Position,
        joined_at: u64,
    ) -> Self {
        Self {
            id,
            display_name,
            is_bot,
            role,
            position,
            is_alive: true,
            last_move_at: None,
            infected_at: None,
            infected_by: None,
            has_defensive_item: false,
            connected: true,
            joined_at,
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.role == Role::Zombie
    }

    pub fn is_survivor(&self) -> bool {
        self.role == Role::Survivor
    }

    /// Survivor -> zombie
    pub fn infect(&mut self, by: AgentId, at: u64) {
        self.role = Role::Zombie;
        self.infected_at = Some(at);
        self.infected_by = Some(by);
    }

    /// Zombie -> survivor
    pub fn heal(&mut self) {
        self.role = Role::Survivor;
        self.infected_at = None;
        self.infected_by = None;
    }

    /// Whether a human may move at `now` given the current speed multiplier
    pub fn can_move_at(&self, now: u64, speed_multiplier: f32) -> bool {
        match self.last_move_at {
            None => true,
            Some(last) => {
                now.saturating_sub(last) >= self.role.move_cooldown_ms(speed_multiplier)
            }
        }
    }
}
