//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::agent::{Agent, Role};
use crate::game::effects::{ActiveEffect, EffectTarget, EffectType};
use crate::game::engine::{MatchKind, RoleAssignment};
use crate::game::grid::Direction;
use crate::game::items::ItemKind;
use crate::game::stats::{AgentStat, EndReason, MatchStatistics};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the public matchmaking queue
    JoinQueue,

    /// Step one cell
    Move { direction: Direction },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current match (or the queue)
    LeaveMatch,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: Uuid,
        server_time: u64,
    },

    /// Waiting in the matchmaking queue
    Queued {
        /// 1-based place in line
        position: usize,
        queue_size: usize,
    },

    /// Confirmation of match join
    MatchJoined {
        match_id: Uuid,
        kind: MatchKind,
        grid_size: i32,
        /// All agents in the match at join time
        players: Vec<PlayerInfo>,
    },

    /// Private role briefing, only forwarded to `agent_id`
    RoleAssigned {
        agent_id: Uuid,
        role: Role,
        x: i32,
        y: i32,
        survivors: usize,
        zombies: usize,
    },

    /// Game state snapshot (sent every tick)
    Snapshot {
        /// Server tick number
        tick: u64,
        /// Clock left, bonuses included
        remaining_ms: u64,
        agents: Vec<AgentSnapshot>,
        items: Vec<ItemSnapshot>,
        team_effects: Vec<EffectSnapshot>,
        /// Events that occurred since last snapshot
        events: Vec<GameEvent>,
    },

    /// Match has ended
    MatchEnd {
        outcome: EndReason,
        winner: Option<AgentStat>,
        duration_ms: u64,
        stats: MatchStatistics,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    /// The only player this message is meant for, if it is addressed
    pub fn recipient(&self) -> Option<Uuid> {
        match self {
            ServerMsg::RoleAssigned { agent_id, .. } => Some(*agent_id),
            _ => None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<RoleAssignment> for ServerMsg {
    fn from(assignment: RoleAssignment) -> Self {
        ServerMsg::RoleAssigned {
            agent_id: assignment.agent_id,
            role: assignment.role,
            x: assignment.position.x,
            y: assignment.position.y,
            survivors: assignment.survivors,
            zombies: assignment.zombies,
        }
    }
}

/// Player info for match join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub agent_id: Uuid,
    pub display_name: String,
    pub is_bot: bool,
}

/// Agent state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: Uuid,
    pub display_name: String,
    pub is_bot: bool,
    pub role: Role,
    pub x: i32,
    pub y: i32,
    pub has_defensive_item: bool,
    pub connected: bool,
}

impl From<&Agent> for AgentSnapshot {
    fn from(agent: &Agent) -> Self {
        Self {
            agent_id: agent.id,
            display_name: agent.display_name.clone(),
            is_bot: agent.is_bot,
            role: agent.role,
            x: agent.position.x,
            y: agent.position.y,
            has_defensive_item: agent.has_defensive_item,
            connected: agent.connected,
        }
    }
}

/// Item on the grid. Every item is listed; clients hide the ones whose
/// `visibility` is not their role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: Uuid,
    pub kind: ItemKind,
    pub visibility: Role,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectSnapshot {
    pub id: Uuid,
    pub item_kind: ItemKind,
    pub effect_type: EffectType,
    pub affected: EffectTarget,
    pub expires_at: Option<u64>,
    pub uses_remaining: Option<u32>,
    pub multiplier: f32,
}

impl From<&ActiveEffect> for EffectSnapshot {
    fn from(effect: &ActiveEffect) -> Self {
        Self {
            id: effect.id,
            item_kind: effect.item_kind,
            effect_type: effect.effect_type,
            affected: effect.affected,
            expires_at: effect.expires_at,
            uses_remaining: effect.uses_remaining,
            multiplier: effect.multiplier(),
        }
    }
}

/// Game events (infections, pickups, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    AgentJoined {
        agent_id: Uuid,
        display_name: String,
        role: Role,
        is_bot: bool,
    },

    AgentLeft {
        agent_id: Uuid,
        /// "left", "replaced"
        reason: String,
    },

    AgentDisconnected {
        agent_id: Uuid,
    },

    AgentReconnected {
        agent_id: Uuid,
    },

    ItemSpawned {
        item: ItemSnapshot,
    },

    ItemCollected {
        item_id: Uuid,
        kind: ItemKind,
        agent_id: Uuid,
    },

    EffectStarted {
        effect: EffectSnapshot,
    },

    EffectEnded {
        effect_id: Uuid,
        effect_type: EffectType,
        affected: EffectTarget,
    },

    /// Survivor turned
    Infection {
        victim_id: Uuid,
        zombie_id: Uuid,
        survivors_remaining: usize,
        /// Clock extension granted by this infection
        time_bonus_ms: u64,
    },

    /// Antidote turned a zombie back
    Healing {
        zombie_id: Uuid,
        healer_id: Uuid,
    },
}
