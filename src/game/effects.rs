//! Active status effects created by item pickups

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::{AgentId, Role};
use super::items::ItemKind;

/// Free-form effect parameters (e.g. `multiplier`)
pub type EffectParams = BTreeMap<String, f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    /// Scales movement speed by `params["multiplier"]`
    SpeedBoost,
    /// Turns a zombie collision into a healing
    Defensive,
    /// Relocates the collector
    Teleport,
}

/// How long an effect lingers after pickup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectDuration {
    Instant,
    Timed { duration_ms: u64 },
    Uses { count: u32 },
}

/// Who an effect applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectTarget {
    Agent { id: AgentId },
    Team { role: Role },
}

impl EffectTarget {
    pub fn applies_to(&self, agent_id: AgentId, role: Role) -> bool {
        match *self {
            EffectTarget::Agent { id } => id == agent_id,
            EffectTarget::Team { role: team } => team == role,
        }
    }

    pub fn is_team(&self) -> bool {
        matches!(self, EffectTarget::Team { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveEffect {
    pub id: Uuid,
    pub item_kind: ItemKind,
    pub effect_type: EffectType,
    pub affected: EffectTarget,
    pub started_at: u64,
    pub expires_at: Option<u64>,
    pub uses_remaining: Option<u32>,
    pub source_agent: AgentId,
    pub params: EffectParams,
}

impl ActiveEffect {
    /// Active for `now` in `[started_at, expires_at)` with uses left
    pub fn is_active(&self, now: u64) -> bool {
        now >= self.started_at
            && self.expires_at.map_or(true, |deadline| now < deadline)
            && self.uses_remaining.map_or(true, |uses| uses > 0)
    }

    fn is_spent(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
            || self.uses_remaining == Some(0)
    }

    pub fn multiplier(&self) -> f32 {
        self.params.get("multiplier").copied().unwrap_or(1.0)
    }
}

/// Registry of effects for one match
#[derive(Debug, Default)]
pub struct EffectManager {
    effects: Vec<ActiveEffect>,
}

impl EffectManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: ActiveEffect) {
        self.effects.push(effect);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveEffect> {
        self.effects.iter()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Remove expired or used-up effects, returning them
    pub fn update(&mut self, now: u64) -> Vec<ActiveEffect> {
        let (ended, kept): (Vec<_>, Vec<_>) = self
            .effects
            .drain(..)
            .partition(|effect| effect.is_spent(now));
        self.effects = kept;
        ended
    }

    /// Whether an effect of `effect_type` currently applies to the agent
    pub fn has_effect(&self, effect_type: EffectType, agent_id: AgentId, role: Role, now: u64) -> bool {
        self.effects.iter().any(|e| {
            e.effect_type == effect_type && e.affected.applies_to(agent_id, role) && e.is_active(now)
        })
    }

    pub fn holds_defensive(&self, agent_id: AgentId, role: Role, now: u64) -> bool {
        self.has_effect(EffectType::Defensive, agent_id, role, now)
    }

    /// Strongest team-wide speed boost for `role` (1.0 when none)
    pub fn team_speed_multiplier(&self, role: Role, now: u64) -> f32 {
        self.effects
            .iter()
            .filter(|e| {
                e.effect_type == EffectType::SpeedBoost
                    && e.affected == EffectTarget::Team { role }
                    && e.is_active(now)
            })
            .map(ActiveEffect::multiplier)
            .fold(1.0, f32::max)
    }

    /// Speed multiplier for one agent, counting team and personal boosts
    pub fn speed_multiplier(&self, agent_id: AgentId, role: Role, now: u64) -> f32 {
        self.effects
            .iter()
            .filter(|e| {
                e.effect_type == EffectType::SpeedBoost
                    && e.affected.applies_to(agent_id, role)
                    && e.is_active(now)
            })
            .map(ActiveEffect::multiplier)
            .fold(1.0, f32::max)
    }

    /// Spend one use of the first matching use-limited effect.
    /// Returns false when nothing was available.
    pub fn consume_use(&mut self, effect_type: EffectType, agent_id: AgentId, role: Role, now: u64) -> bool {
        let found = self.effects.iter_mut().find(|e| {
            e.effect_type == effect_type
                && e.affected.applies_to(agent_id, role)
                && e.is_active(now)
                && e.uses_remaining.is_some()
        });
        match found {
            Some(effect) => {
                if let Some(uses) = effect.uses_remaining.as_mut() {
                    *uses -= 1;
                }
                true
            }
            None => false,
        }
    }

    /// Active team-wide effects, for snapshots
    pub fn team_effects(&self, now: u64) -> impl Iterator<Item = &ActiveEffect> {
        self.effects
            .iter()
            .filter(move |e| e.affected.is_team() && e.is_active(now))
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }
}
