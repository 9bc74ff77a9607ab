//! Item spawning and pickup

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::ws::protocol::{EffectSnapshot, GameEvent, ItemSnapshot};

use super::agent::{AgentId, Role};
use super::effects::{
    ActiveEffect, EffectDuration, EffectManager, EffectParams, EffectTarget, EffectType,
};
use super::grid::{random_free_cell, Position};
use super::state::MatchState;
use super::random_id;

/// Item types that can appear on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Zombie team speed boost
    Frenzy,
    /// One-use infection shield
    Antidote,
    /// Survivor team speed boost
    Adrenaline,
    /// Instant relocation
    SmokeBomb,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [
        ItemKind::Frenzy,
        ItemKind::Antidote,
        ItemKind::Adrenaline,
        ItemKind::SmokeBomb,
    ];
}

/// Static item table entry
#[derive(Debug, Clone, Copy)]
pub struct ItemDefinition {
    pub kind: ItemKind,
    pub name: &'static str,
    pub description: &'static str,
    /// The only role that perceives this item
    pub visibility: Role,
    pub effect_type: EffectType,
    /// Applies to the whole `visibility` team rather than the collector
    pub shared: bool,
    pub multiplier: Option<f32>,
    pub duration: EffectDuration,
    pub spawn_weight: u32,
}

impl ItemDefinition {
    pub fn for_kind(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Frenzy => Self {
                kind,
                name: "Frenzy",
                description: "All zombies move faster for a while",
                visibility: Role::Zombie,
                effect_type: EffectType::SpeedBoost,
                shared: true,
                multiplier: Some(1.5),
                duration: EffectDuration::Timed { duration_ms: 8_000 },
                spawn_weight: 3,
            },
            ItemKind::Antidote => Self {
                kind,
                name: "Antidote",
                description: "The next zombie that catches you is cured instead",
                visibility: Role::Survivor,
                effect_type: EffectType::Defensive,
                shared: false,
                multiplier: None,
                duration: EffectDuration::Uses { count: 1 },
                spawn_weight: 3,
            },
            ItemKind::Adrenaline => Self {
                kind,
                name: "Adrenaline",
                description: "All survivors move faster for a while",
                visibility: Role::Survivor,
                effect_type: EffectType::SpeedBoost,
                shared: true,
                multiplier: Some(1.4),
                duration: EffectDuration::Timed { duration_ms: 6_000 },
                spawn_weight: 2,
            },
            ItemKind::SmokeBomb => Self {
                kind,
                name: "Smoke Bomb",
                description: "Vanish and reappear somewhere else",
                visibility: Role::Survivor,
                effect_type: EffectType::Teleport,
                shared: false,
                multiplier: None,
                duration: EffectDuration::Instant,
                spawn_weight: 1,
            },
        }
    }

    pub fn params(&self) -> EffectParams {
        let mut params = EffectParams::new();
        if let Some(multiplier) = self.multiplier {
            params.insert("multiplier".to_string(), multiplier);
        }
        params
    }
}

/// Item lying on the grid
#[derive(Debug, Clone)]
pub struct SpawnedItem {
    pub id: Uuid,
    pub kind: ItemKind,
    pub position: Position,
}

impl SpawnedItem {
    pub fn visibility(&self) -> Role {
        ItemDefinition::for_kind(self.kind).visibility
    }

    pub fn to_snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            kind: self.kind,
            visibility: self.visibility(),
            x: self.position.x,
            y: self.position.y,
        }
    }
}

/// Spawn schedule settings
#[derive(Debug, Clone, Copy)]
pub struct ItemSettings {
    pub spawn_interval_ms: u64,
    pub spawn_variance_ms: u64,
    pub max_items: usize,
}

impl Default for ItemSettings {
    fn default() -> Self {
        Self {
            spawn_interval_ms: 8_000,
            spawn_variance_ms: 3_000,
            max_items: 6,
        }
    }
}

/// Items on the grid plus the effects they produced
pub struct ItemSystem {
    items: Vec<SpawnedItem>,
    pub effects: EffectManager,
    settings: ItemSettings,
    next_spawn_at: Option<u64>,
}

impl ItemSystem {
    pub fn new(settings: ItemSettings) -> Self {
        Self {
            items: Vec::new(),
            effects: EffectManager::new(),
            settings,
            next_spawn_at: None,
        }
    }

    /// Arm the spawn timer
    pub fn start<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        self.schedule_next(now, rng);
    }

    pub fn next_spawn_at(&self) -> Option<u64> {
        self.next_spawn_at
    }

    pub fn spawned(&self) -> &[SpawnedItem] {
        &self.items
    }

    /// Items a given role can perceive
    pub fn visible_to(&self, role: Role) -> impl Iterator<Item = &SpawnedItem> {
        self.items.iter().filter(move |item| item.visibility() == role)
    }

    /// Place an item directly, bypassing the schedule
    pub fn place(&mut self, item: SpawnedItem) {
        self.items.push(item);
    }

    /// One tick: spawn if due, resolve pickups, expire effects
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        state: &mut MatchState,
        rng: &mut R,
        now: u64,
        events: &mut Vec<GameEvent>,
    ) {
        if self.next_spawn_at.is_some_and(|due| now >= due) {
            self.try_spawn(state, rng, events);
            self.schedule_next(now, rng);
        }

        self.collect(state, rng, now, events);

        for effect in self.effects.update(now) {
            debug!(effect_id = %effect.id, effect_type = ?effect.effect_type, "Effect ended");
            events.push(GameEvent::EffectEnded {
                effect_id: effect.id,
                effect_type: effect.effect_type,
                affected: effect.affected,
            });
        }
    }

    fn schedule_next<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        let variance = self.settings.spawn_variance_ms.min(self.settings.spawn_interval_ms) as i64;
        let jitter = if variance > 0 {
            rng.gen_range(-variance..=variance)
        } else {
            0
        };
        let delay = (self.settings.spawn_interval_ms as i64 + jitter).max(1) as u64;
        self.next_spawn_at = Some(now + delay);
    }

    fn try_spawn<R: Rng + ?Sized>(
        &mut self,
        state: &MatchState,
        rng: &mut R,
        events: &mut Vec<GameEvent>,
    ) {
        if self.items.len() >= self.settings.max_items {
            return;
        }
        let Ok(kind) = ItemKind::ALL
            .choose_weighted(rng, |kind| ItemDefinition::for_kind(*kind).spawn_weight)
            .copied()
        else {
            return;
        };

        let occupied = self.occupied_cells(state);
        let position = random_free_cell(&occupied, state.grid_size, rng);
        if occupied.contains(&position) {
            debug!("No free cell for item spawn, skipping");
            return;
        }

        let item = SpawnedItem {
            id: random_id(rng),
            kind,
            position,
        };
        events.push(GameEvent::ItemSpawned {
            item: item.to_snapshot(),
        });
        self.items.push(item);
    }

    fn occupied_cells(&self, state: &MatchState) -> HashSet<Position> {
        state
            .agents
            .values()
            .map(|agent| agent.position)
            .chain(self.items.iter().map(|item| item.position))
            .collect()
    }

    fn collect<R: Rng + ?Sized>(
        &mut self,
        state: &mut MatchState,
        rng: &mut R,
        now: u64,
        events: &mut Vec<GameEvent>,
    ) {
        let mut pickups: Vec<(SpawnedItem, AgentId)> = Vec::new();
        self.items.retain(|item| {
            let collector = state
                .agents
                .values()
                .find(|agent| agent.position == item.position)
                .map(|agent| agent.id);
            match collector {
                Some(agent_id) => {
                    pickups.push((item.clone(), agent_id));
                    false
                }
                None => true,
            }
        });

        for (item, agent_id) in pickups {
            events.push(GameEvent::ItemCollected {
                item_id: item.id,
                kind: item.kind,
                agent_id,
            });
            self.apply_pickup(&item, agent_id, state, rng, now, events);
        }
    }

    fn apply_pickup<R: Rng + ?Sized>(
        &mut self,
        item: &SpawnedItem,
        agent_id: AgentId,
        state: &mut MatchState,
        rng: &mut R,
        now: u64,
        events: &mut Vec<GameEvent>,
    ) {
        let definition = ItemDefinition::for_kind(item.kind);

        let (expires_at, uses_remaining) = match definition.duration {
            EffectDuration::Instant => {
                self.apply_instant(&definition, agent_id, state, rng);
                return;
            }
            EffectDuration::Timed { duration_ms } => (Some(now + duration_ms), None),
            EffectDuration::Uses { count } => (None, Some(count)),
        };

        let affected = if definition.shared {
            EffectTarget::Team {
                role: definition.visibility,
            }
        } else {
            EffectTarget::Agent { id: agent_id }
        };

        let effect = ActiveEffect {
            id: random_id(rng),
            item_kind: definition.kind,
            effect_type: definition.effect_type,
            affected,
            started_at: now,
            expires_at,
            uses_remaining,
            source_agent: agent_id,
            params: definition.params(),
        };
        events.push(GameEvent::EffectStarted {
            effect: EffectSnapshot::from(&effect),
        });
        self.effects.add(effect);
    }

    fn apply_instant<R: Rng + ?Sized>(
        &self,
        definition: &ItemDefinition,
        agent_id: AgentId,
        state: &mut MatchState,
        rng: &mut R,
    ) {
        match definition.effect_type {
            EffectType::Teleport => {
                let occupied = self.occupied_cells(state);
                let destination = random_free_cell(&occupied, state.grid_size, rng);
                if let Some(agent) = state.agents.get_mut(&agent_id) {
                    agent.position = destination;
                }
            }
            // Lingering effect types have no one-shot form
            EffectType::SpeedBoost | EffectType::Defensive => {}
        }
    }

    /// Drop everything (match cleanup)
    pub fn clear(&mut self) {
        self.items.clear();
        self.effects.clear();
        self.next_spawn_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::agent::Agent;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state_with(agents: &[(u128, Role, Position)]) -> MatchState {
        let mut state = MatchState::new(16, 60_000, 5_000, 100);
        for (id, role, position) in agents {
            let id = Uuid::from_u128(*id);
            state.agents.insert(
                id,
                Agent::new(id, format!("a{}", id), false, *role, *position, 0),
            );
        }
        state
    }

    fn item(kind: ItemKind, position: Position) -> SpawnedItem {
        SpawnedItem {
            id: Uuid::from_u128(500),
            kind,
            position,
        }
    }

    #[test]
    fn antidote_pickup_creates_single_use_personal_effect() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut state = state_with(&[(1, Role::Survivor, Position::new(4, 4))]);
        let mut items = ItemSystem::new(ItemSettings::default());
        items.place(item(ItemKind::Antidote, Position::new(4, 4)));

        let mut events = Vec::new();
        items.update(&mut state, &mut rng, 1_000, &mut events);

        assert!(items.spawned().is_empty());
        let holder = Uuid::from_u128(1);
        assert!(items.effects.holds_defensive(holder, Role::Survivor, 1_000));
        let effect = items.effects.iter().next().expect("effect registered");
        assert_eq!(effect.uses_remaining, Some(1));
        assert_eq!(effect.affected, EffectTarget::Agent { id: holder });
        assert!(matches!(events[0], GameEvent::ItemCollected { .. }));
        assert!(matches!(events[1], GameEvent::EffectStarted { .. }));
    }

    #[test]
    fn frenzy_pickup_boosts_whole_zombie_team() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut state = state_with(&[
            (1, Role::Zombie, Position::new(1, 1)),
            (2, Role::Zombie, Position::new(9, 9)),
        ]);
        let mut items = ItemSystem::new(ItemSettings::default());
        items.place(item(ItemKind::Frenzy, Position::new(1, 1)));

        let mut events = Vec::new();
        items.update(&mut state, &mut rng, 1_000, &mut events);

        assert_eq!(items.effects.team_speed_multiplier(Role::Zombie, 1_000), 1.5);
        assert!(items
            .effects
            .has_effect(EffectType::SpeedBoost, Uuid::from_u128(2), Role::Zombie, 8_999));

        events.clear();
        items.update(&mut state, &mut rng, 9_000, &mut events);
        assert!(items.effects.is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::EffectEnded { effect_type: EffectType::SpeedBoost, .. })));
    }

    #[test]
    fn smoke_bomb_moves_collector_without_lingering_effect() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let start = Position::new(0, 0);
        let mut state = state_with(&[(1, Role::Survivor, start)]);
        let mut items = ItemSystem::new(ItemSettings::default());
        items.place(item(ItemKind::SmokeBomb, start));

        let mut events = Vec::new();
        items.update(&mut state, &mut rng, 500, &mut events);

        let agent = &state.agents[&Uuid::from_u128(1)];
        assert_ne!(agent.position, start);
        assert!(agent.position.in_bounds(16));
        assert!(items.effects.is_empty());
        assert!(!events.iter().any(|e| matches!(e, GameEvent::EffectStarted { .. })));
    }

    #[test]
    fn spawner_uses_free_cells_and_respects_cap() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut state = state_with(&[(1, Role::Survivor, Position::new(0, 0))]);
        let mut items = ItemSystem::new(ItemSettings {
            spawn_interval_ms: 1_000,
            spawn_variance_ms: 0,
            max_items: 2,
        });
        items.start(0, &mut rng);
        assert_eq!(items.next_spawn_at(), Some(1_000));

        let mut events = Vec::new();
        for now in [999, 1_000, 2_000, 3_000, 4_000] {
            items.update(&mut state, &mut rng, now, &mut events);
        }

        assert_eq!(items.spawned().len(), 2);
        for spawned in items.spawned() {
            assert_ne!(spawned.position, Position::new(0, 0));
        }
        assert_eq!(items.next_spawn_at(), Some(5_000));
        let spawned_events = events
            .iter()
            .filter(|e| matches!(e, GameEvent::ItemSpawned { .. }))
            .count();
        assert_eq!(spawned_events, 2);
    }

    #[test]
    fn visibility_is_role_gated() {
        let mut items = ItemSystem::new(ItemSettings::default());
        items.place(item(ItemKind::Frenzy, Position::new(1, 1)));
        items.place(item(ItemKind::Antidote, Position::new(2, 2)));

        let zombie_view: Vec<ItemKind> = items.visible_to(Role::Zombie).map(|i| i.kind).collect();
        assert_eq!(zombie_view, vec![ItemKind::Frenzy]);
        let survivor_view: Vec<ItemKind> = items.visible_to(Role::Survivor).map(|i| i.kind).collect();
        assert_eq!(survivor_view, vec![ItemKind::Antidote]);
    }
}
