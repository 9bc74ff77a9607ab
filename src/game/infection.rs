//! Infection system - same-cell zombie/survivor encounters

use tracing::debug;

use crate::ws::protocol::GameEvent;

use super::agent::{AgentId, Role};
use super::effects::{EffectManager, EffectType};
use super::state::{InfectionRecord, MatchState};

/// A zombie and a survivor sharing a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encounter {
    pub zombie: AgentId,
    pub survivor: AgentId,
}

/// What an encounter turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionResult {
    Infected { victim: AgentId, zombie: AgentId },
    Healed { zombie: AgentId, healer: AgentId },
}

/// Infection system for resolving encounters
pub struct InfectionSystem;

impl InfectionSystem {
    /// Every colliding (zombie, survivor) pair, ordered by zombie then survivor id
    pub fn collect_encounters(state: &MatchState) -> Vec<Encounter> {
        let zombies = state.agents.values().filter(|a| a.is_zombie());
        let mut encounters = Vec::new();
        for zombie in zombies {
            for survivor in state.agents.values().filter(|a| a.is_survivor()) {
                if zombie.position == survivor.position {
                    encounters.push(Encounter {
                        zombie: zombie.id,
                        survivor: survivor.id,
                    });
                }
            }
        }
        encounters
    }

    /// Resolve all encounters for this tick.
    ///
    /// Pairs come from the state as it was before any flip; each pair is then
    /// applied against live state and dropped if either side already flipped.
    pub fn resolve(
        state: &mut MatchState,
        effects: &mut EffectManager,
        now: u64,
        events: &mut Vec<GameEvent>,
    ) -> Vec<CollisionResult> {
        let encounters = Self::collect_encounters(state);
        let mut results = Vec::with_capacity(encounters.len());

        for encounter in encounters {
            let still_paired = state
                .agents
                .get(&encounter.zombie)
                .is_some_and(|a| a.is_zombie())
                && state
                    .agents
                    .get(&encounter.survivor)
                    .is_some_and(|a| a.is_survivor());
            if !still_paired {
                continue;
            }

            let shielded = effects.consume_use(
                EffectType::Defensive,
                encounter.survivor,
                Role::Survivor,
                now,
            );

            let result = if shielded {
                Self::heal(state, encounter, events)
            } else {
                Self::infect(state, encounter, now, events)
            };
            results.push(result);
        }

        results
    }

    fn heal(state: &mut MatchState, encounter: Encounter, events: &mut Vec<GameEvent>) -> CollisionResult {
        if let Some(zombie) = state.agents.get_mut(&encounter.zombie) {
            zombie.heal();
        }
        debug!(zombie = %encounter.zombie, healer = %encounter.survivor, "Zombie healed");
        events.push(GameEvent::Healing {
            zombie_id: encounter.zombie,
            healer_id: encounter.survivor,
        });
        CollisionResult::Healed {
            zombie: encounter.zombie,
            healer: encounter.survivor,
        }
    }

    fn infect(
        state: &mut MatchState,
        encounter: Encounter,
        now: u64,
        events: &mut Vec<GameEvent>,
    ) -> CollisionResult {
        if let Some(victim) = state.agents.get_mut(&encounter.survivor) {
            victim.infect(encounter.zombie, now);
        }

        let survivors_remaining = state.survivor_count();
        state.infection_log.push(InfectionRecord {
            at: now,
            victim: encounter.survivor,
            zombie: encounter.zombie,
            survivors_remaining,
        });
        state.time_bonus_ms += state.infection_bonus_ms;

        debug!(
            victim = %encounter.survivor,
            zombie = %encounter.zombie,
            survivors_remaining,
            "Survivor infected"
        );
        events.push(GameEvent::Infection {
            victim_id: encounter.survivor,
            zombie_id: encounter.zombie,
            survivors_remaining,
            time_bonus_ms: state.infection_bonus_ms,
        });
        CollisionResult::Infected {
            victim: encounter.survivor,
            zombie: encounter.zombie,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::agent::Agent;
    use crate::game::effects::{ActiveEffect, EffectParams, EffectTarget};
    use crate::game::grid::Position;
    use crate::game::items::ItemKind;
    use uuid::Uuid;

    fn add(state: &mut MatchState, id: u128, role: Role, position: Position) -> AgentId {
        let id = Uuid::from_u128(id);
        state
            .agents
            .insert(id, Agent::new(id, format!("agent{}", id), false, role, position, 0));
        id
    }

    fn antidote(holder: AgentId, uses: u32) -> ActiveEffect {
        ActiveEffect {
            id: Uuid::from_u128(999),
            item_kind: ItemKind::Antidote,
            effect_type: EffectType::Defensive,
            affected: EffectTarget::Agent { id: holder },
            started_at: 0,
            expires_at: None,
            uses_remaining: Some(uses),
            source_agent: holder,
            params: EffectParams::new(),
        }
    }

    #[test]
    fn unshielded_survivor_is_infected() {
        let mut state = MatchState::new(32, 60_000, 5_000, 100);
        let zombie = add(&mut state, 1, Role::Zombie, Position::new(0, 1));
        let survivor = add(&mut state, 2, Role::Survivor, Position::new(0, 1));
        let mut effects = EffectManager::new();
        let mut events = Vec::new();

        let results = InfectionSystem::resolve(&mut state, &mut effects, 2_000, &mut events);

        assert_eq!(
            results,
            vec![CollisionResult::Infected {
                victim: survivor,
                zombie
            }]
        );
        let victim = &state.agents[&survivor];
        assert!(victim.is_zombie());
        assert_eq!(victim.infected_by, Some(zombie));
        assert_eq!(state.infection_log.len(), 1);
        assert_eq!(state.infection_log[0].survivors_remaining, 0);
        assert_eq!(state.time_bonus_ms, 5_000);
        assert!(matches!(
            events[0],
            GameEvent::Infection {
                survivors_remaining: 0,
                ..
            }
        ));
    }

    #[test]
    fn shielded_survivor_heals_zombie() {
        let mut state = MatchState::new(32, 60_000, 5_000, 100);
        let zombie = add(&mut state, 1, Role::Zombie, Position::new(0, 1));
        let survivor = add(&mut state, 2, Role::Survivor, Position::new(0, 1));
        let mut effects = EffectManager::new();
        effects.add(antidote(survivor, 1));
        let mut events = Vec::new();

        let results = InfectionSystem::resolve(&mut state, &mut effects, 2_000, &mut events);

        assert_eq!(
            results,
            vec![CollisionResult::Healed {
                zombie,
                healer: survivor
            }]
        );
        assert!(state.agents[&zombie].is_survivor());
        assert!(state.agents[&survivor].is_survivor());
        assert!(state.infection_log.is_empty());
        assert_eq!(state.time_bonus_ms, 0);
        assert_eq!(effects.iter().next().and_then(|e| e.uses_remaining), Some(0));
        assert_eq!(effects.update(2_000).len(), 1);
    }

    #[test]
    fn single_shield_only_stops_first_zombie() {
        let mut state = MatchState::new(32, 60_000, 5_000, 100);
        let first = add(&mut state, 1, Role::Zombie, Position::new(4, 4));
        let second = add(&mut state, 2, Role::Zombie, Position::new(4, 4));
        let survivor = add(&mut state, 3, Role::Survivor, Position::new(4, 4));
        let mut effects = EffectManager::new();
        effects.add(antidote(survivor, 1));
        let mut events = Vec::new();

        let results = InfectionSystem::resolve(&mut state, &mut effects, 1_000, &mut events);

        assert_eq!(
            results,
            vec![
                CollisionResult::Healed {
                    zombie: first,
                    healer: survivor
                },
                CollisionResult::Infected {
                    victim: survivor,
                    zombie: second
                },
            ]
        );
        // the healed zombie was not a survivor in the snapshot, so it is not infected back
        assert!(state.agents[&first].is_survivor());
        assert!(state.agents[&survivor].is_zombie());
    }

    #[test]
    fn infected_survivor_is_not_infected_twice() {
        let mut state = MatchState::new(32, 60_000, 5_000, 100);
        add(&mut state, 1, Role::Zombie, Position::new(2, 2));
        add(&mut state, 2, Role::Zombie, Position::new(2, 2));
        add(&mut state, 3, Role::Survivor, Position::new(2, 2));
        let mut effects = EffectManager::new();
        let mut events = Vec::new();

        let results = InfectionSystem::resolve(&mut state, &mut effects, 1_000, &mut events);

        assert_eq!(results.len(), 1);
        assert_eq!(state.infection_log.len(), 1);
        assert_eq!(state.time_bonus_ms, 5_000);
    }

    #[test]
    fn different_cells_do_not_collide() {
        let mut state = MatchState::new(32, 60_000, 5_000, 100);
        add(&mut state, 1, Role::Zombie, Position::new(0, 0));
        add(&mut state, 2, Role::Survivor, Position::new(0, 1));

        assert!(InfectionSystem::collect_encounters(&state).is_empty());
    }
}
