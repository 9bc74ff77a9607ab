//! Bot controller - seat fillers with chase/flee movement

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::agent::{Agent, AgentId, Role};
use super::grid::{manhattan, Direction, Position};
use super::items::ItemSystem;
use super::random_id;
use super::state::MatchState;

/// Ticks a bot waits between moves at normal speed
pub const SURVIVOR_COOLDOWN_TICKS: u32 = 2;
pub const ZOMBIE_COOLDOWN_TICKS: u32 = 3;

/// Chance of a random step when nothing is in sight
pub const IDLE_WANDER_CHANCE: f64 = 0.1;
/// Chance a zombie backs off from a survivor holding an antidote
pub const DEFENSIVE_AVOID_CHANCE: f64 = 0.85;

const MIN_SIGHT_RANGE: i32 = 6;
const MAX_SIGHT_RANGE: i32 = 10;
const MIN_MISTAKE_CHANCE: f64 = 0.10;
const MAX_MISTAKE_CHANCE: f64 = 0.25;

const BOT_NAMES: [&str; 12] = [
    "Ash", "Birch", "Cedar", "Dune", "Ember", "Flint", "Gale", "Hazel", "Ivy", "Juniper", "Kestrel",
    "Lark",
];

/// Bot cooldown for a role under a speed multiplier
pub fn cooldown_ticks(role: Role, speed_multiplier: f32) -> u32 {
    let base = match role {
        Role::Survivor => SURVIVOR_COOLDOWN_TICKS,
        Role::Zombie => ZOMBIE_COOLDOWN_TICKS,
    };
    (base as f32 / speed_multiplier.max(1.0)).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pursuit {
    Chase,
    Flee,
}

/// Bot state (simulation-only fields stay private)
#[derive(Debug, Clone)]
pub struct Bot {
    pub agent: Agent,
    cooldown_ticks_remaining: u32,
    sight_range: i32,
    mistake_chance: f64,
}

impl Bot {
    pub fn id(&self) -> AgentId {
        self.agent.id
    }
}

/// Owns every bot in a match
#[derive(Debug, Default)]
pub struct BotController {
    bots: Vec<Bot>,
    names_used: usize,
}

impl BotController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bot with randomized sight and sloppiness
    pub fn spawn_bot<R: Rng + ?Sized>(
        &mut self,
        role: Role,
        position: Position,
        now: u64,
        rng: &mut R,
    ) -> AgentId {
        let id = random_id(rng);
        let name = BOT_NAMES[self.names_used % BOT_NAMES.len()];
        let round = self.names_used / BOT_NAMES.len();
        let display_name = if round == 0 {
            format!("Bot {}", name)
        } else {
            format!("Bot {} {}", name, round + 1)
        };
        self.names_used += 1;

        self.bots.push(Bot {
            agent: Agent::new(id, display_name, true, role, position, now),
            cooldown_ticks_remaining: 0,
            sight_range: rng.gen_range(MIN_SIGHT_RANGE..=MAX_SIGHT_RANGE),
            mistake_chance: rng.gen_range(MIN_MISTAKE_CHANCE..MAX_MISTAKE_CHANCE),
        });
        id
    }

    pub fn remove_bot(&mut self, id: AgentId) -> Option<Bot> {
        let idx = self.bots.iter().position(|b| b.id() == id)?;
        Some(self.bots.remove(idx))
    }

    pub fn get(&self, id: AgentId) -> Option<&Bot> {
        self.bots.iter().find(|b| b.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bot> {
        self.bots.iter()
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    /// Copy bot state into the public agent map
    pub fn publish(&self, agents: &mut BTreeMap<AgentId, Agent>) {
        for bot in &self.bots {
            agents.insert(bot.id(), bot.agent.clone());
        }
    }

    /// Pick up role flips and relocations made by other subsystems
    pub fn absorb(&mut self, agents: &BTreeMap<AgentId, Agent>) {
        for bot in &mut self.bots {
            if let Some(public) = agents.get(&bot.agent.id) {
                bot.agent = public.clone();
            }
        }
    }

    /// Advance every bot by one tick. Returns how many moved.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        state: &MatchState,
        items: &ItemSystem,
        rng: &mut R,
        now: u64,
    ) -> usize {
        let mut moved = 0;
        for bot in &mut self.bots {
            if bot.cooldown_ticks_remaining > 0 {
                bot.cooldown_ticks_remaining -= 1;
                continue;
            }

            let Some(dir) = decide(bot, state, items, rng, now) else {
                continue;
            };
            let Some(next) = bot.agent.position.step(dir, state.grid_size) else {
                continue;
            };

            bot.agent.position = next;
            bot.agent.last_move_at = Some(now);
            let speed = items.effects.team_speed_multiplier(bot.agent.role, now);
            bot.cooldown_ticks_remaining = cooldown_ticks(bot.agent.role, speed);
            moved += 1;
        }
        moved
    }

    pub fn clear(&mut self) {
        self.bots.clear();
    }
}

/// Where a bot wants to go this tick, if anywhere
fn decide<R: Rng + ?Sized>(
    bot: &Bot,
    state: &MatchState,
    items: &ItemSystem,
    rng: &mut R,
    now: u64,
) -> Option<Direction> {
    let here = bot.agent.position;
    let role = bot.agent.role;
    let grid = state.grid_size;

    // Items first
    let wanted_item = items
        .visible_to(role)
        .map(|item| (manhattan(here, item.position), item.position))
        .filter(|(dist, _)| *dist <= bot.sight_range)
        .min_by_key(|(dist, _)| *dist);
    if let Some((_, item_pos)) = wanted_item {
        // mistakes only apply to chasing or fleeing agents
        return choose_step(here, item_pos, Pursuit::Chase, grid, 0.0, rng);
    }

    let target = state
        .agents
        .values()
        .filter(|other| other.id != bot.agent.id && other.role == role.opposite())
        .map(|other| (manhattan(here, other.position), other))
        .filter(|(dist, _)| *dist <= bot.sight_range)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, other)| other);

    let Some(target) = target else {
        if rng.gen_bool(IDLE_WANDER_CHANCE) {
            return random_step(here, grid, rng);
        }
        return None;
    };

    let pursuit = match role {
        Role::Survivor => Pursuit::Flee,
        Role::Zombie => {
            let shielded = items.effects.holds_defensive(target.id, target.role, now);
            if shielded && rng.gen_bool(DEFENSIVE_AVOID_CHANCE) {
                Pursuit::Flee
            } else {
                Pursuit::Chase
            }
        }
    };

    choose_step(here, target.position, pursuit, grid, bot.mistake_chance, rng)
}

fn valid_moves(from: Position, grid_size: i32) -> Vec<(Direction, Position)> {
    Direction::CARDINAL
        .iter()
        .filter_map(|dir| from.step(*dir, grid_size).map(|next| (*dir, next)))
        .collect()
}

fn random_step<R: Rng + ?Sized>(from: Position, grid_size: i32, rng: &mut R) -> Option<Direction> {
    valid_moves(from, grid_size)
        .choose(rng)
        .map(|(dir, _)| *dir)
}

/// Best cardinal step toward (or away from) `target`, occasionally a random one
fn choose_step<R: Rng + ?Sized>(
    from: Position,
    target: Position,
    pursuit: Pursuit,
    grid_size: i32,
    mistake_chance: f64,
    rng: &mut R,
) -> Option<Direction> {
    let candidates = valid_moves(from, grid_size);
    if candidates.is_empty() {
        return None;
    }
    if rng.gen_bool(mistake_chance) {
        return candidates.choose(rng).map(|(dir, _)| *dir);
    }

    let best = match pursuit {
        Pursuit::Chase => candidates
            .iter()
            .min_by_key(|(_, next)| manhattan(*next, target)),
        Pursuit::Flee => candidates
            .iter()
            .min_by_key(|(_, next)| Reverse(manhattan(*next, target))),
    };
    best.map(|(dir, _)| *dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::effects::{ActiveEffect, EffectParams, EffectTarget, EffectType};
    use crate::game::items::{ItemKind, ItemSettings, SpawnedItem};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn precise_bot(controller: &mut BotController, role: Role, position: Position, rng: &mut ChaCha8Rng) -> AgentId {
        let id = controller.spawn_bot(role, position, 0, rng);
        let bot = controller
            .bots
            .iter_mut()
            .find(|b| b.id() == id)
            .expect("bot spawned");
        bot.mistake_chance = 0.0;
        bot.sight_range = 8;
        id
    }

    fn human(state: &mut MatchState, id: u128, role: Role, position: Position) -> AgentId {
        let id = Uuid::from_u128(id);
        state
            .agents
            .insert(id, Agent::new(id, "human".to_string(), false, role, position, 0));
        id
    }

    fn position_of(controller: &BotController, id: AgentId) -> Position {
        controller.get(id).expect("bot exists").agent.position
    }

    #[test]
    fn zombie_bot_closes_distance_to_survivor() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut state = MatchState::new(16, 60_000, 5_000, 100);
        let items = ItemSystem::new(ItemSettings::default());
        let mut bots = BotController::new();
        let zombie = precise_bot(&mut bots, Role::Zombie, Position::new(5, 5), &mut rng);
        human(&mut state, 1, Role::Survivor, Position::new(5, 8));
        bots.publish(&mut state.agents);

        assert_eq!(bots.update(&state, &items, &mut rng, 100), 1);
        assert_eq!(position_of(&bots, zombie), Position::new(5, 6));
    }

    #[test]
    fn survivor_bot_runs_from_zombie() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut state = MatchState::new(16, 60_000, 5_000, 100);
        let items = ItemSystem::new(ItemSettings::default());
        let mut bots = BotController::new();
        let survivor = precise_bot(&mut bots, Role::Survivor, Position::new(5, 5), &mut rng);
        human(&mut state, 1, Role::Zombie, Position::new(5, 7));
        bots.publish(&mut state.agents);

        bots.update(&state, &items, &mut rng, 100);
        assert_eq!(position_of(&bots, survivor), Position::new(5, 4));
    }

    #[test]
    fn cooldown_skips_ticks_after_a_move() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut state = MatchState::new(32, 60_000, 5_000, 100);
        let items = ItemSystem::new(ItemSettings::default());
        let mut bots = BotController::new();
        precise_bot(&mut bots, Role::Zombie, Position::new(10, 10), &mut rng);
        human(&mut state, 1, Role::Survivor, Position::new(10, 17));
        bots.publish(&mut state.agents);

        let moves: Vec<usize> = (0..8)
            .map(|tick| bots.update(&state, &items, &mut rng, tick * 100))
            .collect();
        assert_eq!(moves, vec![1, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn speed_effect_shortens_bot_cooldown() {
        assert_eq!(cooldown_ticks(Role::Zombie, 1.0), 3);
        assert_eq!(cooldown_ticks(Role::Zombie, 1.5), 2);
        assert_eq!(cooldown_ticks(Role::Survivor, 1.4), 1);
    }

    #[test]
    fn visible_item_beats_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut state = MatchState::new(16, 60_000, 5_000, 100);
        let mut items = ItemSystem::new(ItemSettings::default());
        let mut bots = BotController::new();
        let zombie = precise_bot(&mut bots, Role::Zombie, Position::new(5, 5), &mut rng);
        human(&mut state, 1, Role::Survivor, Position::new(5, 8));
        items.place(SpawnedItem {
            id: Uuid::from_u128(77),
            kind: ItemKind::Frenzy,
            position: Position::new(2, 5),
        });
        // antidotes are invisible to zombies and must not attract them
        items.place(SpawnedItem {
            id: Uuid::from_u128(78),
            kind: ItemKind::Antidote,
            position: Position::new(5, 4),
        });
        bots.publish(&mut state.agents);

        bots.update(&state, &items, &mut rng, 100);
        assert_eq!(position_of(&bots, zombie), Position::new(4, 5));
    }

    #[test]
    fn item_seeking_never_takes_a_random_step() {
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut state = MatchState::new(16, 60_000, 5_000, 100);
            let mut items = ItemSystem::new(ItemSettings::default());
            let mut bots = BotController::new();
            let zombie = precise_bot(&mut bots, Role::Zombie, Position::new(5, 5), &mut rng);
            if let Some(bot) = bots.bots.iter_mut().find(|b| b.id() == zombie) {
                bot.mistake_chance = 1.0;
            }
            items.place(SpawnedItem {
                id: Uuid::from_u128(77),
                kind: ItemKind::Frenzy,
                position: Position::new(2, 5),
            });
            bots.publish(&mut state.agents);

            bots.update(&state, &items, &mut rng, 100);
            assert_eq!(position_of(&bots, zombie), Position::new(4, 5));
        }
    }

    #[test]
    fn boxed_in_bot_stays_put() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut state = MatchState::new(1, 60_000, 5_000, 100);
        let items = ItemSystem::new(ItemSettings::default());
        let mut bots = BotController::new();
        let zombie = precise_bot(&mut bots, Role::Zombie, Position::new(0, 0), &mut rng);
        human(&mut state, 1, Role::Survivor, Position::new(0, 0));
        bots.publish(&mut state.agents);

        assert_eq!(bots.update(&state, &items, &mut rng, 100), 0);
        assert_eq!(position_of(&bots, zombie), Position::new(0, 0));
    }

    #[test]
    fn zombies_usually_avoid_shielded_survivors() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut state = MatchState::new(16, 60_000, 5_000, 100);
        let mut items = ItemSystem::new(ItemSettings::default());
        let survivor = human(&mut state, 1, Role::Survivor, Position::new(5, 8));
        items.effects.add(ActiveEffect {
            id: Uuid::from_u128(90),
            item_kind: ItemKind::Antidote,
            effect_type: EffectType::Defensive,
            affected: EffectTarget::Agent { id: survivor },
            started_at: 0,
            expires_at: None,
            uses_remaining: Some(1),
            source_agent: survivor,
            params: EffectParams::new(),
        });

        let (mut fled, mut chased) = (0, 0);
        for _ in 0..200 {
            let mut bots = BotController::new();
            let zombie = precise_bot(&mut bots, Role::Zombie, Position::new(5, 5), &mut rng);
            bots.update(&state, &items, &mut rng, 100);
            match position_of(&bots, zombie) {
                p if p == Position::new(5, 6) => chased += 1,
                _ => fled += 1,
            }
        }
        assert!(fled > chased);
        assert!(chased > 0);
    }

    #[test]
    fn absorb_applies_role_flips_in_place() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut state = MatchState::new(16, 60_000, 5_000, 100);
        let mut bots = BotController::new();
        let id = bots.spawn_bot(Role::Survivor, Position::new(3, 3), 0, &mut rng);
        bots.publish(&mut state.agents);

        let zombie = Uuid::from_u128(1);
        state
            .agents
            .get_mut(&id)
            .expect("published")
            .infect(zombie, 500);
        bots.absorb(&state.agents);

        let bot = bots.get(id).expect("bot persists");
        assert!(bot.agent.is_zombie());
        assert_eq!(bot.agent.infected_by, Some(zombie));
        assert_eq!(bots.len(), 1);
    }

    #[test]
    fn bot_traits_stay_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut bots = BotController::new();
        for _ in 0..30 {
            bots.spawn_bot(Role::Survivor, Position::new(0, 0), 0, &mut rng);
        }
        for bot in bots.iter() {
            assert!((MIN_SIGHT_RANGE..=MAX_SIGHT_RANGE).contains(&bot.sight_range));
            assert!((MIN_MISTAKE_CHANCE..MAX_MISTAKE_CHANCE).contains(&bot.mistake_chance));
            assert!(bot.agent.is_bot);
        }
        let thirteenth = bots.iter().nth(12).map(|b| b.agent.display_name.as_str());
        assert_eq!(thirteenth, Some("Bot Ash 2"));
    }
}
