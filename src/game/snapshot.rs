//! Snapshot building

use crate::ws::protocol::{
    AgentSnapshot, EffectSnapshot, GameEvent, ItemSnapshot, PlayerInfo, ServerMsg,
};

use super::engine::MatchEngine;
use super::state::MatchState;

/// Builds the public per-tick view for network transmission
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Build a snapshot message
    pub fn build(engine: &MatchEngine, now: u64, events: Vec<GameEvent>) -> ServerMsg {
        let state = engine.state();
        let items = engine.items();

        ServerMsg::Snapshot {
            tick: state.tick,
            remaining_ms: state.remaining_ms(now),
            agents: state.agents.values().map(AgentSnapshot::from).collect(),
            items: items.spawned().iter().map(|i| i.to_snapshot()).collect::<Vec<ItemSnapshot>>(),
            team_effects: items
                .effects
                .team_effects(now)
                .map(EffectSnapshot::from)
                .collect(),
            events,
        }
    }

    /// Everyone in the match, for join confirmations
    pub fn roster(state: &MatchState) -> Vec<PlayerInfo> {
        state
            .agents
            .values()
            .map(|a| PlayerInfo {
                agent_id: a.id,
                display_name: a.display_name.clone(),
                is_bot: a.is_bot,
            })
            .collect()
    }
}
