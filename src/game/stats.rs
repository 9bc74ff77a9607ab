//! End-of-match outcome and derived statistics

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::agent::AgentId;
use super::state::MatchState;

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Every survivor was infected
    ZombiesWin,
    /// Clock ran out with survivors left
    Timeout,
    /// All humans left
    Abandoned,
    /// Stopped from outside
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStat {
    pub agent_id: AgentId,
    pub display_name: String,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStatistics {
    pub total_infections: usize,
    pub duration_ms: u64,
    /// Relative to match start
    pub first_infection_ms: Option<u64>,
    /// Infection count
    pub top_infector: Option<AgentStat>,
    /// Milliseconds survived before the first infection
    pub longest_survivor: Option<AgentStat>,
    pub final_survivors: usize,
    pub final_zombies: usize,
}

/// Final result of a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub reason: EndReason,
    pub winner: Option<AgentStat>,
    pub stats: MatchStatistics,
}

fn display_name(state: &MatchState, id: AgentId) -> String {
    state
        .agents
        .get(&id)
        .map(|a| a.display_name.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Compute statistics over the infection log and final agents
pub fn compute_statistics(state: &MatchState, now: u64) -> MatchStatistics {
    let start = state.started_at.unwrap_or(now);

    MatchStatistics {
        total_infections: state.infection_log.len(),
        duration_ms: now.saturating_sub(start),
        first_infection_ms: state
            .infection_log
            .first()
            .map(|record| record.at.saturating_sub(start)),
        top_infector: top_infector(state),
        longest_survivor: longest_survivor(state, start),
        final_survivors: state.survivor_count(),
        final_zombies: state.zombie_count(),
    }
}

/// Zombie with the most infections; ties go to whoever reached the count first
fn top_infector(state: &MatchState) -> Option<AgentStat> {
    let mut counts: HashMap<AgentId, u64> = HashMap::new();
    let mut best: Option<(AgentId, u64)> = None;

    // Walking the log in order, a strict improvement is the first to reach a count
    for record in &state.infection_log {
        let count = counts.entry(record.zombie).or_insert(0);
        *count += 1;
        if best.map_or(true, |(_, top)| *count > top) {
            best = Some((record.zombie, *count));
        }
    }

    best.map(|(agent_id, value)| AgentStat {
        agent_id,
        display_name: display_name(state, agent_id),
        value,
    })
}

/// Victim who lasted longest before their first infection
fn longest_survivor(state: &MatchState, start: u64) -> Option<AgentStat> {
    let mut first_infection: Vec<(AgentId, u64)> = Vec::new();
    for record in &state.infection_log {
        if !first_infection.iter().any(|(id, _)| *id == record.victim) {
            first_infection.push((record.victim, record.at));
        }
    }

    first_infection
        .into_iter()
        .map(|(agent_id, at)| {
            let joined = state
                .agents
                .get(&agent_id)
                .map(|a| a.joined_at.max(start))
                .unwrap_or(start);
            (agent_id, at.saturating_sub(joined))
        })
        // earliest victim wins a tie
        .fold(None, |best: Option<(AgentId, u64)>, (id, survived)| match best {
            Some((_, top)) if top >= survived => best,
            _ => Some((id, survived)),
        })
        .map(|(agent_id, value)| AgentStat {
            agent_id,
            display_name: display_name(state, agent_id),
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::agent::{Agent, Role};
    use crate::game::grid::Position;
    use crate::game::state::InfectionRecord;
    use uuid::Uuid;

    fn state() -> MatchState {
        let mut state = MatchState::new(32, 60_000, 5_000, 100);
        state.started_at = Some(10_000);
        for (id, role) in [(1, Role::Zombie), (2, Role::Zombie), (3, Role::Zombie), (4, Role::Zombie), (5, Role::Survivor)] {
            let id = Uuid::from_u128(id);
            state.agents.insert(
                id,
                Agent::new(id, format!("agent{}", id.as_u128()), false, role, Position::new(0, 0), 10_000),
            );
        }
        state
    }

    fn infect(state: &mut MatchState, at: u64, victim: u128, zombie: u128) {
        state.infection_log.push(InfectionRecord {
            at,
            victim: Uuid::from_u128(victim),
            zombie: Uuid::from_u128(zombie),
            survivors_remaining: 0,
        });
    }

    #[test]
    fn empty_log_yields_no_highlights() {
        let stats = compute_statistics(&state(), 40_000);
        assert_eq!(stats.total_infections, 0);
        assert_eq!(stats.duration_ms, 30_000);
        assert_eq!(stats.first_infection_ms, None);
        assert!(stats.top_infector.is_none());
        assert!(stats.longest_survivor.is_none());
        assert_eq!(stats.final_survivors, 1);
        assert_eq!(stats.final_zombies, 4);
    }

    #[test]
    fn top_infector_tie_goes_to_first_to_reach_count() {
        let mut state = state();
        infect(&mut state, 12_000, 3, 2);
        infect(&mut state, 13_000, 4, 1);
        infect(&mut state, 15_000, 2, 1);
        infect(&mut state, 18_000, 1, 2);
        // agents 1 and 2 both have two; agent 1 got there at 15s

        let stats = compute_statistics(&state, 20_000);
        let top = stats.top_infector.expect("has infector");
        assert_eq!(top.agent_id, Uuid::from_u128(1));
        assert_eq!(top.value, 2);
        assert_eq!(stats.first_infection_ms, Some(2_000));
        assert_eq!(stats.total_infections, 4);
    }

    #[test]
    fn longest_survivor_uses_first_infection_and_skips_never_infected() {
        let mut state = state();
        infect(&mut state, 12_000, 3, 2);
        infect(&mut state, 19_000, 4, 1);
        // agent 3 healed and infected again later: only the first counts
        infect(&mut state, 25_000, 3, 1);

        let stats = compute_statistics(&state, 30_000);
        let longest = stats.longest_survivor.expect("has victims");
        assert_eq!(longest.agent_id, Uuid::from_u128(4));
        assert_eq!(longest.value, 9_000);
        assert_eq!(longest.display_name, "agent4");
    }
}
