//! Room model - the authoritative state for one game

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ActionRecord, ExecutionRecord, Nomination, Player, RoleAssignment, VoteRecord, VoteSession,
};

/// Room phase ring. Transitions are host-issued; see `phase.rs` for the
/// counter rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    Night,
    Day,
    Vote,
    Resolve,
    DayEnd,
}

impl Phase {
    /// Next phase on the forward ring. Resolve loops back to night; day_end
    /// is only reached by an explicit change.
    pub fn succ(self) -> Phase {
        match self {
            Phase::Lobby => Phase::Night,
            Phase::Night => Phase::Day,
            Phase::Day => Phase::Vote,
            Phase::Vote => Phase::Resolve,
            Phase::Resolve => Phase::Night,
            Phase::DayEnd => Phase::Night,
        }
    }

    /// Previous phase on the ring. Lobby is its own predecessor: the start
    /// of the game is not revertible.
    pub fn pred(self) -> Phase {
        match self {
            Phase::Lobby => Phase::Lobby,
            Phase::Night => Phase::Resolve,
            Phase::Day => Phase::Night,
            Phase::Vote => Phase::Day,
            Phase::Resolve => Phase::Vote,
            Phase::DayEnd => Phase::Resolve,
        }
    }
}

/// Final outcome of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Blue,
    Red,
    Storyteller,
}

/// One entry in the room's event journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub kind: String,
    pub payload: serde_json::Value,
}

/// A single game instance: players, assignments, nominations, votes, and
/// phase bookkeeping. All mutation goes through the engine modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub join_code: String,
    pub script_id: String,
    pub phase: Phase,
    pub day: u32,
    pub night: u32,
    pub game_result: Option<GameResult>,
    pub host_player_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Seed the last assignment generation used, for reproducibility
    pub assignments_seed: Option<u64>,
    pub players: HashMap<Uuid, Player>,
    pub nominations: Vec<Nomination>,
    pub votes: Vec<VoteRecord>,
    pub actions: Vec<ActionRecord>,
    pub executions: Vec<ExecutionRecord>,
    pub vote_session: Option<VoteSession>,
    pub pending_assignments: BTreeMap<u8, RoleAssignment>,
    pub journal: Vec<JournalEntry>,
}

impl Room {
    pub fn new(script_id: impl Into<String>, host_name: String) -> Self {
        let host = Player::storyteller(host_name);
        let host_player_id = host.id;
        let mut players = HashMap::new();
        players.insert(host.id, host);

        Self {
            id: Uuid::new_v4(),
            join_code: generate_join_code(),
            script_id: script_id.into(),
            phase: Phase::Lobby,
            day: 0,
            night: 0,
            game_result: None,
            host_player_id,
            created_at: Utc::now(),
            assignments_seed: None,
            players,
            nominations: Vec::new(),
            votes: Vec::new(),
            actions: Vec::new(),
            executions: Vec::new(),
            vote_session: None,
            pending_assignments: BTreeMap::new(),
            journal: Vec::new(),
        }
    }

    pub fn player(&self, player_id: Uuid) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn player_mut(&mut self, player_id: Uuid) -> Option<&mut Player> {
        self.players.get_mut(&player_id)
    }

    /// First player occupying `seat`, by join order. With a seat conflict
    /// this is still deterministic.
    pub fn player_by_seat(&self, seat: u8) -> Option<&Player> {
        self.ordered_players()
            .into_iter()
            .find(|player| player.seat == seat)
    }

    /// All players sorted by (seat, joined_at, id). The id tiebreak keeps
    /// projections byte-stable even with seat conflicts.
    pub fn ordered_players(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by(|a, b| {
            (a.seat, a.joined_at, a.id).cmp(&(b.seat, b.joined_at, b.id))
        });
        players
    }

    /// Players in the game proper: seat > 0 and not the storyteller.
    pub fn seated_players(&self) -> Vec<&Player> {
        self.ordered_players()
            .into_iter()
            .filter(|player| player.seat > 0 && !player.is_host)
            .collect()
    }

    pub fn seated_count(&self) -> usize {
        self.seated_players().len()
    }

    /// Players counting toward the execution threshold right now.
    pub fn alive_count(&self) -> usize {
        self.seated_players()
            .iter()
            .filter(|player| player.life_status.counts_as_alive())
            .count()
    }

    pub fn next_seat(&self) -> u8 {
        self.seated_count() as u8 + 1
    }

    pub fn nomination(&self, nomination_id: Uuid) -> Option<&Nomination> {
        self.nominations.iter().find(|n| n.id == nomination_id)
    }

    pub fn nomination_mut(&mut self, nomination_id: Uuid) -> Option<&mut Nomination> {
        self.nominations.iter_mut().find(|n| n.id == nomination_id)
    }

    /// Seats claimed by more than one player.
    pub fn conflicted_seats(&self) -> Vec<u8> {
        let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
        for player in self.players.values() {
            if player.seat > 0 {
                *counts.entry(player.seat).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(seat, _)| seat)
            .collect()
    }

    /// Append an entry to the room journal.
    pub(crate) fn record_event(&mut self, kind: &str, payload: serde_json::Value) {
        self.journal.push(JournalEntry {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            kind: kind.to_string(),
            payload,
        });
    }
}

/// Short shareable join code.
fn generate_join_code() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_uppercase()
}
