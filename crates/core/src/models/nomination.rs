//! Nomination, voting, and resolution records

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One accusation event on a given day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nomination {
    pub id: Uuid,
    pub day: u32,
    pub nominee_seat: u8,
    pub nominator_seat: u8,
    pub ts: DateTime<Utc>,
    pub vote_started: bool,
    pub vote_completed: bool,
    /// Host override of the effective vote total; `None` means use the
    /// recorded yes-count
    pub manual_total: Option<i64>,
}

impl Nomination {
    pub fn new(day: u32, nominee_seat: u8, nominator_seat: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            day,
            nominee_seat,
            nominator_seat,
            ts: Utc::now(),
            vote_started: false,
            vote_completed: false,
            manual_total: None,
        }
    }
}

/// One recorded vote. `auto` marks votes the engine cast while skipping an
/// ineligible voter, as opposed to a caller's cast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: Uuid,
    pub day: u32,
    pub nomination_id: Uuid,
    pub nominee_seat: u8,
    pub voter_seat: u8,
    pub player_id: Uuid,
    pub value: bool,
    pub auto: bool,
    pub ts: DateTime<Utc>,
}

/// The single in-flight voting process for a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSession {
    pub nomination_id: Uuid,
    /// Voters in seat order; every occupied non-storyteller seat appears
    pub order: Vec<Uuid>,
    pub current_index: usize,
    pub finished: bool,
    pub votes: BTreeMap<Uuid, bool>,
}

impl VoteSession {
    pub fn new(nomination_id: Uuid, order: Vec<Uuid>) -> Self {
        Self {
            nomination_id,
            order,
            current_index: 0,
            finished: false,
            votes: BTreeMap::new(),
        }
    }

    /// The player whose turn it is, if the session is still open.
    pub fn current_voter(&self) -> Option<Uuid> {
        if self.finished || self.current_index >= self.order.len() {
            return None;
        }
        Some(self.order[self.current_index])
    }
}

/// The host-recorded outcome of one day's resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub day: u32,
    pub nominee_seat: Option<u8>,
    /// `None` means "no execution today"
    pub executed_seat: Option<u8>,
    pub votes_for: usize,
    /// Alive count at recording time; later threshold math for this day
    /// snapshots from here
    pub alive_count: usize,
    pub nomination_id: Option<Uuid>,
    /// `Some(true)` killed the target, `Some(false)` spared them despite the
    /// block, `None` recorded the tally only
    pub target_dead: Option<bool>,
    pub ts: DateTime<Utc>,
}

/// A night action noted by the storyteller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub night: u32,
    pub actor_seat: u8,
    pub action_type: String,
    pub target: Option<u8>,
    pub payload: serde_json::Value,
    pub ts: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_nomination_has_no_vote_state() {
        let nomination = Nomination::new(2, 5, 3);
        assert!(!nomination.vote_started);
        assert!(!nomination.vote_completed);
        assert!(nomination.manual_total.is_none());
    }

    #[test]
    fn test_current_voter_none_when_finished() {
        let voters = vec![Uuid::new_v4(), Uuid::new_v4()];
        let mut session = VoteSession::new(Uuid::new_v4(), voters.clone());
        assert_eq!(session.current_voter(), Some(voters[0]));

        session.finished = true;
        assert_eq!(session.current_voter(), None);
    }

    #[test]
    fn test_current_voter_none_past_end() {
        let mut session = VoteSession::new(Uuid::new_v4(), vec![Uuid::new_v4()]);
        session.current_index = 1;
        assert_eq!(session.current_voter(), None);
    }
}
