//! Player and life-status models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RoleAttachment;

/// A player's life status as the storyteller tracks it.
///
/// The two `FakeDead*` states look dead to the town but the player is
/// secretly alive; projections mask them to the matching real-dead state for
/// everyone but the host and the player themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStatus {
    Alive,
    FakeDeadVote,
    FakeDeadNoVote,
    DeadVote,
    DeadNoVote,
}

impl LifeStatus {
    /// Counts toward the execution threshold. Fake-dead players do not: the
    /// town treats them as dead.
    pub fn counts_as_alive(self) -> bool {
        matches!(self, LifeStatus::Alive)
    }

    /// What a viewer without secret access sees.
    pub fn masked(self) -> LifeStatus {
        match self {
            LifeStatus::FakeDeadVote => LifeStatus::DeadVote,
            LifeStatus::FakeDeadNoVote => LifeStatus::DeadNoVote,
            other => other,
        }
    }
}

/// A participant in a room. Seat 0 is the storyteller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub seat: u8,
    pub is_host: bool,
    pub life_status: LifeStatus,
    pub ghost_vote_used: bool,
    /// Committed (active) role, set by finalize
    pub role_id: Option<String>,
    /// Committed attachment selections, sorted by (slot, index)
    pub role_attachments: Vec<RoleAttachment>,
    /// Free-text storyteller note, host-visible only
    pub note: String,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    pub fn new(name: String, seat: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            seat,
            is_host: false,
            life_status: LifeStatus::Alive,
            ghost_vote_used: false,
            role_id: None,
            role_attachments: Vec::new(),
            note: String::new(),
            joined_at: Utc::now(),
        }
    }

    /// The storyteller, always at seat 0.
    pub fn storyteller(name: String) -> Self {
        let mut player = Self::new(name, 0);
        player.is_host = true;
        player
    }

    /// Whether this player may cast a vote right now: alive, or dead with an
    /// unspent ghost vote.
    pub fn can_vote(&self) -> bool {
        match self.life_status {
            LifeStatus::Alive => true,
            LifeStatus::FakeDeadVote | LifeStatus::DeadVote => !self.ghost_vote_used,
            LifeStatus::FakeDeadNoVote | LifeStatus::DeadNoVote => false,
        }
    }

    /// Apply a host-set life status, syncing the ghost-vote flag the way the
    /// status implies (the `NoVote` forms mean the ghost vote is spent).
    pub fn set_status(&mut self, status: LifeStatus) {
        self.life_status = status;
        self.ghost_vote_used = matches!(
            status,
            LifeStatus::FakeDeadNoVote | LifeStatus::DeadNoVote
        );
    }

    /// Reset to a fresh, living player with no role. Used by room reset.
    pub fn revive(&mut self) {
        self.life_status = LifeStatus::Alive;
        self.ghost_vote_used = false;
        self.role_id = None;
        self.role_attachments.clear();
    }
}
