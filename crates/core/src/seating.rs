//! Seat registry
//!
//! Joining, seat changes, life status, and storyteller notes. Duplicate
//! seats are legal here and surfaced as conflicts by the projector; nothing
//! in this module blocks on them.

use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{LifeStatus, Phase, Player, Room};

/// Highest seat number a room accepts.
pub const MAX_SEAT: u8 = 20;

impl Room {
    /// Add a player at the next free seat and return their id.
    pub fn add_player(&mut self, name: String) -> Result<Uuid> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("player name must not be empty".into()));
        }
        let seat = self.next_seat();
        if seat > MAX_SEAT {
            return Err(Error::Validation(format!("room is full ({MAX_SEAT} seats)")));
        }
        let player = Player::new(name.clone(), seat);
        let player_id = player.id;
        self.players.insert(player_id, player);
        self.record_event("player_joined", json!({ "name": name, "seat": seat }));
        Ok(player_id)
    }

    /// Move a player to `seat`.
    ///
    /// The host may reseat anyone at any time; players may move only
    /// themselves and only in the lobby. Collisions are allowed and flagged
    /// in projections instead of rejected.
    pub fn update_seat(&mut self, player_id: Uuid, seat: u8, as_host: bool) -> Result<()> {
        if seat > MAX_SEAT {
            return Err(Error::Validation(format!(
                "seat {seat} is out of range (max {MAX_SEAT})"
            )));
        }
        if !as_host && self.phase != Phase::Lobby {
            return Err(Error::InvalidState(
                "seats can only be changed in the lobby".into(),
            ));
        }
        let player = self
            .player_mut(player_id)
            .ok_or_else(|| Error::NotFound(format!("player {player_id}")))?;
        if player.is_host && seat != 0 {
            return Err(Error::Validation("the storyteller keeps seat 0".into()));
        }
        player.seat = seat;
        let name = player.name.clone();
        self.record_event("seat_changed", json!({ "player": name, "seat": seat }));
        Ok(())
    }

    /// Host-set life status; syncs the ghost-vote flag.
    pub fn set_player_status(&mut self, player_id: Uuid, status: LifeStatus) -> Result<()> {
        let player = self
            .player_mut(player_id)
            .ok_or_else(|| Error::NotFound(format!("player {player_id}")))?;
        player.set_status(status);
        let name = player.name.clone();
        self.record_event("status_changed", json!({ "player": name, "status": status }));
        Ok(())
    }

    /// Host-only free-text note on a player.
    pub fn set_player_note(&mut self, player_id: Uuid, note: String) -> Result<()> {
        let player = self
            .player_mut(player_id)
            .ok_or_else(|| Error::NotFound(format!("player {player_id}")))?;
        player.note = note;
        let name = player.name.clone();
        self.record_event("player_note_updated", json!({ "player": name }));
        Ok(())
    }
}
