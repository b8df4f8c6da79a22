//! Phase state machine
//!
//! Host-driven transitions over the lobby/night/day/vote/resolve/day_end
//! ring. Phase changes never validate game preconditions; commands executed
//! within a phase carry their own checks.

use serde_json::json;

use crate::error::{Error, Result};
use crate::models::{GameResult, Phase, Room, Script};

impl Room {
    /// Move the room to `target`. Same-phase targets are a no-op.
    ///
    /// Entering night from lobby, resolve, or day_end advances the night
    /// counter; entering day from night advances the day counter. Leaving
    /// the vote phase discards any open vote session.
    pub fn change_phase(&mut self, target: Phase) -> Phase {
        if self.phase == target {
            return self.phase;
        }

        let previous = self.phase;
        if target != Phase::Vote {
            self.vote_session = None;
        }
        match target {
            Phase::Night => {
                if matches!(previous, Phase::Lobby | Phase::Resolve | Phase::DayEnd) {
                    self.night += 1;
                }
            }
            Phase::Day => {
                if previous == Phase::Night {
                    self.day += 1;
                }
            }
            _ => {}
        }
        self.phase = target;

        self.record_event(
            "phase_changed",
            json!({ "from": previous, "to": target, "day": self.day, "night": self.night }),
        );
        tracing::debug!(room_id = %self.id, ?previous, ?target, "Phase changed");
        self.phase
    }

    /// Step forward along the ring.
    pub fn advance_phase(&mut self) -> Phase {
        self.change_phase(self.phase.succ())
    }

    /// Step backward along the ring. In the lobby this is a no-op.
    pub fn regress_phase(&mut self) -> Phase {
        self.change_phase(self.phase.pred())
    }

    /// Return the room to a fresh lobby: counters zeroed, nominations,
    /// votes, actions, executions, assignments, and result cleared, every
    /// player revived. Seats and the journal survive.
    pub fn reset(&mut self) {
        self.phase = Phase::Lobby;
        self.day = 0;
        self.night = 0;
        self.assignments_seed = None;
        self.game_result = None;
        self.nominations.clear();
        self.votes.clear();
        self.actions.clear();
        self.executions.clear();
        self.vote_session = None;
        self.pending_assignments.clear();

        for player in self.players.values_mut() {
            player.revive();
        }

        self.record_event("game_reset", json!({}));
    }

    /// Set or clear the game result. A storyteller win must be enabled by
    /// the script's rules.
    pub fn set_game_result(&mut self, script: &Script, result: Option<GameResult>) -> Result<()> {
        if result == Some(GameResult::Storyteller) && !script.rules.storyteller_win_available {
            return Err(Error::Validation(
                "this script does not allow a storyteller win".into(),
            ));
        }
        self.game_result = result;
        self.record_event("game_result_set", json!({ "result": result }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScriptRules;

    fn sample_script(storyteller_win: bool) -> Script {
        Script {
            id: "sample".into(),
            name: "Sample".into(),
            version: "1.0.0".into(),
            roles: Vec::new(),
            team_distribution: Default::default(),
            rules: ScriptRules {
                storyteller_win_available: storyteller_win,
            },
        }
    }

    fn room() -> Room {
        Room::new("sample", "Ada".into())
    }

    #[test]
    fn test_first_night_and_day_increment_counters() {
        let mut room = room();
        room.change_phase(Phase::Night);
        assert_eq!((room.night, room.day), (1, 0));
        room.change_phase(Phase::Day);
        assert_eq!((room.night, room.day), (1, 1));
    }

    #[test]
    fn test_resolve_loop_increments_night() {
        let mut room = room();
        room.change_phase(Phase::Night);
        room.change_phase(Phase::Day);
        room.change_phase(Phase::Vote);
        room.change_phase(Phase::Resolve);
        room.change_phase(Phase::Night);
        assert_eq!(room.night, 2);
        room.change_phase(Phase::Day);
        assert_eq!(room.day, 2);
    }

    #[test]
    fn test_day_end_detour_still_increments_night() {
        let mut room = room();
        room.change_phase(Phase::Night);
        room.change_phase(Phase::Day);
        room.change_phase(Phase::Vote);
        room.change_phase(Phase::Resolve);
        room.change_phase(Phase::DayEnd);
        room.change_phase(Phase::Night);
        assert_eq!(room.night, 2);
    }

    #[test]
    fn test_same_phase_is_noop() {
        let mut room = room();
        room.change_phase(Phase::Night);
        let night = room.night;
        room.change_phase(Phase::Night);
        assert_eq!(room.night, night);
    }

    #[test]
    fn test_entering_day_from_vote_does_not_increment() {
        let mut room = room();
        room.change_phase(Phase::Night);
        room.change_phase(Phase::Day);
        room.change_phase(Phase::Vote);
        room.change_phase(Phase::Day);
        assert_eq!(room.day, 1);
    }

    #[test]
    fn test_leaving_vote_discards_session() {
        use crate::models::VoteSession;
        let mut room = room();
        room.change_phase(Phase::Vote);
        room.vote_session = Some(VoteSession::new(uuid::Uuid::new_v4(), Vec::new()));
        room.change_phase(Phase::Resolve);
        assert!(room.vote_session.is_none());
    }

    #[test]
    fn test_reset_zeroes_everything_but_keeps_seats() {
        use crate::models::Player;
        let mut room = room();
        let player = Player::new("Bea".into(), 1);
        let player_id = player.id;
        room.players.insert(player.id, player);

        room.change_phase(Phase::Night);
        room.change_phase(Phase::Day);
        room.nominations.push(crate::models::Nomination::new(1, 1, 1));
        room.game_result = Some(GameResult::Blue);
        room.reset();

        assert_eq!(room.phase, Phase::Lobby);
        assert_eq!((room.day, room.night), (0, 0));
        assert!(room.nominations.is_empty());
        assert!(room.game_result.is_none());
        assert_eq!(room.player(player_id).unwrap().seat, 1);
    }

    #[test]
    fn test_storyteller_win_gated_by_script() {
        let mut room = room();
        let plain = sample_script(false);
        assert!(room
            .set_game_result(&plain, Some(GameResult::Storyteller))
            .is_err());
        assert!(room.game_result.is_none());

        let permissive = sample_script(true);
        room.set_game_result(&permissive, Some(GameResult::Storyteller))
            .unwrap();
        assert_eq!(room.game_result, Some(GameResult::Storyteller));

        room.set_game_result(&permissive, None).unwrap();
        assert!(room.game_result.is_none());
    }

    #[test]
    fn test_advance_and_regress_follow_ring() {
        let mut room = room();
        room.advance_phase();
        assert_eq!(room.phase, Phase::Night);
        room.advance_phase();
        assert_eq!(room.phase, Phase::Day);
        room.regress_phase();
        assert_eq!(room.phase, Phase::Night);
        // Backward from night goes to resolve, not lobby.
        room.regress_phase();
        assert_eq!(room.phase, Phase::Resolve);
    }
}
