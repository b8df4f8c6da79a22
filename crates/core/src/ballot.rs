//! Nomination and vote engine
//!
//! One nomination at a time may be voted on. The voter order covers every
//! occupied non-storyteller seat ascending; ineligible voters are skipped
//! with an auto-recorded `false` so the tally always lines up with the
//! order.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{LifeStatus, Nomination, Room, VoteRecord, VoteSession};

impl Room {
    /// Open a nomination for the current day.
    ///
    /// Rejected while a vote is in flight; otherwise any number of
    /// unvoted nominations may coexist on the same day.
    pub fn nominate(&mut self, nominee_seat: u8, nominator_seat: u8) -> Result<Uuid> {
        if self.has_open_vote() {
            return Err(Error::InvalidState(
                "a vote is in progress; finish or revert it first".into(),
            ));
        }
        if self.player_by_seat(nominee_seat).is_none() {
            return Err(Error::NotFound(format!("no player at seat {nominee_seat}")));
        }
        if self.player_by_seat(nominator_seat).is_none() {
            return Err(Error::NotFound(format!("no player at seat {nominator_seat}")));
        }

        let nomination = Nomination::new(self.day, nominee_seat, nominator_seat);
        let nomination_id = nomination.id;
        self.nominations.push(nomination);
        self.record_event(
            "nominated",
            json!({ "nominee": nominee_seat, "by": nominator_seat, "day": self.day }),
        );
        Ok(nomination_id)
    }

    /// Begin the ordered vote for a nomination.
    pub fn start_vote(&mut self, nomination_id: Uuid) -> Result<()> {
        if self.has_open_vote() {
            return Err(Error::InvalidState("another vote is in progress".into()));
        }
        let day = self.day;
        let nomination = self
            .nomination(nomination_id)
            .ok_or_else(|| Error::NotFound(format!("nomination {nomination_id}")))?;
        if nomination.day != day {
            return Err(Error::InvalidState(
                "only today's nominations can be voted on".into(),
            ));
        }
        if nomination.vote_started {
            return Err(Error::InvalidState("this vote has already run".into()));
        }

        let order: Vec<Uuid> = self.seated_players().iter().map(|p| p.id).collect();
        let mut session = VoteSession::new(nomination_id, order);
        if let Some(nomination) = self.nomination_mut(nomination_id) {
            nomination.vote_started = true;
            nomination.vote_completed = false;
        }
        // Walk past any leading ineligible voters (or close an empty order).
        self.advance_session(&mut session);
        self.vote_session = Some(session);
        self.record_event("vote_started", json!({ "nomination_id": nomination_id }));
        Ok(())
    }

    /// Record the current voter's vote and advance the pointer.
    ///
    /// `player_id` must be the player at the pointer; authorization (self or
    /// host-on-behalf) is the command layer's job.
    pub fn cast_vote(&mut self, player_id: Uuid, value: bool) -> Result<()> {
        let mut session = self
            .vote_session
            .take()
            .ok_or_else(|| Error::InvalidState("no vote is in progress".into()))?;

        let result = self.cast_into(&mut session, player_id, value);
        self.vote_session = Some(session);
        result
    }

    fn cast_into(&mut self, session: &mut VoteSession, player_id: Uuid, value: bool) -> Result<()> {
        if session.finished {
            return Err(Error::InvalidTurn("this vote has finished".into()));
        }
        match session.current_voter() {
            Some(current) if current == player_id => {}
            _ => {
                return Err(Error::InvalidTurn(
                    "it is not this player's turn to vote".into(),
                ))
            }
        }

        self.apply_vote(session, player_id, value, false)?;
        self.advance_session(session);
        Ok(())
    }

    /// Clear a nomination's vote state: flags, recorded votes, and the
    /// session if it was the active one. The nomination itself stays and can
    /// be voted again; it no longer counts toward any day's resolution.
    pub fn revert_nomination(&mut self, nomination_id: Uuid) -> Result<()> {
        let nomination = self
            .nomination_mut(nomination_id)
            .ok_or_else(|| Error::NotFound(format!("nomination {nomination_id}")))?;
        nomination.vote_started = false;
        nomination.vote_completed = false;
        nomination.manual_total = None;

        self.votes.retain(|vote| vote.nomination_id != nomination_id);
        if self
            .vote_session
            .as_ref()
            .is_some_and(|session| session.nomination_id == nomination_id)
        {
            self.vote_session = None;
        }
        self.record_event("nomination_reverted", json!({ "nomination_id": nomination_id }));
        Ok(())
    }

    /// Host override of a nomination's effective total. `None` restores the
    /// recorded yes-count. Any integer is accepted, including one below the
    /// recorded count.
    pub fn set_manual_total(&mut self, nomination_id: Uuid, total: Option<i64>) -> Result<()> {
        let nomination = self
            .nomination_mut(nomination_id)
            .ok_or_else(|| Error::NotFound(format!("nomination {nomination_id}")))?;
        nomination.manual_total = total;
        self.record_event(
            "nomination_total_updated",
            json!({ "nomination_id": nomination_id, "total": total }),
        );
        Ok(())
    }

    pub fn has_open_vote(&self) -> bool {
        self.vote_session
            .as_ref()
            .is_some_and(|session| !session.finished)
    }

    /// Record one vote: the room-level record, the session entry, ghost-vote
    /// consumption on a yes, and completion bookkeeping.
    fn apply_vote(
        &mut self,
        session: &mut VoteSession,
        player_id: Uuid,
        value: bool,
        auto: bool,
    ) -> Result<()> {
        let nomination_id = session.nomination_id;
        let (day, nominee_seat) = {
            let nomination = self
                .nomination(nomination_id)
                .ok_or_else(|| Error::NotFound(format!("nomination {nomination_id}")))?;
            (nomination.day, nomination.nominee_seat)
        };
        let player = self
            .player(player_id)
            .ok_or_else(|| Error::NotFound(format!("player {player_id}")))?;
        let voter_seat = player.seat;

        self.votes.push(VoteRecord {
            id: Uuid::new_v4(),
            day,
            nomination_id,
            nominee_seat,
            voter_seat,
            player_id,
            value,
            auto,
            ts: Utc::now(),
        });
        session.votes.insert(player_id, value);
        session.current_index += 1;

        // A yes from a ghost voter spends the ghost vote.
        if value {
            if let Some(player) = self.player_mut(player_id) {
                match player.life_status {
                    LifeStatus::DeadVote => {
                        player.ghost_vote_used = true;
                        player.life_status = LifeStatus::DeadNoVote;
                    }
                    LifeStatus::FakeDeadVote => {
                        player.ghost_vote_used = true;
                        player.life_status = LifeStatus::FakeDeadNoVote;
                    }
                    _ => {}
                }
            }
        }

        if session.current_index >= session.order.len() {
            self.close_session(session);
        }

        self.record_event(
            "vote_cast",
            json!({
                "nomination_id": nomination_id,
                "voter": voter_seat,
                "value": value,
                "auto": auto,
            }),
        );
        Ok(())
    }

    /// Advance the pointer past ineligible voters, auto-casting `false` for
    /// each, and close the session when the order is exhausted.
    fn advance_session(&mut self, session: &mut VoteSession) {
        while !session.finished {
            let Some(current) = session.current_voter() else {
                self.close_session(session);
                break;
            };
            match self.player(current) {
                None => {
                    // A player that vanished is skipped without a record.
                    session.votes.insert(current, false);
                    session.current_index += 1;
                }
                Some(player) if player.can_vote() => break,
                Some(_) => {
                    // Ineligible voters never get a turn; their no is recorded
                    // for them.
                    if self.apply_vote(session, current, false, true).is_err() {
                        session.current_index += 1;
                    }
                }
            }
        }
    }

    fn close_session(&mut self, session: &mut VoteSession) {
        session.finished = true;
        let nomination_id = session.nomination_id;
        if let Some(nomination) = self.nomination_mut(nomination_id) {
            nomination.vote_completed = true;
        }
    }

    /// Recorded yes votes for a nomination.
    pub fn yes_votes(&self, nomination_id: Uuid) -> usize {
        self.votes
            .iter()
            .filter(|vote| vote.nomination_id == nomination_id && vote.value)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_with_players(count: usize) -> Room {
        let mut room = Room::new("sample", "Ada".into());
        for i in 0..count {
            room.add_player(format!("P{}", i + 1)).unwrap();
        }
        room
    }

    fn seat_player(room: &Room, seat: u8) -> Uuid {
        room.player_by_seat(seat).unwrap().id
    }

    #[test]
    fn test_nominate_rejected_while_vote_open() {
        let mut room = room_with_players(3);
        let first = room.nominate(1, 2).unwrap();
        room.start_vote(first).unwrap();
        let err = room.nominate(2, 3).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_multiple_unvoted_nominations_coexist() {
        let mut room = room_with_players(3);
        room.nominate(1, 2).unwrap();
        room.nominate(2, 3).unwrap();
        room.nominate(3, 1).unwrap();
        assert_eq!(room.nominations.len(), 3);
    }

    #[test]
    fn test_vote_order_is_ascending_seats() {
        let mut room = room_with_players(4);
        let nomination = room.nominate(3, 1).unwrap();
        room.start_vote(nomination).unwrap();
        let session = room.vote_session.as_ref().unwrap();
        let seats: Vec<u8> = session
            .order
            .iter()
            .map(|id| room.player(*id).unwrap().seat)
            .collect();
        assert_eq!(seats, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_five_eligible_voters_take_exactly_five_casts() {
        let mut room = room_with_players(5);
        let nomination = room.nominate(2, 1).unwrap();
        room.start_vote(nomination).unwrap();

        for seat in 1..=5u8 {
            let voter = seat_player(&room, seat);
            room.cast_vote(voter, seat % 2 == 0).unwrap();
        }
        assert!(room.vote_session.as_ref().unwrap().finished);
        assert!(room.nomination(nomination).unwrap().vote_completed);

        // A sixth cast is rejected with no side effect.
        let voter = seat_player(&room, 1);
        let err = room.cast_vote(voter, true).unwrap_err();
        assert!(matches!(err, Error::InvalidTurn(_)));
        assert_eq!(room.votes.len(), 5);
    }

    #[test]
    fn test_out_of_turn_cast_rejected() {
        let mut room = room_with_players(3);
        let nomination = room.nominate(1, 2).unwrap();
        room.start_vote(nomination).unwrap();

        let third = seat_player(&room, 3);
        let err = room.cast_vote(third, true).unwrap_err();
        assert!(matches!(err, Error::InvalidTurn(_)));
        assert!(room.votes.is_empty());
    }

    #[test]
    fn test_ineligible_voters_are_skipped_with_auto_false() {
        let mut room = room_with_players(4);
        let dead = seat_player(&room, 2);
        room.set_player_status(dead, LifeStatus::DeadNoVote).unwrap();

        let nomination = room.nominate(3, 1).unwrap();
        room.start_vote(nomination).unwrap();

        room.cast_vote(seat_player(&room, 1), true).unwrap();
        // Seat 2 was skipped; the pointer is on seat 3.
        let session = room.vote_session.as_ref().unwrap();
        assert_eq!(session.current_voter(), Some(seat_player(&room, 3)));
        assert_eq!(session.votes.get(&dead), Some(&false));
        let auto_votes: Vec<&VoteRecord> =
            room.votes.iter().filter(|vote| vote.auto).collect();
        assert_eq!(auto_votes.len(), 1);
        assert_eq!(auto_votes[0].voter_seat, 2);
    }

    #[test]
    fn test_no_eligible_voters_finishes_immediately() {
        let mut room = room_with_players(2);
        for seat in 1..=2u8 {
            let id = seat_player(&room, seat);
            room.set_player_status(id, LifeStatus::DeadNoVote).unwrap();
        }
        let nomination = room.nominate(1, 2).unwrap();
        room.start_vote(nomination).unwrap();
        assert!(room.vote_session.as_ref().unwrap().finished);
        assert!(room.nomination(nomination).unwrap().vote_completed);
    }

    #[test]
    fn test_ghost_vote_spent_on_yes_only() {
        let mut room = room_with_players(3);
        let ghost = seat_player(&room, 1);
        room.set_player_status(ghost, LifeStatus::DeadVote).unwrap();

        // A no leaves the ghost vote intact.
        let first = room.nominate(2, 3).unwrap();
        room.start_vote(first).unwrap();
        room.cast_vote(ghost, false).unwrap();
        room.cast_vote(seat_player(&room, 2), false).unwrap();
        room.cast_vote(seat_player(&room, 3), false).unwrap();
        assert!(room.player(ghost).unwrap().can_vote());

        // A yes spends it and degrades the status.
        let second = room.nominate(3, 2).unwrap();
        room.start_vote(second).unwrap();
        room.cast_vote(ghost, true).unwrap();
        let player = room.player(ghost).unwrap();
        assert!(player.ghost_vote_used);
        assert_eq!(player.life_status, LifeStatus::DeadNoVote);
    }

    #[test]
    fn test_restart_of_voted_nomination_rejected() {
        let mut room = room_with_players(2);
        let nomination = room.nominate(1, 2).unwrap();
        room.start_vote(nomination).unwrap();
        room.cast_vote(seat_player(&room, 1), true).unwrap();
        room.cast_vote(seat_player(&room, 2), true).unwrap();

        let err = room.start_vote(nomination).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_revert_clears_votes_and_flags() {
        let mut room = room_with_players(2);
        let nomination = room.nominate(1, 2).unwrap();
        room.start_vote(nomination).unwrap();
        room.cast_vote(seat_player(&room, 1), true).unwrap();
        room.cast_vote(seat_player(&room, 2), true).unwrap();
        assert!(room.nomination(nomination).unwrap().vote_completed);

        room.revert_nomination(nomination).unwrap();
        let reverted = room.nomination(nomination).unwrap();
        assert!(!reverted.vote_started);
        assert!(!reverted.vote_completed);
        assert!(room.votes.is_empty());
        assert!(room.vote_session.is_none());

        // And it can be voted again.
        room.start_vote(nomination).unwrap();
        assert!(room.has_open_vote());
    }

    #[test]
    fn test_revert_mid_vote_discards_session() {
        let mut room = room_with_players(3);
        let nomination = room.nominate(1, 2).unwrap();
        room.start_vote(nomination).unwrap();
        room.cast_vote(seat_player(&room, 1), true).unwrap();

        room.revert_nomination(nomination).unwrap();
        assert!(room.vote_session.is_none());
        assert!(room.votes.is_empty());
    }

    #[test]
    fn test_manual_total_set_and_restore() {
        let mut room = room_with_players(2);
        let nomination = room.nominate(1, 2).unwrap();
        room.set_manual_total(nomination, Some(7)).unwrap();
        assert_eq!(room.nomination(nomination).unwrap().manual_total, Some(7));
        room.set_manual_total(nomination, None).unwrap();
        assert_eq!(room.nomination(nomination).unwrap().manual_total, None);
    }

    #[test]
    fn test_start_vote_rejects_stale_nomination() {
        let mut room = room_with_players(2);
        let nomination = room.nominate(1, 2).unwrap();
        room.change_phase(crate::models::Phase::Night);
        room.change_phase(crate::models::Phase::Day);
        let err = room.start_vote(nomination).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
