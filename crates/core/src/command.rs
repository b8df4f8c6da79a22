//! Room command surface
//!
//! The transport-agnostic command union every client speaks. `Room::apply`
//! authorizes the caller, dispatches to the engine modules, and is
//! all-or-nothing: a rejection leaves the room untouched.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants::assert_room_invariants;
use crate::models::{GameResult, LifeStatus, Phase, RoleAttachment, Room, Script};
use crate::projection::Principal;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    UpdateSeat {
        /// Defaults to the caller
        player_id: Option<Uuid>,
        seat: u8,
    },
    GenerateAssignments {
        seed: Option<u64>,
    },
    EditAssignment {
        seat: u8,
        role_id: Option<String>,
        attachments: Option<Vec<RoleAttachment>>,
    },
    EditAttachment {
        seat: u8,
        slot: String,
        index: usize,
        role_id: String,
    },
    FinalizeAssignments,
    ChangePhase {
        target: Phase,
    },
    ResetRoom,
    SetGameResult {
        result: Option<GameResult>,
    },
    Nominate {
        nominee: u8,
        nominator: u8,
    },
    StartVote {
        nomination_id: Uuid,
    },
    RevertNomination {
        nomination_id: Uuid,
    },
    SetManualTotal {
        nomination_id: Uuid,
        total: Option<i64>,
    },
    CastVote {
        value: bool,
        on_behalf_of: Option<Uuid>,
    },
    SetPlayerStatus {
        player_id: Uuid,
        status: LifeStatus,
    },
    SetPlayerNote {
        player_id: Uuid,
        text: String,
    },
    RecordExecution {
        nomination_id: Option<Uuid>,
        executed_seat: Option<u8>,
        target_dead: Option<bool>,
    },
    RecordAction {
        night: u32,
        actor_seat: u8,
        action_type: String,
        target: Option<u8>,
        payload: serde_json::Value,
    },
}

impl Command {
    /// Name used in logs and rejection messages.
    pub fn op_name(&self) -> &'static str {
        match self {
            Command::UpdateSeat { .. } => "update_seat",
            Command::GenerateAssignments { .. } => "generate_assignments",
            Command::EditAssignment { .. } => "edit_assignment",
            Command::EditAttachment { .. } => "edit_attachment",
            Command::FinalizeAssignments => "finalize_assignments",
            Command::ChangePhase { .. } => "change_phase",
            Command::ResetRoom => "reset_room",
            Command::SetGameResult { .. } => "set_game_result",
            Command::Nominate { .. } => "nominate",
            Command::StartVote { .. } => "start_vote",
            Command::RevertNomination { .. } => "revert_nomination",
            Command::SetManualTotal { .. } => "set_manual_total",
            Command::CastVote { .. } => "cast_vote",
            Command::SetPlayerStatus { .. } => "set_player_status",
            Command::SetPlayerNote { .. } => "set_player_note",
            Command::RecordExecution { .. } => "record_execution",
            Command::RecordAction { .. } => "record_action",
        }
    }

    /// Whether only the storyteller may issue this command. Seat changes
    /// and vote casts have their own finer-grained checks.
    pub fn host_only(&self) -> bool {
        !matches!(self, Command::UpdateSeat { .. } | Command::CastVote { .. })
    }
}

impl Room {
    /// Apply one command on behalf of `caller`.
    pub fn apply(&mut self, script: &Script, caller: &Principal, command: Command) -> Result<()> {
        if command.host_only() && !caller.is_host {
            return Err(Error::Unauthorized(format!(
                "{} is a storyteller command",
                command.op_name()
            )));
        }

        let op = command.op_name();
        let result = self.dispatch(script, caller, command);
        match &result {
            Ok(()) => tracing::debug!(room_id = %self.id, op, "Command applied"),
            Err(err) => {
                tracing::debug!(room_id = %self.id, op, error = %err, "Command rejected")
            }
        }
        assert_room_invariants(self);
        result
    }

    fn dispatch(&mut self, script: &Script, caller: &Principal, command: Command) -> Result<()> {
        match command {
            Command::UpdateSeat { player_id, seat } => {
                let target = match player_id {
                    Some(target) => target,
                    None => caller.player_id.ok_or_else(|| {
                        Error::Unauthorized("observers have no seat".into())
                    })?,
                };
                if !caller.is_host && caller.player_id != Some(target) {
                    return Err(Error::Unauthorized(
                        "players may only change their own seat".into(),
                    ));
                }
                self.update_seat(target, seat, caller.is_host)
            }
            Command::GenerateAssignments { seed } => self.generate_assignments(script, seed),
            Command::EditAssignment {
                seat,
                role_id,
                attachments,
            } => self.edit_assignment(script, seat, role_id.as_deref(), attachments),
            Command::EditAttachment {
                seat,
                slot,
                index,
                role_id,
            } => self.edit_attachment(script, seat, &slot, index, &role_id),
            Command::FinalizeAssignments => self.finalize_assignments(script),
            Command::ChangePhase { target } => {
                self.change_phase(target);
                Ok(())
            }
            Command::ResetRoom => {
                self.reset();
                Ok(())
            }
            Command::SetGameResult { result } => self.set_game_result(script, result),
            Command::Nominate { nominee, nominator } => {
                self.nominate(nominee, nominator).map(|_| ())
            }
            Command::StartVote { nomination_id } => self.start_vote(nomination_id),
            Command::RevertNomination { nomination_id } => self.revert_nomination(nomination_id),
            Command::SetManualTotal {
                nomination_id,
                total,
            } => self.set_manual_total(nomination_id, total),
            Command::CastVote { value, on_behalf_of } => {
                let target = match on_behalf_of {
                    Some(target) => {
                        if !caller.is_host && caller.player_id != Some(target) {
                            return Err(Error::Unauthorized(
                                "only the storyteller votes on another player's behalf".into(),
                            ));
                        }
                        target
                    }
                    None => caller.player_id.ok_or_else(|| {
                        Error::Unauthorized("observers cannot vote".into())
                    })?,
                };
                self.cast_vote(target, value)
            }
            Command::SetPlayerStatus { player_id, status } => {
                self.set_player_status(player_id, status)
            }
            Command::SetPlayerNote { player_id, text } => self.set_player_note(player_id, text),
            Command::RecordExecution {
                nomination_id,
                executed_seat,
                target_dead,
            } => self.record_execution(nomination_id, executed_seat, target_dead),
            Command::RecordAction {
                night,
                actor_seat,
                action_type,
                target,
                payload,
            } => self.record_action(night, actor_seat, action_type, target, payload),
        }
    }

    /// Note a night action in the room log.
    pub fn record_action(
        &mut self,
        night: u32,
        actor_seat: u8,
        action_type: String,
        target: Option<u8>,
        payload: serde_json::Value,
    ) -> Result<()> {
        if self.player_by_seat(actor_seat).is_none() {
            return Err(Error::NotFound(format!("no player at seat {actor_seat}")));
        }
        let action = crate::models::ActionRecord {
            id: Uuid::new_v4(),
            night,
            actor_seat,
            action_type: action_type.clone(),
            target,
            payload,
            ts: chrono::Utc::now(),
        };
        self.actions.push(action);
        self.record_event(
            "action_recorded",
            serde_json::json!({
                "night": night,
                "actor": actor_seat,
                "type": action_type,
                "target": target,
            }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScriptRules, Team};

    fn test_script() -> Script {
        Script {
            id: "test".into(),
            name: "Test".into(),
            version: "1.0.0".into(),
            roles: vec![crate::models::ScriptRole {
                id: "chef".into(),
                name: "Chef".into(),
                team: Team::Townsfolk,
                tags: Vec::new(),
                description: None,
                name_localized: Default::default(),
                attachment_slots: Vec::new(),
            }],
            team_distribution: Default::default(),
            rules: ScriptRules::default(),
        }
    }

    fn room_with_players(count: usize) -> Room {
        let mut room = Room::new("test", "Ada".into());
        for i in 0..count {
            room.add_player(format!("P{}", i + 1)).unwrap();
        }
        room
    }

    #[test]
    fn test_host_only_commands_rejected_for_players() {
        let script = test_script();
        let mut room = room_with_players(2);
        let player = room.seated_players()[0].id;
        let caller = Principal::player(player, 1);

        let err = room
            .apply(&script, &caller, Command::ResetRoom)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let err = room
            .apply(
                &script,
                &caller,
                Command::Nominate {
                    nominee: 1,
                    nominator: 2,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_player_may_update_own_seat_only() {
        let script = test_script();
        let mut room = room_with_players(2);
        let bea = room.player_by_seat(1).unwrap().id;
        let cy = room.player_by_seat(2).unwrap().id;
        let caller = Principal::player(bea, 1);

        // Without an explicit target the caller moves themselves.
        room.apply(
            &script,
            &caller,
            Command::UpdateSeat {
                player_id: None,
                seat: 3,
            },
        )
        .unwrap();
        assert_eq!(room.player(bea).unwrap().seat, 3);

        let err = room
            .apply(
                &script,
                &caller,
                Command::UpdateSeat {
                    player_id: Some(cy),
                    seat: 4,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_host_casts_on_behalf() {
        let script = test_script();
        let mut room = room_with_players(2);
        let host = Principal::host(room.host_player_id);
        let bea = room.player_by_seat(1).unwrap().id;

        room.apply(
            &script,
            &host,
            Command::Nominate {
                nominee: 2,
                nominator: 1,
            },
        )
        .unwrap();
        let nomination_id = room.nominations[0].id;
        room.apply(&script, &host, Command::StartVote { nomination_id })
            .unwrap();
        room.apply(
            &script,
            &host,
            Command::CastVote {
                value: true,
                on_behalf_of: Some(bea),
            },
        )
        .unwrap();
        assert_eq!(room.votes.len(), 1);
        assert_eq!(room.votes[0].player_id, bea);
    }

    #[test]
    fn test_player_cannot_cast_for_another() {
        let script = test_script();
        let mut room = room_with_players(2);
        let host = Principal::host(room.host_player_id);
        let bea = room.player_by_seat(1).unwrap().id;
        let cy = room.player_by_seat(2).unwrap().id;

        room.apply(
            &script,
            &host,
            Command::Nominate {
                nominee: 2,
                nominator: 1,
            },
        )
        .unwrap();
        let nomination_id = room.nominations[0].id;
        room.apply(&script, &host, Command::StartVote { nomination_id })
            .unwrap();

        let err = room
            .apply(
                &script,
                &Principal::player(cy, 2),
                Command::CastVote {
                    value: true,
                    on_behalf_of: Some(bea),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_command_tags_round_trip() {
        let command = Command::SetManualTotal {
            nomination_id: Uuid::new_v4(),
            total: Some(4),
        };
        let json = serde_json::to_string(&command).unwrap();
        assert!(json.contains("\"op\":\"set_manual_total\""));
        let back: Command = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Command::SetManualTotal { total: Some(4), .. }));
    }

    #[test]
    fn test_unknown_op_fails_decoding() {
        let result = serde_json::from_str::<Command>(r#"{"op":"launch_missiles"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_record_action_requires_known_seat() {
        let script = test_script();
        let mut room = room_with_players(1);
        let host = Principal::host(room.host_player_id);
        let err = room
            .apply(
                &script,
                &host,
                Command::RecordAction {
                    night: 1,
                    actor_seat: 9,
                    action_type: "poison".into(),
                    target: Some(1),
                    payload: serde_json::json!({}),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
