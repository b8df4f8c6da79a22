//! Visibility projector
//!
//! A pure function from (room, script, viewer) to the snapshot that viewer
//! is allowed to see. Identical inputs produce byte-identical JSON: every
//! projected map is ordered and every list has a total sort order. The
//! broadcaster relies on this for resend-on-reconnect.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    AttachmentSlot, GameResult, LifeStatus, Phase, Player, RoleAttachment, Room, Script,
    ScriptRole, ScriptRules, Team, TeamCounts,
};
use crate::verdict::BlockOutcome;

/// How many journal entries the host sees in a snapshot.
const JOURNAL_TAIL: usize = 50;

/// The identity a snapshot is projected for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub player_id: Option<Uuid>,
    pub seat: Option<u8>,
    pub is_host: bool,
}

impl Principal {
    pub fn host(player_id: Uuid) -> Self {
        Self {
            player_id: Some(player_id),
            seat: Some(0),
            is_host: true,
        }
    }

    pub fn player(player_id: Uuid, seat: u8) -> Self {
        Self {
            player_id: Some(player_id),
            seat: Some(seat),
            is_host: false,
        }
    }

    /// An anonymous spectator: public state only.
    pub fn observer() -> Self {
        Self {
            player_id: None,
            seat: None,
            is_host: false,
        }
    }
}

/// A role as shown to a viewer permitted to see it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleView {
    pub id: String,
    pub name: String,
    pub name_localized: BTreeMap<String, String>,
    pub team: Team,
    pub team_label: String,
}

impl RoleView {
    fn from_role(role: &ScriptRole) -> Self {
        Self {
            id: role.id.clone(),
            name: role.name.clone(),
            name_localized: role.name_localized.clone(),
            team: role.team,
            team_label: role.team.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentView {
    pub slot: String,
    pub slot_label: Option<String>,
    pub index: usize,
    pub role_id: String,
    pub role: Option<RoleView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: Uuid,
    pub seat: u8,
    pub name: String,
    pub is_host: bool,
    /// True for the viewer's own row
    pub me: bool,
    /// Masked for viewers without secret access
    pub life_status: LifeStatus,
    pub ghost_vote_available: bool,
    pub seat_conflict: bool,
    /// Host-only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Present for the host and for the player's own row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_secret: Option<RoleView>,
    pub role_attachments: Vec<AttachmentView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteView {
    pub voter_seat: u8,
    pub player_id: Uuid,
    pub value: bool,
    pub auto: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NominationView {
    pub id: Uuid,
    pub day: u32,
    pub nominee_seat: u8,
    pub nominator_seat: u8,
    pub ts: DateTime<Utc>,
    pub vote_started: bool,
    pub vote_completed: bool,
    pub manual_total: Option<i64>,
    pub effective_total: i64,
    pub votes: Vec<VoteView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOrderEntry {
    pub player_id: Uuid,
    pub seat: u8,
    pub name: String,
    pub value: Option<bool>,
    pub can_vote: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSessionView {
    pub nomination_id: Uuid,
    pub current_player_id: Option<Uuid>,
    pub finished: bool,
    pub order: Vec<VoteOrderEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionView {
    pub day: u32,
    pub nominee_seat: Option<u8>,
    pub executed_seat: Option<u8>,
    pub votes_for: usize,
    pub alive_count: usize,
    pub nomination_id: Option<Uuid>,
    pub target_dead: Option<bool>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSeatView {
    pub role_id: String,
    pub role: Option<RoleView>,
    pub attachments: Vec<AttachmentView>,
}

/// Host-only view of the editable pending map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAssignmentsView {
    pub seats: BTreeMap<u8, PendingSeatView>,
    /// Primary-role tally per team, display order
    pub team_counts: BTreeMap<Team, usize>,
    /// Attachment reuse per role id, for UI warnings
    pub attachment_usage: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRoleView {
    pub id: String,
    pub name: String,
    pub name_localized: BTreeMap<String, String>,
    pub team: Team,
    pub team_label: String,
    pub description: Option<String>,
    pub attachment_slots: Vec<AttachmentSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSummaryView {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Team counts resolved for the current player count
    pub team_counts: TeamCounts,
    pub team_distribution: BTreeMap<usize, TeamCounts>,
    pub roles: Vec<ScriptRoleView>,
    pub rules: ScriptRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummaryView {
    pub id: Uuid,
    pub phase: Phase,
    pub day: u32,
    pub night: u32,
    pub script_id: String,
    pub game_result: Option<GameResult>,
    pub player_count: usize,
    /// Host-only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalView {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub kind: String,
    pub payload: Value,
}

/// Everything one viewer is allowed to see of a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomSummaryView,
    pub players: Vec<PlayerView>,
    pub nominations: Vec<NominationView>,
    pub vote_session: Option<VoteSessionView>,
    pub executions: Vec<ExecutionView>,
    /// Resolution of the current day, engine-computed
    pub block: BlockOutcome,
    /// Host-only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_assignments: Option<PendingAssignmentsView>,
    pub script: ScriptSummaryView,
    /// Host-only journal tail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<Vec<JournalView>>,
}

/// Project the canonical room state for one viewer.
pub fn project(room: &Room, script: &Script, viewer: &Principal) -> RoomSnapshot {
    let conflicted = room.conflicted_seats();
    let players = room
        .ordered_players()
        .into_iter()
        .map(|player| project_player(player, script, viewer, &conflicted))
        .collect();

    RoomSnapshot {
        room: RoomSummaryView {
            id: room.id,
            phase: room.phase,
            day: room.day,
            night: room.night,
            script_id: room.script_id.clone(),
            game_result: room.game_result,
            player_count: room.seated_count(),
            join_code: viewer.is_host.then(|| room.join_code.clone()),
        },
        players,
        nominations: project_nominations(room),
        vote_session: room.vote_session.as_ref().map(|session| {
            let order = session
                .order
                .iter()
                .map(|player_id| match room.player(*player_id) {
                    Some(player) => VoteOrderEntry {
                        player_id: *player_id,
                        seat: player.seat,
                        name: player.name.clone(),
                        value: session.votes.get(player_id).copied(),
                        can_vote: player.can_vote(),
                    },
                    None => VoteOrderEntry {
                        player_id: *player_id,
                        seat: 0,
                        name: String::new(),
                        value: session.votes.get(player_id).copied(),
                        can_vote: false,
                    },
                })
                .collect();
            VoteSessionView {
                nomination_id: session.nomination_id,
                current_player_id: session.current_voter(),
                finished: session.finished,
                order,
            }
        }),
        executions: room
            .executions
            .iter()
            .map(|record| ExecutionView {
                day: record.day,
                nominee_seat: record.nominee_seat,
                executed_seat: record.executed_seat,
                votes_for: record.votes_for,
                alive_count: record.alive_count,
                nomination_id: record.nomination_id,
                target_dead: record.target_dead,
                ts: record.ts,
            })
            .collect(),
        block: room.resolve_block(room.day),
        pending_assignments: viewer
            .is_host
            .then(|| project_pending(room, script)),
        script: project_script(script, room.seated_count()),
        journal: viewer.is_host.then(|| {
            room.journal
                .iter()
                .rev()
                .take(JOURNAL_TAIL)
                .rev()
                .map(|entry| JournalView {
                    id: entry.id,
                    ts: entry.ts,
                    kind: entry.kind.clone(),
                    payload: entry.payload.clone(),
                })
                .collect()
        }),
    }
}

fn project_player(
    player: &Player,
    script: &Script,
    viewer: &Principal,
    conflicted: &[u8],
) -> PlayerView {
    let me = viewer.player_id == Some(player.id);
    let sees_secret = viewer.is_host || me;

    let life_status = if sees_secret {
        player.life_status
    } else {
        player.life_status.masked()
    };

    let base_role = player.role_id.as_deref().and_then(|id| script.role(id));
    let (role_secret, role_attachments) = if viewer.is_host {
        (
            base_role.map(RoleView::from_role),
            project_attachments(&player.role_attachments, base_role, script, false),
        )
    } else if me {
        (
            owner_visible_role(base_role, &player.role_attachments, script)
                .map(RoleView::from_role),
            project_attachments(&player.role_attachments, base_role, script, true),
        )
    } else {
        (None, Vec::new())
    };

    PlayerView {
        id: player.id,
        seat: player.seat,
        name: player.name.clone(),
        is_host: player.is_host,
        me,
        life_status,
        ghost_vote_available: !player.ghost_vote_used,
        seat_conflict: player.seat > 0 && conflicted.contains(&player.seat),
        note: viewer.is_host.then(|| player.note.clone()),
        role_secret,
        role_attachments,
    }
}

/// Attachment rows for a role, sorted by (slot, index). With
/// `hide_owner_slots` the rows of replace-primary slots are dropped: their
/// content already shows as the owner's primary role.
fn project_attachments(
    attachments: &[RoleAttachment],
    base_role: Option<&ScriptRole>,
    script: &Script,
    hide_owner_slots: bool,
) -> Vec<AttachmentView> {
    let mut sorted: Vec<&RoleAttachment> = attachments.iter().collect();
    sorted.sort_by(|a, b| (&a.slot, a.index).cmp(&(&b.slot, b.index)));

    sorted
        .into_iter()
        .filter_map(|att| {
            let slot_def = base_role.and_then(|role| role.slot(&att.slot));
            if hide_owner_slots
                && slot_def.is_some_and(|slot| {
                    slot.owner_view == crate::models::OwnerView::ReplacePrimary
                })
            {
                return None;
            }
            Some(AttachmentView {
                slot: att.slot.clone(),
                slot_label: slot_def.map(|slot| slot.label.clone()),
                index: att.index,
                role_id: att.role_id.clone(),
                role: script.role(&att.role_id).map(RoleView::from_role),
            })
        })
        .collect()
}

/// What the seat's own player believes their role is: a replace-primary
/// attachment substitutes for the real role.
fn owner_visible_role<'a>(
    base_role: Option<&'a ScriptRole>,
    attachments: &[RoleAttachment],
    script: &'a Script,
) -> Option<&'a ScriptRole> {
    let role = base_role?;
    for slot in &role.attachment_slots {
        if slot.owner_view != crate::models::OwnerView::ReplacePrimary {
            continue;
        }
        let substituted = attachments
            .iter()
            .find(|att| att.slot == slot.id && att.index == 0)
            .and_then(|att| script.role(&att.role_id));
        if let Some(substituted) = substituted {
            return Some(substituted);
        }
    }
    Some(role)
}

fn project_nominations(room: &Room) -> Vec<NominationView> {
    room.nominations
        .iter()
        .map(|nomination| {
            let mut votes: Vec<VoteView> = room
                .votes
                .iter()
                .filter(|vote| vote.nomination_id == nomination.id)
                .map(|vote| VoteView {
                    voter_seat: vote.voter_seat,
                    player_id: vote.player_id,
                    value: vote.value,
                    auto: vote.auto,
                })
                .collect();
            votes.sort_by_key(|vote| (vote.voter_seat, vote.player_id));
            NominationView {
                id: nomination.id,
                day: nomination.day,
                nominee_seat: nomination.nominee_seat,
                nominator_seat: nomination.nominator_seat,
                ts: nomination.ts,
                vote_started: nomination.vote_started,
                vote_completed: nomination.vote_completed,
                manual_total: nomination.manual_total,
                effective_total: room.effective_total(nomination),
                votes,
            }
        })
        .collect()
}

fn project_pending(room: &Room, script: &Script) -> PendingAssignmentsView {
    let mut seats = BTreeMap::new();
    let mut team_counts: BTreeMap<Team, usize> = BTreeMap::new();
    for (&seat, bundle) in &room.pending_assignments {
        let role = script.role(&bundle.role_id);
        if let Some(role) = role {
            *team_counts.entry(role.team).or_insert(0) += 1;
        }
        seats.insert(
            seat,
            PendingSeatView {
                role_id: bundle.role_id.clone(),
                role: role.map(RoleView::from_role),
                attachments: project_attachments(&bundle.attachments, role, script, false),
            },
        );
    }
    PendingAssignmentsView {
        seats,
        team_counts,
        attachment_usage: room.attachment_usage(),
    }
}

fn project_script(script: &Script, player_count: usize) -> ScriptSummaryView {
    ScriptSummaryView {
        id: script.id.clone(),
        name: script.name.clone(),
        version: script.version.clone(),
        team_counts: script.team_counts_for(player_count),
        team_distribution: script.team_distribution.clone(),
        roles: script
            .roles
            .iter()
            .map(|role| ScriptRoleView {
                id: role.id.clone(),
                name: role.name.clone(),
                name_localized: role.name_localized.clone(),
                team: role.team,
                team_label: role.team.label().to_string(),
                description: role.description.clone(),
                attachment_slots: role.attachment_slots.clone(),
            })
            .collect(),
        rules: script.rules.clone(),
    }
}
