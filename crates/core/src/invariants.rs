//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::models::{Phase, Room};

/// Validate that a room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    // At most one vote session, and only an unfinished one counts as open.
    if let Some(session) = &room.vote_session {
        debug_assert!(
            room.nomination(session.nomination_id).is_some(),
            "Room {} has a vote session for unknown nomination {}",
            room.id,
            session.nomination_id
        );
        debug_assert!(
            session.current_index <= session.order.len(),
            "Room {} vote pointer {} ran past order length {}",
            room.id,
            session.current_index,
            session.order.len()
        );
    }

    // vote_completed implies vote_started.
    for nomination in &room.nominations {
        debug_assert!(
            nomination.vote_started || !nomination.vote_completed,
            "Room {} nomination {} completed without starting",
            room.id,
            nomination.id
        );
    }

    // Exactly one storyteller, always at seat 0.
    let hosts: Vec<_> = room.players.values().filter(|p| p.is_host).collect();
    debug_assert!(
        hosts.len() == 1,
        "Room {} has {} storytellers",
        room.id,
        hosts.len()
    );
    debug_assert!(
        hosts.iter().all(|p| p.seat == 0),
        "Room {} storyteller left seat 0",
        room.id
    );

    // The storyteller never appears in a vote order.
    if let Some(session) = &room.vote_session {
        debug_assert!(
            !session.order.contains(&room.host_player_id),
            "Room {} vote order includes the storyteller",
            room.id
        );
    }

    // A room that never left the lobby has no counters.
    if room.phase == Phase::Lobby && room.journal.is_empty() {
        debug_assert!(
            room.day == 0 && room.night == 0,
            "Room {} has counters without any recorded activity",
            room.id
        );
    }
}

/// Validate that a finalized player carries a complete assignment
pub fn assert_assignment_invariants(room: &Room, script: &crate::models::Script) {
    for player in room.seated_players() {
        let Some(role_id) = &player.role_id else {
            continue;
        };
        let Some(role) = script.role(role_id) else {
            debug_assert!(false, "Room {} player {} has off-script role", room.id, player.id);
            continue;
        };
        for slot in &role.attachment_slots {
            for index in 0..slot.count {
                debug_assert!(
                    player
                        .role_attachments
                        .iter()
                        .any(|att| att.slot == slot.id && att.index == index),
                    "Room {} seat {} missing {}#{}",
                    room.id,
                    player.seat,
                    slot.id,
                    index
                );
            }
        }
    }
}
