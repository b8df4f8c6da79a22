//! Assignment engine
//!
//! Generates and edits the pending role map, then commits it into the
//! active per-player assignment. Generation is seeded and reproducible;
//! finalize fails closed and reports every violation it finds.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::error::{AssignmentGap, Error, Result};
use crate::models::{AttachmentSlot, RoleAssignment, RoleAttachment, Room, Script};

impl Room {
    /// Deal a pending role to every occupied non-storyteller seat.
    ///
    /// Roles are drawn per the script's team distribution for the current
    /// player count, topped up from the remaining catalog if the
    /// distribution row comes up short. Overwrites any existing pending map.
    pub fn generate_assignments(&mut self, script: &Script, seed: Option<u64>) -> Result<()> {
        let seats: Vec<u8> = self.seated_players().iter().map(|p| p.seat).collect();
        if seats.is_empty() {
            return Err(Error::Validation(
                "at least one seated player is required".into(),
            ));
        }
        if script.roles.len() < seats.len() {
            return Err(Error::Validation(format!(
                "script has {} roles for {} players",
                script.roles.len(),
                seats.len()
            )));
        }

        let seed_value = seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut rng = StdRng::seed_from_u64(seed_value);

        let team_counts = script.team_counts_for(seats.len());
        let mut by_team: BTreeMap<_, Vec<&str>> = BTreeMap::new();
        for role in &script.roles {
            by_team.entry(role.team).or_default().push(role.id.as_str());
        }
        for bucket in by_team.values_mut() {
            bucket.shuffle(&mut rng);
        }

        let mut selected: Vec<&str> = Vec::new();
        for (team, count) in &team_counts {
            let bucket = by_team.entry(*team).or_default();
            if bucket.len() < *count {
                return Err(Error::Validation(format!(
                    "script lacks {team} roles: need {count}, have {}",
                    bucket.len()
                )));
            }
            selected.extend(bucket.drain(..*count));
        }
        if selected.len() < seats.len() {
            let needed = seats.len() - selected.len();
            let mut leftovers: Vec<&str> = by_team.values().flatten().copied().collect();
            if leftovers.len() < needed {
                return Err(Error::Validation(
                    "script does not have enough roles for every seat".into(),
                ));
            }
            leftovers.shuffle(&mut rng);
            selected.extend(leftovers.into_iter().take(needed));
        }
        selected.shuffle(&mut rng);

        let mut pending: BTreeMap<u8, RoleAssignment> = BTreeMap::new();
        for (seat, role_id) in seats.iter().zip(selected.iter()) {
            pending.insert(*seat, RoleAssignment::new(*role_id));
        }
        auto_fill_attachments(script, &mut pending, &mut rng);

        self.assignments_seed = Some(seed_value);
        self.pending_assignments = pending;
        self.record_event(
            "assignments_generated",
            json!({ "seed": seed_value, "seats": seats.len() }),
        );
        Ok(())
    }

    /// Set or clear a seat's pending primary role.
    ///
    /// On a role change the attachment slots are rebuilt from the new role's
    /// definitions; prior selections survive where their (slot, index) pair
    /// still exists. Explicit `attachments` replace the carried-over set.
    pub fn edit_assignment(
        &mut self,
        script: &Script,
        seat: u8,
        role_id: Option<&str>,
        attachments: Option<Vec<RoleAttachment>>,
    ) -> Result<()> {
        if self.player_by_seat(seat).is_none() {
            return Err(Error::NotFound(format!("no player at seat {seat}")));
        }

        let Some(role_id) = role_id else {
            self.pending_assignments.remove(&seat);
            self.record_event("assignment_cleared", json!({ "seat": seat }));
            return Ok(());
        };
        let role = script
            .role(role_id)
            .ok_or_else(|| Error::NotFound(format!("role {role_id}")))?;

        let mut bundle = RoleAssignment::new(role_id);
        match attachments {
            Some(given) => {
                for att in given {
                    let slot = role.slot(&att.slot).ok_or_else(|| {
                        Error::Validation(format!("role {} has no slot {}", role.name, att.slot))
                    })?;
                    if att.index >= slot.count {
                        return Err(Error::Validation(format!(
                            "slot {} accepts indexes below {}",
                            slot.id, slot.count
                        )));
                    }
                    let attached = script.role(&att.role_id).ok_or_else(|| {
                        Error::NotFound(format!("role {}", att.role_id))
                    })?;
                    if !slot.admits(attached.team) {
                        return Err(Error::Validation(format!(
                            "slot {} does not admit {} roles",
                            slot.id, attached.team
                        )));
                    }
                    bundle.set_attachment(att.slot, att.index, att.role_id);
                }
            }
            None => {
                // Carry over selections whose position survives the change.
                if let Some(previous) = self.pending_assignments.get(&seat) {
                    for att in &previous.attachments {
                        let keeps_position = role
                            .slot(&att.slot)
                            .map(|slot| att.index < slot.count)
                            .unwrap_or(false);
                        if keeps_position {
                            bundle.set_attachment(att.slot.clone(), att.index, att.role_id.clone());
                        }
                    }
                }
            }
        }

        self.pending_assignments.insert(seat, bundle);
        self.record_event("assignment_edited", json!({ "seat": seat, "role": role_id }));
        Ok(())
    }

    /// Fill one attachment selection on a pending assignment.
    pub fn edit_attachment(
        &mut self,
        script: &Script,
        seat: u8,
        slot_id: &str,
        index: usize,
        role_id: &str,
    ) -> Result<()> {
        let Some(bundle) = self.pending_assignments.get(&seat) else {
            return Err(Error::InvalidState(format!(
                "seat {seat} has no pending assignment"
            )));
        };
        let primary = script.role(&bundle.role_id).ok_or_else(|| {
            Error::Validation(format!("pending role {} is not in the script", bundle.role_id))
        })?;
        let slot = primary.slot(slot_id).ok_or_else(|| {
            Error::Validation(format!("role {} has no slot {slot_id}", primary.name))
        })?;
        if index >= slot.count {
            return Err(Error::Validation(format!(
                "slot {slot_id} accepts indexes below {}",
                slot.count
            )));
        }
        let attached = script
            .role(role_id)
            .ok_or_else(|| Error::NotFound(format!("role {role_id}")))?;
        if !slot.admits(attached.team) {
            return Err(Error::Validation(format!(
                "slot {slot_id} does not admit {} roles",
                attached.team
            )));
        }
        if !slot.allow_duplicates && self.slot_role_in_use(slot_id, role_id, seat, index) {
            return Err(Error::Validation(format!(
                "role {role_id} is already used in slot {slot_id}"
            )));
        }

        let bundle = self
            .pending_assignments
            .get_mut(&seat)
            .ok_or_else(|| Error::InvalidState(format!("seat {seat} has no pending assignment")))?;
        bundle.set_attachment(slot_id, index, role_id);
        self.record_event(
            "attachment_edited",
            json!({ "seat": seat, "slot": slot_id, "index": index, "role": role_id }),
        );
        Ok(())
    }

    /// How often each role appears across all pending attachments. Surfaced
    /// in host projections so the UI can warn about reuse.
    pub fn attachment_usage(&self) -> BTreeMap<String, usize> {
        let mut usage = BTreeMap::new();
        for bundle in self.pending_assignments.values() {
            for att in &bundle.attachments {
                *usage.entry(att.role_id.clone()).or_insert(0) += 1;
            }
        }
        usage
    }

    /// Commit the pending map as the active assignment. All-or-nothing:
    /// every violation is collected and reported together; on any violation
    /// nothing changes.
    pub fn finalize_assignments(&mut self, script: &Script) -> Result<()> {
        if self.seated_count() == 0 {
            return Err(Error::Validation(
                "at least one seated player is required".into(),
            ));
        }

        let mut gaps = Vec::new();
        self.collect_seating_gaps(&mut gaps);
        self.collect_assignment_gaps(script, &mut gaps);
        if !gaps.is_empty() {
            return Err(Error::IncompleteAssignments(gaps));
        }

        let pending = std::mem::take(&mut self.pending_assignments);
        let by_seat: Vec<(uuid::Uuid, RoleAssignment)> = self
            .seated_players()
            .iter()
            .filter_map(|player| {
                pending
                    .get(&player.seat)
                    .map(|bundle| (player.id, bundle.clone()))
            })
            .collect();
        for (player_id, mut bundle) in by_seat {
            bundle.sort_attachments();
            if let Some(player) = self.player_mut(player_id) {
                player.role_id = Some(bundle.role_id);
                player.role_attachments = bundle.attachments;
            }
        }

        self.record_event(
            "roles_assigned",
            json!({ "seed": self.assignments_seed, "seats": self.seated_count() }),
        );
        tracing::info!(room_id = %self.id, seats = self.seated_count(), "Assignments finalized");
        crate::invariants::assert_assignment_invariants(self, script);
        Ok(())
    }

    /// Seating must be 1..=n, no gaps, no duplicates, before roles commit.
    fn collect_seating_gaps(&self, gaps: &mut Vec<AssignmentGap>) {
        let mut seats: Vec<u8> = self.seated_players().iter().map(|p| p.seat).collect();
        seats.sort_unstable();
        let mut seen = HashSet::new();
        for &seat in &seats {
            if !seen.insert(seat) {
                gaps.push(AssignmentGap::seat(seat, "seat claimed by multiple players"));
            }
        }
        let mut unique: Vec<u8> = seen.into_iter().collect();
        unique.sort_unstable();
        for (i, &seat) in unique.iter().enumerate() {
            let expected = (i + 1) as u8;
            if seat != expected {
                gaps.push(AssignmentGap::seat(
                    seat,
                    format!("seating must run 1..{} without gaps", seats.len()),
                ));
                break;
            }
        }
    }

    fn collect_assignment_gaps(&self, script: &Script, gaps: &mut Vec<AssignmentGap>) {
        for player in self.seated_players() {
            if !self.pending_assignments.contains_key(&player.seat) {
                gaps.push(AssignmentGap::seat(player.seat, "no primary role assigned"));
            }
        }

        for (&seat, bundle) in &self.pending_assignments {
            if self.player_by_seat(seat).is_none() {
                gaps.push(AssignmentGap::seat(seat, "no player at this seat"));
                continue;
            }
            let Some(role) = script.role(&bundle.role_id) else {
                gaps.push(AssignmentGap::seat(
                    seat,
                    format!("unknown role {}", bundle.role_id),
                ));
                continue;
            };

            for att in &bundle.attachments {
                match role.slot(&att.slot) {
                    None => gaps.push(AssignmentGap::slot(
                        seat,
                        att.slot.clone(),
                        att.index,
                        format!("role {} does not define this slot", role.name),
                    )),
                    Some(slot) => {
                        if att.index >= slot.count {
                            gaps.push(AssignmentGap::slot(
                                seat,
                                att.slot.clone(),
                                att.index,
                                format!("index out of range (max {})", slot.count - 1),
                            ));
                        }
                        match script.role(&att.role_id) {
                            None => gaps.push(AssignmentGap::slot(
                                seat,
                                att.slot.clone(),
                                att.index,
                                format!("unknown role {}", att.role_id),
                            )),
                            Some(attached) if !slot.admits(attached.team) => {
                                gaps.push(AssignmentGap::slot(
                                    seat,
                                    att.slot.clone(),
                                    att.index,
                                    format!("{} roles are not admitted here", attached.team),
                                ));
                            }
                            Some(_) => {}
                        }
                    }
                }
            }

            for slot in &role.attachment_slots {
                collect_slot_gaps(seat, slot, bundle, gaps);
            }
        }
    }

    /// Whether `role_id` already fills `slot_id` anywhere in the pending
    /// map, excluding the position being edited.
    fn slot_role_in_use(&self, slot_id: &str, role_id: &str, seat: u8, index: usize) -> bool {
        self.pending_assignments.iter().any(|(&s, bundle)| {
            bundle.attachments.iter().any(|att| {
                att.slot == slot_id
                    && att.role_id == role_id
                    && !(s == seat && att.index == index)
            })
        })
    }
}

/// Per-slot completeness: every index filled, no in-slot duplicates unless
/// the slot allows them.
fn collect_slot_gaps(
    seat: u8,
    slot: &AttachmentSlot,
    bundle: &RoleAssignment,
    gaps: &mut Vec<AssignmentGap>,
) {
    let mut filled: BTreeMap<usize, &str> = BTreeMap::new();
    for att in &bundle.attachments {
        if att.slot == slot.id && att.index < slot.count {
            filled.insert(att.index, att.role_id.as_str());
        }
    }
    for index in 0..slot.count {
        if !filled.contains_key(&index) {
            gaps.push(AssignmentGap::slot(
                seat,
                slot.id.clone(),
                index,
                "missing selection",
            ));
        }
    }
    if !slot.allow_duplicates {
        let unique: HashSet<&str> = filled.values().copied().collect();
        if unique.len() != filled.len() {
            gaps.push(AssignmentGap::slot(
                seat,
                slot.id.clone(),
                0,
                "duplicate selections in this slot",
            ));
        }
    }
}

/// Fill unfilled slots from the roles not dealt as primaries, honoring team
/// filters and duplicate rules.
fn auto_fill_attachments(
    script: &Script,
    assignments: &mut BTreeMap<u8, RoleAssignment>,
    rng: &mut StdRng,
) {
    let mut pool = attachment_pool(script, assignments);
    for bundle in assignments.values_mut() {
        let Some(role) = script.role(&bundle.role_id) else {
            continue;
        };
        for slot in &role.attachment_slots {
            for index in 0..slot.count {
                if bundle.attachment(&slot.id, index).is_some() {
                    continue;
                }
                let Some(candidate) = pick_candidate(rng, &mut pool, script, slot) else {
                    continue;
                };
                bundle.set_attachment(slot.id.clone(), index, candidate);
            }
        }
    }
}

/// Roles available for attachment: everything not dealt as a primary and
/// not already attached somewhere, grouped by team.
fn attachment_pool(
    script: &Script,
    assignments: &BTreeMap<u8, RoleAssignment>,
) -> BTreeMap<crate::models::Team, Vec<String>> {
    let primaries: HashSet<&str> = assignments
        .values()
        .map(|bundle| bundle.role_id.as_str())
        .collect();
    let mut pool: BTreeMap<crate::models::Team, Vec<String>> = BTreeMap::new();
    for role in &script.roles {
        if primaries.contains(role.id.as_str()) {
            continue;
        }
        pool.entry(role.team).or_default().push(role.id.clone());
    }
    for bundle in assignments.values() {
        for att in &bundle.attachments {
            if let Some(role) = script.role(&att.role_id) {
                if let Some(bucket) = pool.get_mut(&role.team) {
                    bucket.retain(|id| id != &att.role_id);
                }
            }
        }
    }
    pool
}

fn pick_candidate(
    rng: &mut StdRng,
    pool: &mut BTreeMap<crate::models::Team, Vec<String>>,
    script: &Script,
    slot: &AttachmentSlot,
) -> Option<String> {
    let candidates: Vec<String> = match &slot.team_filter {
        Some(teams) => teams
            .iter()
            .flat_map(|team| pool.get(team).cloned().unwrap_or_default())
            .collect(),
        None => pool.values().flatten().cloned().collect(),
    };
    let role_id = candidates.choose(rng)?.clone();
    if !slot.allow_duplicates {
        if let Some(role) = script.role(&role_id) {
            if let Some(bucket) = pool.get_mut(&role.team) {
                bucket.retain(|id| id != &role_id);
            }
        }
    }
    Some(role_id)
}
