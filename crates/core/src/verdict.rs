//! Execution resolver
//!
//! The single canonical threshold/tie-break computation. It runs in the
//! engine and rides along in every snapshot; clients never re-derive it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ExecutionRecord, LifeStatus, Nomination, Room};

/// Votes needed to put a nominee on the block.
pub fn execution_threshold(alive: usize) -> i64 {
    (alive / 2) as i64 + 1
}

/// Resolution of one day's completed nominations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOutcome {
    pub day: u32,
    pub alive_count: usize,
    pub threshold: i64,
    /// The nomination on the block, if a unique maximum reached the
    /// threshold
    pub on_block: Option<Uuid>,
    /// True when two or more nominations tied at the winning total; a tie
    /// cancels the execution
    pub tie: bool,
}

impl Room {
    /// A nomination's effective total: the host override if set, else the
    /// recorded yes-count.
    pub fn effective_total(&self, nomination: &Nomination) -> i64 {
        nomination
            .manual_total
            .unwrap_or_else(|| self.yes_votes(nomination.id) as i64)
    }

    /// Alive count used for `day`'s threshold: snapshotted from the day's
    /// latest execution record when one exists, else the live count.
    pub fn alive_for_day(&self, day: u32) -> usize {
        self.executions
            .iter()
            .rev()
            .find(|record| record.day == day)
            .map(|record| record.alive_count)
            .unwrap_or_else(|| self.alive_count())
    }

    /// Resolve which nomination (if any) is on the block for `day`.
    pub fn resolve_block(&self, day: u32) -> BlockOutcome {
        let alive_count = self.alive_for_day(day);
        let threshold = execution_threshold(alive_count);

        let mut best: Option<(Uuid, i64)> = None;
        let mut tie = false;
        for nomination in &self.nominations {
            if nomination.day != day || !nomination.vote_completed {
                continue;
            }
            let total = self.effective_total(nomination);
            if total < threshold {
                continue;
            }
            match best {
                None => {
                    best = Some((nomination.id, total));
                    tie = false;
                }
                Some((_, best_total)) if total > best_total => {
                    best = Some((nomination.id, total));
                    tie = false;
                }
                Some((_, best_total)) if total == best_total => {
                    tie = true;
                }
                Some(_) => {}
            }
        }

        BlockOutcome {
            day,
            alive_count,
            threshold,
            on_block: if tie { None } else { best.map(|(id, _)| id) },
            tie,
        }
    }

    /// Record the day's execution outcome.
    ///
    /// Appends a record for the current day; callers avoid duplicate calls,
    /// the engine does not dedupe. `target_dead = Some(true)` also kills the
    /// target (executed seat's occupant, else the nominee's); `Some(false)`
    /// leaves them alive despite the block.
    pub fn record_execution(
        &mut self,
        nomination_id: Option<Uuid>,
        executed_seat: Option<u8>,
        target_dead: Option<bool>,
    ) -> Result<()> {
        let (nominee_seat, votes_for) = match nomination_id {
            Some(id) => {
                let nomination = self
                    .nomination(id)
                    .ok_or_else(|| Error::NotFound(format!("nomination {id}")))?;
                (Some(nomination.nominee_seat), self.yes_votes(id))
            }
            None => (None, 0),
        };
        let alive_count = self.alive_count();

        self.executions.push(ExecutionRecord {
            day: self.day,
            nominee_seat,
            executed_seat,
            votes_for,
            alive_count,
            nomination_id,
            target_dead,
            ts: Utc::now(),
        });

        if target_dead == Some(true) {
            if let Some(seat) = executed_seat.or(nominee_seat) {
                if let Some(player_id) = self.player_by_seat(seat).map(|p| p.id) {
                    if let Some(player) = self.player_mut(player_id) {
                        // Executed players keep their ghost vote.
                        player.set_status(LifeStatus::DeadVote);
                    }
                }
            }
        }

        self.record_event(
            "execution_recorded",
            json!({
                "nomination_id": nomination_id,
                "executed": executed_seat,
                "votes_for": votes_for,
                "alive_count": alive_count,
                "target_dead": target_dead,
            }),
        );
        tracing::info!(room_id = %self.id, day = self.day, executed = ?executed_seat, "Execution recorded");
        Ok(())
    }
}
