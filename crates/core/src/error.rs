//! Error types for Lantern Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One unmet requirement discovered while committing pending assignments.
///
/// `slot`/`index` are present only for attachment-level problems; seat-level
/// problems (missing primary, broken seating) carry just the seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentGap {
    pub seat: u8,
    pub slot: Option<String>,
    pub index: Option<usize>,
    pub detail: String,
}

impl AssignmentGap {
    pub fn seat(seat: u8, detail: impl Into<String>) -> Self {
        Self {
            seat,
            slot: None,
            index: None,
            detail: detail.into(),
        }
    }

    pub fn slot(seat: u8, slot: impl Into<String>, index: usize, detail: impl Into<String>) -> Self {
        Self {
            seat,
            slot: Some(slot.into()),
            index: Some(index),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for AssignmentGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.slot {
            Some(slot) => write!(
                f,
                "seat {} [{}#{}]: {}",
                self.seat,
                slot,
                self.index.unwrap_or(0),
                self.detail
            ),
            None => write!(f, "seat {}: {}", self.seat, self.detail),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    /// Finalize failed closed; carries every violation found, not just the first.
    #[error("assignments incomplete: {}", format_gaps(.0))]
    IncompleteAssignments(Vec<AssignmentGap>),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("out of turn: {0}")]
    InvalidTurn(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("host only: {0}")]
    Unauthorized(String),
}

fn format_gaps(gaps: &[AssignmentGap]) -> String {
    gaps.iter()
        .map(|gap| gap.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Machine-readable rejection kinds carried on the wire.
///
/// `Protocol` is never produced by the engine itself; the transport assigns it
/// to frames that fail decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Validation,
    InvalidState,
    InvalidTurn,
    NotFound,
    Unauthorized,
    Protocol,
}

impl Error {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Error::Validation(_) | Error::IncompleteAssignments(_) => RejectionKind::Validation,
            Error::InvalidState(_) => RejectionKind::InvalidState,
            Error::InvalidTurn(_) => RejectionKind::InvalidTurn,
            Error::NotFound(_) => RejectionKind::NotFound,
            Error::Unauthorized(_) => RejectionKind::Unauthorized,
        }
    }

    /// Violations attached to this rejection, if any.
    pub fn gaps(&self) -> &[AssignmentGap] {
        match self {
            Error::IncompleteAssignments(gaps) => gaps,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
