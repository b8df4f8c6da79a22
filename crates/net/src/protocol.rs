//! Network protocol message types
//!
//! One closed, internally-tagged union covers both directions. All messages
//! are JSON-serialized and length-prefixed on the wire; an unknown tag fails
//! decoding and is answered with a `rejected` frame, never a crash.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lantern_core::Command as RoomCommand;
use lantern_core::{RejectionKind, RoomSnapshot};

/// Protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Client opens a new room and becomes its storyteller
    CreateRoom {
        script_id: Option<String>,
        host_name: String,
    },

    /// Client joins an existing room by join code
    JoinRoom { join_code: String, name: String },

    /// Client reconnects with a previously issued identity; treated as a
    /// fresh subscription
    Resume { room_id: Uuid, player_id: Uuid },

    /// Client issues a room command
    Command { command: RoomCommand },

    /// Client asks for a fresh full snapshot
    RequestSnapshot,

    /// Ping to keep the connection alive
    Ping,

    /// Server accepts a create/join/resume
    Welcome {
        room_id: Uuid,
        player_id: Uuid,
        seat: u8,
        is_host: bool,
    },

    /// Full per-viewer snapshot; sent on subscribe and after every
    /// committed mutation
    Snapshot { snapshot: Box<RoomSnapshot> },

    /// A command or frame was rejected; room state is unchanged
    Rejected {
        kind: RejectionKind,
        detail: String,
    },

    /// Pong response to ping
    Pong,

    /// Server is shutting down
    ServerShutdown,
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
