//! Lantern networking
//!
//! TCP transport for the room engine: length-prefixed JSON frames, the
//! closed protocol union, the room directory with per-room serialization
//! and snapshot fan-out, the server connection manager, and a client
//! handle.

pub mod client;
pub mod directory;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod server;

pub use client::{Client, ServerEvent, SessionInfo};
pub use directory::{RoomDirectory, RoomHandle, SessionTicket};
pub use error::{Error, Result};
pub use protocol::Message;
pub use server::RoomServer;
