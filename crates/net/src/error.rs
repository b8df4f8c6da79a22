//! Network error types

use std::io;

use lantern_core::RejectionKind;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Rejected ({kind:?}): {detail}")]
    Rejected { kind: RejectionKind, detail: String },

    #[error("Not connected")]
    NotConnected,
}

impl From<lantern_core::Error> for Error {
    fn from(err: lantern_core::Error) -> Self {
        Error::Rejected {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}
