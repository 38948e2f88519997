use std::io;

use thiserror::Error;

use crate::session::SessionId;

/// Failures that degrade a single session. None of them stop the hub.
#[derive(Debug, Error)]
pub enum HubError {
    /// Read or write failure on a session's stream.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// A recipient mailbox had no room for an outbound line.
    #[error("mailbox of {0} is full")]
    CapacityExceeded(SessionId),

    /// Arrived for an identity that is already registered.
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    /// Arrived while the registry already holds the configured maximum.
    #[error("hub is full ({limit} sessions)")]
    HubFull { limit: usize },

    /// The event loop has stopped and no longer takes events.
    #[error("hub is no longer accepting events")]
    HubClosed,
}
