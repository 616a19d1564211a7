use crate::session::{ConnectionId, SessionId};

/// Errors raised by the registry and the session actors.
///
/// Only `NotFound` ever reaches a client (through the `join-remote` ack);
/// the rest are logged and swallowed at the relay boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("presentation not found: {0}")]
    NotFound(SessionId),

    #[error("connection {connection} may not act on presentation {session}")]
    Unauthorized {
        session: SessionId,
        connection: ConnectionId,
    },

    #[error("could not allocate a unique session id after {attempts} attempts")]
    IdCollision { attempts: usize },

    #[error("presentation {0} is no longer running")]
    SessionClosed(SessionId),
}

pub type Result<T> = std::result::Result<T, RelayError>;
