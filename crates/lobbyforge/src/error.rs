//! Unified error type for Lobbyforge.

use lobbyforge_lobby::{AllocationError, ErrorKind, LobbyError};
use lobbyforge_types::ParseError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `lobbyforge` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate. The
/// `#[from]` attribute on each variant generates the `From` impls, so `?`
/// converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LobbyforgeError {
    /// A lobby operation was rejected (eligibility, state, auth, ...).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// A lobby type, league, team or class name didn't parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The server allocator failed outside a lobby operation.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

impl LobbyforgeError {
    /// Which part of the error taxonomy this belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Lobby(e) => e.kind(),
            Self::Parse(_) => ErrorKind::Validation,
            Self::Allocation(_) => ErrorKind::External,
        }
    }
}
