//! Error types for the lobby layer.

use lobbyforge_types::{LobbyId, PlayerId};

use crate::LobbyState;

/// Errors that can occur during lobby operations.
///
/// Every variant is recoverable at the request level: the operation is
/// rejected and the lobby is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// The request was malformed (empty map name, self-ban, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The slot index is outside `0..slot_count`.
    #[error("slot {slot} is out of range (lobby has {slots} slots)")]
    SlotOutOfRange { slot: usize, slots: usize },

    /// Another player already sits in this slot.
    #[error("slot {0} is occupied by another player")]
    SlotOccupiedByOther(usize),

    /// The player was banned from this lobby.
    #[error("player {0} is banned from this lobby")]
    PlayerBanned(PlayerId),

    /// The lobby is password protected and the password didn't match.
    #[error("incorrect slot password")]
    BadSlotPassword,

    /// The slot requires more play hours than the player has.
    #[error("slot requires {required} hours, player has {actual}")]
    RequirementHours { required: u32, actual: u32 },

    /// The slot requires more completed lobbies of this type.
    #[error("slot requires {required} played lobbies, player has {actual}")]
    RequirementLobbies { required: u32, actual: u32 },

    /// The player already occupies a slot, so can't be a spectator.
    #[error("player {0} already occupies a slot")]
    AlreadyInSlot(PlayerId),

    /// The lobby is in a state that doesn't allow this operation.
    /// For example, readying up while the lobby is still Waiting.
    #[error("cannot {operation} while lobby is {state}")]
    InvalidState {
        operation: &'static str,
        state: LobbyState,
    },

    /// The actor lacks the privilege for an administrative action.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The lobby does not exist.
    #[error("lobby {0} not found")]
    LobbyNotFound(LobbyId),

    /// The player is unknown to the repository.
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// The player is neither seated nor spectating here.
    #[error("player {0} is not in this lobby")]
    PlayerNotInLobby(PlayerId),

    /// The server allocator refused or failed.
    #[error("server allocation failed: {0}")]
    Allocation(String),
}

/// Coarse classification of a [`LobbyError`], for mapping onto transport
/// status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Eligibility,
    StateConflict,
    Authorization,
    NotFound,
    External,
}

impl LobbyError {
    /// Returns which part of the taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::SlotOutOfRange { .. } => ErrorKind::Validation,
            Self::SlotOccupiedByOther(_)
            | Self::PlayerBanned(_)
            | Self::BadSlotPassword
            | Self::RequirementHours { .. }
            | Self::RequirementLobbies { .. }
            | Self::AlreadyInSlot(_) => ErrorKind::Eligibility,
            Self::InvalidState { .. } => ErrorKind::StateConflict,
            Self::NotAuthorized(_) => ErrorKind::Authorization,
            Self::LobbyNotFound(_) | Self::PlayerNotFound(_) | Self::PlayerNotInLobby(_) => {
                ErrorKind::NotFound
            }
            Self::Allocation(_) => ErrorKind::External,
        }
    }
}
