//! Error types for the shared vocabulary.

/// Errors produced when turning user-supplied strings into typed values.
///
/// Lobby creation and slot selection arrive as plain strings from the
/// transport layer ("sixes", "red", "medic"). Parsing them up front means
/// the lobby layer only ever sees well-formed values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The lobby type name is not one of the supported formats.
    #[error("unknown lobby type: {0}")]
    UnknownLobbyType(String),

    /// The league name is not recognized.
    #[error("unknown league: {0}")]
    UnknownLeague(String),

    /// The team must be `red` or `blu`.
    #[error("unknown team: {0}")]
    UnknownTeam(String),

    /// The class does not exist in this lobby type's layout.
    #[error("class {class} is not part of the {lobby_type} format")]
    UnknownClass {
        lobby_type: crate::LobbyType,
        class: String,
    },
}
