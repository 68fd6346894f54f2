//! Lobby configuration and state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Service-wide lobby settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// How long occupants have to ready up once the roster fills.
    pub ready_timeout: Duration,

    /// Substitution cap applied to every lobby. `None` uses the lobby
    /// type's own cap.
    pub max_substitutes: Option<u32>,

    /// Length (hex characters) of the generated game-server password.
    pub server_password_len: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            max_substitutes: None,
            server_password_len: 12,
        }
    }
}

impl LobbyConfig {
    /// Shortest readiness window accepted by [`validated`](Self::validated).
    pub const MIN_READY_TIMEOUT: Duration = Duration::from_secs(1);

    /// Shortest server password accepted by [`validated`](Self::validated).
    pub const MIN_PASSWORD_LEN: usize = 8;

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// - `ready_timeout` raised to [`Self::MIN_READY_TIMEOUT`].
    /// - `max_substitutes` of zero treated as one.
    /// - `server_password_len` raised to [`Self::MIN_PASSWORD_LEN`].
    pub fn validated(mut self) -> Self {
        if self.ready_timeout < Self::MIN_READY_TIMEOUT {
            tracing::warn!(
                ready_timeout_ms = self.ready_timeout.as_millis() as u64,
                "ready_timeout below minimum, clamping"
            );
            self.ready_timeout = Self::MIN_READY_TIMEOUT;
        }
        if self.max_substitutes == Some(0) {
            tracing::warn!("max_substitutes of 0 would close every lobby, using 1");
            self.max_substitutes = Some(1);
        }
        if self.server_password_len < Self::MIN_PASSWORD_LEN {
            tracing::warn!(
                len = self.server_password_len,
                "server_password_len below minimum, clamping"
            );
            self.server_password_len = Self::MIN_PASSWORD_LEN;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// LobbyState
// ---------------------------------------------------------------------------

/// The lifecycle state of a lobby.
///
/// ```text
///            full              all ready
/// Waiting ─────────→ ReadyingUp ─────────→ InProgress ──→ Ended
///    ↑                   │                                  ↑
///    └── leave/timeout ──┘          close (from any state) ─┘
/// ```
///
/// - **Waiting**: Accepting joins. Roster not yet full.
/// - **ReadyingUp**: Roster full, occupants confirming readiness under a
///   timeout.
/// - **InProgress**: Match running. Only substitutes may join.
/// - **Ended**: Terminal. No roster mutation accepted.
///
/// Waiting ⇄ ReadyingUp is the only backwards edge. An administrative
/// start may also jump from Waiting straight to InProgress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobbyState {
    Waiting,
    ReadyingUp,
    InProgress,
    Ended,
}

impl LobbyState {
    /// Returns `true` until the lobby has ended.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Ended)
    }

    /// Returns `true` once the match has started (or finished).
    pub fn has_started(&self) -> bool {
        matches!(self, Self::InProgress | Self::Ended)
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        use LobbyState::*;
        matches!(
            (self, target),
            (Waiting, ReadyingUp)
                | (ReadyingUp, Waiting)
                | (ReadyingUp, InProgress)
                | (Waiting, InProgress)
                | (Waiting | ReadyingUp | InProgress, Ended)
        )
    }
}

impl std::fmt::Display for LobbyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::ReadyingUp => write!(f, "ReadyingUp"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}
