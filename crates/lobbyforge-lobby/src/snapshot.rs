//! Read-only projections of a lobby and the events pushed to clients.
//!
//! Snapshots are what the repository stores and what listings return.
//! Events go to the [`NotificationSink`](crate::NotificationSink) after
//! each state change. Both serialize with serde so a transport layer can
//! forward them as JSON without another mapping step.

use lobbyforge_types::{League, LobbyId, LobbyType, PlayerId, ServerRef, Team};
use serde::{Deserialize, Serialize};

use crate::{CloseReason, LobbyState};

/// One slot as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub team: Team,
    pub class: String,
    pub player: Option<PlayerId>,
    pub ready: bool,
    pub in_game: bool,
    pub needs_sub: bool,
}

/// A point-in-time copy of a lobby. Never contains passwords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub id: LobbyId,
    pub lobby_type: LobbyType,
    pub map: String,
    pub league: League,
    pub whitelist: u32,
    pub mumble_required: bool,
    pub password_protected: bool,
    pub creator: PlayerId,
    pub server: ServerRef,
    pub state: LobbyState,
    pub players: usize,
    pub max_players: usize,
    pub substitutions: u32,
    pub slots: Vec<SlotSnapshot>,
    pub spectators: Vec<PlayerId>,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
    pub close_reason: Option<CloseReason>,
}

impl LobbySnapshot {
    /// Slots belonging to `team`, in slot order.
    pub fn team(&self, team: Team) -> impl Iterator<Item = &SlotSnapshot> {
        self.slots.iter().filter(move |s| s.team == team)
    }

    /// Indices of slots waiting for a substitute.
    pub fn open_sub_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|s| s.needs_sub)
            .map(|s| s.index)
            .collect()
    }
}

/// Something clients of a lobby should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LobbyEvent {
    /// The lobby changed; carries the new snapshot.
    LobbyUpdated { snapshot: LobbySnapshot },
    /// The roster filled; occupants have `timeout_secs` to ready up.
    ReadyUp { lobby: LobbyId, timeout_secs: u64 },
    /// Every occupant readied (or an admin forced the start).
    LobbyStarted { lobby: LobbyId },
    /// The lobby ended.
    LobbyClosed { lobby: LobbyId, reason: CloseReason },
    /// A player was dropped from the lobby without asking to leave.
    Removed { lobby: LobbyId, player: PlayerId },
    /// A chat line from the system.
    SystemMessage { lobby: LobbyId, text: String },
    /// Something changed the public lobby listing.
    LobbyListChanged,
}

impl LobbyEvent {
    /// The lobby this event concerns, if any.
    pub fn lobby(&self) -> Option<LobbyId> {
        match self {
            Self::LobbyUpdated { snapshot } => Some(snapshot.id),
            Self::ReadyUp { lobby, .. }
            | Self::LobbyStarted { lobby }
            | Self::LobbyClosed { lobby, .. }
            | Self::Removed { lobby, .. }
            | Self::SystemMessage { lobby, .. } => Some(*lobby),
            Self::LobbyListChanged => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = LobbyEvent::ReadyUp {
            lobby: LobbyId(4),
            timeout_secs: 30,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ready_up");
        assert_eq!(json["lobby"], 4);
        assert_eq!(json["timeout_secs"], 30);
    }

    #[test]
    fn test_close_event_carries_reason() {
        let event = LobbyEvent::LobbyClosed {
            lobby: LobbyId(1),
            reason: CloseReason::TooManySubs,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: LobbyEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.lobby(), Some(LobbyId(1)));
    }

    #[test]
    fn test_list_changed_has_no_lobby() {
        assert_eq!(LobbyEvent::LobbyListChanged.lobby(), None);
    }
}
