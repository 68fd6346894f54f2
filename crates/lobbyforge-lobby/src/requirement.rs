//! Per-slot eligibility rules.
//!
//! A [`Requirement`] gates who may take a particular slot. It is checked
//! once, when a player is assigned, and never re-evaluated afterwards.

use std::collections::HashMap;

use lobbyforge_types::{LobbyType, PlayerId, Role};
use serde::{Deserialize, Serialize};

use crate::LobbyError;

/// What the lobby core knows about a player.
///
/// Loaded from the repository at assignment time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    /// Total hours played, as reported by the identity provider.
    pub game_hours: u32,
    /// Completed lobbies per lobby type.
    pub played: HashMap<LobbyType, u32>,
}

impl PlayerRecord {
    /// A fresh player with no history.
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Completed lobbies of the given type.
    pub fn played_count(&self, lobby_type: LobbyType) -> u32 {
        self.played.get(&lobby_type).copied().unwrap_or(0)
    }
}

/// Minimum history a player needs to take a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Minimum total game hours.
    pub hours: u32,
    /// Minimum completed lobbies of the lobby's own type.
    pub lobbies: u32,
}

impl Requirement {
    /// Checks `player` against both thresholds.
    ///
    /// Hours are checked before lobby count; the first unmet threshold
    /// decides the error.
    pub fn check(&self, player: &PlayerRecord, lobby_type: LobbyType) -> Result<(), LobbyError> {
        if player.game_hours < self.hours {
            return Err(LobbyError::RequirementHours {
                required: self.hours,
                actual: player.game_hours,
            });
        }
        let played = player.played_count(lobby_type);
        if played < self.lobbies {
            return Err(LobbyError::RequirementLobbies {
                required: self.lobbies,
                actual: played,
            });
        }
        Ok(())
    }

    /// Returns `true` if `player` satisfies both thresholds.
    pub fn meets(&self, player: &PlayerRecord, lobby_type: LobbyType) -> bool {
        self.check(player, lobby_type).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(hours: u32, sixes: u32) -> PlayerRecord {
        let mut p = PlayerRecord::new(PlayerId(1), "scout");
        p.game_hours = hours;
        p.played.insert(LobbyType::Sixes, sixes);
        p
    }

    #[test]
    fn test_check_hours_reported_before_lobbies() {
        let req = Requirement { hours: 1, lobbies: 1 };
        assert_eq!(
            req.check(&player(0, 0), LobbyType::Sixes),
            Err(LobbyError::RequirementHours { required: 1, actual: 0 })
        );
        assert_eq!(
            req.check(&player(2, 0), LobbyType::Sixes),
            Err(LobbyError::RequirementLobbies { required: 1, actual: 0 })
        );
        assert!(req.meets(&player(2, 1), LobbyType::Sixes));
    }

    #[test]
    fn test_check_counts_only_matching_type() {
        let req = Requirement { hours: 0, lobbies: 1 };
        let p = player(10, 5);
        assert!(req.meets(&p, LobbyType::Sixes));
        assert!(!req.meets(&p, LobbyType::Highlander));
    }

    #[test]
    fn test_default_requirement_always_passes() {
        assert!(Requirement::default().meets(&PlayerRecord::default(), LobbyType::Debug));
    }
}
