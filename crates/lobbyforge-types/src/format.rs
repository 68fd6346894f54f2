//! Lobby formats and their slot layouts.
//!
//! A lobby's [`LobbyType`] fixes everything about its roster shape: the
//! ordered class list for one team, and therefore the total number of
//! slots (`2 × classes`). Slots `0..classes` belong to Red and
//! `classes..2×classes` to Blu, with the same class order on both sides:
//!
//! ```text
//! Sixes:  0 scout1 (red) ... 5 medic (red) | 6 scout1 (blu) ... 11 medic (blu)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// One side of the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blu,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Blu => write!(f, "blu"),
        }
    }
}

impl FromStr for Team {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red" => Ok(Self::Red),
            "blu" => Ok(Self::Blu),
            other => Err(ParseError::UnknownTeam(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// League
// ---------------------------------------------------------------------------

/// The competitive league whose rules a lobby is played under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Ugc,
    Etf2l,
    Esea,
    AsiaFortress,
    OzFortress,
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ugc => "ugc",
            Self::Etf2l => "etf2l",
            Self::Esea => "esea",
            Self::AsiaFortress => "asiafortress",
            Self::OzFortress => "ozfortress",
        };
        f.write_str(name)
    }
}

impl FromStr for League {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ugc" => Ok(Self::Ugc),
            "etf2l" => Ok(Self::Etf2l),
            "esea" => Ok(Self::Esea),
            "asiafortress" => Ok(Self::AsiaFortress),
            "ozfortress" => Ok(Self::OzFortress),
            other => Err(ParseError::UnknownLeague(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyType
// ---------------------------------------------------------------------------

/// The game mode of a lobby.
///
/// `Debug` is a two-seat format (one scout per team) used for testing the
/// full lifecycle without twelve clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyType {
    Debug,
    Sixes,
    Highlander,
    Fours,
    Ultiduo,
    Bball,
}

/// The fixed label of one roster seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotLabel {
    pub team: Team,
    pub class: &'static str,
}

impl LobbyType {
    /// Every supported format, in display order.
    pub const ALL: [LobbyType; 6] = [
        Self::Debug,
        Self::Sixes,
        Self::Highlander,
        Self::Fours,
        Self::Ultiduo,
        Self::Bball,
    ];

    /// The per-team class list, in slot order.
    pub fn classes(self) -> &'static [&'static str] {
        match self {
            Self::Debug => &["scout"],
            Self::Sixes => &["scout1", "scout2", "roamer", "pocket", "demoman", "medic"],
            Self::Highlander => &[
                "scout", "soldier", "pyro", "demoman", "heavy", "engineer", "medic", "sniper",
                "spy",
            ],
            Self::Fours => &["scout", "soldier", "demoman", "medic"],
            Self::Ultiduo => &["soldier", "medic"],
            Self::Bball => &["soldier1", "soldier2"],
        }
    }

    /// Number of classes per team.
    pub fn classes_per_team(self) -> usize {
        self.classes().len()
    }

    /// Total number of roster slots (both teams).
    pub fn slot_count(self) -> usize {
        self.classes_per_team() * 2
    }

    /// How many substitutions a lobby of this type tolerates before it is
    /// force-closed. Defaults to one per seat.
    pub fn max_substitutes(self) -> u32 {
        self.slot_count() as u32
    }

    /// Returns the team/class label of a slot, or `None` if out of range.
    pub fn label(self, slot: usize) -> Option<SlotLabel> {
        let per_team = self.classes_per_team();
        if slot >= self.slot_count() {
            return None;
        }
        let (team, offset) = if slot < per_team {
            (Team::Red, slot)
        } else {
            (Team::Blu, slot - per_team)
        };
        Some(SlotLabel {
            team,
            class: self.classes()[offset],
        })
    }

    /// Resolves a team + class pair to a slot index.
    pub fn slot_for(self, team: Team, class: &str) -> Result<usize, ParseError> {
        let offset = self
            .classes()
            .iter()
            .position(|c| *c == class)
            .ok_or_else(|| ParseError::UnknownClass {
                lobby_type: self,
                class: class.to_string(),
            })?;
        Ok(match team {
            Team::Red => offset,
            Team::Blu => offset + self.classes_per_team(),
        })
    }
}

impl fmt::Display for LobbyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Sixes => "sixes",
            Self::Highlander => "highlander",
            Self::Fours => "fours",
            Self::Ultiduo => "ultiduo",
            Self::Bball => "bball",
        };
        f.write_str(name)
    }
}

impl FromStr for LobbyType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.to_string() == s)
            .ok_or_else(|| ParseError::UnknownLobbyType(s.to_string()))
    }
}
