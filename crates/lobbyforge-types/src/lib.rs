//! Shared vocabulary for Lobbyforge.
//!
//! This crate defines the small, copyable types every other layer talks
//! in:
//!
//! - **Identity** ([`PlayerId`], [`LobbyId`], [`ServerRef`]): newtype
//!   wrappers so a lobby id can never be passed where a player id is
//!   expected.
//! - **Formats** ([`LobbyType`], [`Team`], [`League`]): the game modes
//!   a lobby can be created for. A format fixes the slot layout: how many
//!   seats exist and which class/team label each seat carries.
//! - **Roles** ([`Role`]): the privilege level of whoever is asking for
//!   an administrative action.
//!
//! # Architecture
//!
//! ```text
//! lobbyforge (facade) → lobbyforge-lobby (state machine) → lobbyforge-types
//! ```
//!
//! Nothing here knows about locks, timers or storage.

mod error;
mod format;
mod types;

pub use error::ParseError;
pub use format::{League, LobbyType, SlotLabel, Team};
pub use types::{LobbyId, PlayerId, Role, ServerRef};
