//! Lobby lifecycle management for Lobbyforge.
//!
//! A lobby is a fixed roster of team/class slots that fills up, readies
//! up under a timeout, plays, and ends. This crate holds the rules for
//! that lifecycle and the service that runs them concurrently.
//!
//! # Key types
//!
//! - [`Roster`]: slot occupancy, spectators, bans, per-slot requirements
//! - [`Requirement`]: hours / played-lobby thresholds gating a slot
//! - [`Lobby`]: the aggregate root and its state machine
//! - [`LobbyState`]: Waiting → ReadyingUp → InProgress → Ended
//! - [`LobbyLocks`]: one async mutex per lobby, ordered pair locking
//! - [`LobbyService`]: the operation surface; timers, finalizer, events
//! - [`ServerAllocator`], [`Repository`], [`NotificationSink`]: the
//!   collaborators the service talks to

#![allow(async_fn_in_trait)]

mod closure;
mod collaborators;
mod config;
mod error;
mod lobby;
mod locks;
mod manager;
pub mod memory;
mod requirement;
mod roster;
mod snapshot;

pub use collaborators::{
    AllocationError, NotificationSink, NullSink, Repository, ServerAllocator, ServerConfig,
};
pub use config::{LobbyConfig, LobbyState};
pub use error::{ErrorKind, LobbyError};
pub use lobby::{Actor, CloseReason, Kicked, Lobby, LobbySettings, Transition};
pub use locks::{LobbyGuard, LobbyLocks};
pub use manager::LobbyService;
pub use memory::{MemoryAllocator, MemoryRepository};
pub use requirement::{PlayerRecord, Requirement};
pub use roster::{Roster, Slot};
pub use snapshot::{LobbyEvent, LobbySnapshot, SlotSnapshot};
