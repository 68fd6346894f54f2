//! # Lobbyforge
//!
//! Lobby matchmaking core for team games.
//!
//! Players take seats in a lobby's fixed roster of team/class slots. When
//! every seat is taken the lobby asks everyone to ready up within a
//! timeout; when everyone has, the match starts. Lobbyforge runs that
//! lifecycle for many lobbies at once, with one lock per lobby, and talks
//! to the outside world through three traits: a server allocator, a
//! repository and a notification sink.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbyforge::prelude::*;
//!
//! # async fn demo() -> Result<(), LobbyforgeError> {
//! lobbyforge::init_tracing();
//!
//! let (service, _events) = Lobbyforge::builder().build_in_memory();
//! let creator = service.repository().register(PlayerId(1)).id;
//!
//! let lobby = service
//!     .create_lobby(creator, LobbySettings::new(LobbyType::Sixes, "cp_process_final"))
//!     .await?;
//! service.join(lobby.id, creator, Team::Red, "medic", None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `lobbyforge-types`: ids, roles and lobby formats
//! - `lobbyforge-timer`: keyed cancelable timers (readiness timeouts)
//! - `lobbyforge-lobby`: roster, state machine, locks, service

mod builder;
mod error;

pub use builder::{InMemoryService, Lobbyforge, LobbyforgeBuilder};
pub use error::LobbyforgeError;

pub use lobbyforge_lobby as lobby;
pub use lobbyforge_types as types;

/// Installs a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `info` when `RUST_LOG` is unset or invalid. Calling it
/// again after a subscriber is installed does nothing. Libraries should
/// never call this; binaries call it once at startup.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}

pub mod prelude {
    pub use crate::{InMemoryService, Lobbyforge, LobbyforgeBuilder, LobbyforgeError};

    pub use lobbyforge_lobby::{
        Actor, AllocationError, CloseReason, ErrorKind, LobbyConfig, LobbyError, LobbyEvent,
        LobbyService, LobbySettings, LobbySnapshot, LobbyState, MemoryAllocator,
        MemoryRepository, NotificationSink, NullSink, PlayerRecord, Repository, Requirement,
        ServerAllocator, ServerConfig, SlotSnapshot,
    };
    pub use lobbyforge_types::{
        League, LobbyId, LobbyType, ParseError, PlayerId, Role, ServerRef, Team,
    };
}
