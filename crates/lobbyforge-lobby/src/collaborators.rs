//! The seams between the lobby core and the outside world.
//!
//! The lobby core doesn't know how game servers are provisioned, where
//! players and lobbies are stored, or how clients are reached. It asks
//! three traits instead:
//!
//! - [`ServerAllocator`]: hands out and takes back game servers (async,
//!   since provisioning usually talks to a remote host).
//! - [`Repository`]: player records, played-lobby counters, and lobby
//!   snapshots.
//! - [`NotificationSink`]: fire-and-forget delivery of [`LobbyEvent`]s.
//!
//! In-memory implementations live in [`crate::memory`] for tests and
//! single-process deployments.

use std::future::Future;

use lobbyforge_types::{LobbyId, LobbyType, PlayerId, ServerRef};
use tokio::sync::mpsc;

use crate::{LobbyEvent, LobbySnapshot, PlayerRecord};

// ---------------------------------------------------------------------------
// Server allocation
// ---------------------------------------------------------------------------

/// What the allocator needs to prepare a game server for a lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub lobby: LobbyId,
    pub host: String,
    pub rcon_password: String,
    /// Freshly generated password players use to connect.
    pub server_password: String,
}

/// Why a server couldn't be allocated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// No capacity left, or the host is already in use.
    #[error("no server available: {0}")]
    Unavailable(String),

    /// The host rejected the configuration (bad rcon password, ...).
    #[error("server rejected configuration: {0}")]
    Rejected(String),

    /// The server isn't known to the allocator.
    #[error("unknown server {0}")]
    UnknownServer(ServerRef),
}

/// Provisions game servers for lobbies.
///
/// Implementations must be safe to share across tasks. The lobby core
/// releases a server exactly once, after the last lobby referencing it
/// has ended.
pub trait ServerAllocator: Send + Sync + 'static {
    /// Reserves and configures a server.
    fn allocate(
        &self,
        config: ServerConfig,
    ) -> impl Future<Output = Result<ServerRef, AllocationError>> + Send;

    /// Returns a server to the pool.
    fn release(
        &self,
        server: ServerRef,
    ) -> impl Future<Output = Result<(), AllocationError>> + Send;

    /// Every server currently reserved, for garbage collection sweeps.
    fn allocated(&self) -> impl Future<Output = Vec<ServerRef>> + Send;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Storage for players and lobby snapshots.
///
/// Calls are synchronous and made while a lobby lock may be held, so
/// implementations should not block for long.
pub trait Repository: Send + Sync + 'static {
    /// Looks up a player.
    fn player(&self, id: PlayerId) -> Option<PlayerRecord>;

    /// Bumps `id`'s played-lobby counter for `lobby_type`.
    fn record_played(&self, id: PlayerId, lobby_type: LobbyType);

    /// Inserts or replaces the stored snapshot for `snapshot.id`.
    fn save_lobby(&self, snapshot: &LobbySnapshot);

    fn load_lobby(&self, id: LobbyId) -> Option<LobbySnapshot>;

    /// All stored snapshots matching `filter`, in no particular order.
    fn find_lobbies(&self, filter: &dyn Fn(&LobbySnapshot) -> bool) -> Vec<LobbySnapshot>;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Receives lobby events for delivery to clients.
///
/// Must not block: events are emitted while a lobby lock is held.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, event: LobbyEvent);
}

/// Forwards events into a channel. A closed receiver drops events.
impl NotificationSink for mpsc::UnboundedSender<LobbyEvent> {
    fn notify(&self, event: LobbyEvent) {
        if self.send(event).is_err() {
            tracing::trace!("notification receiver dropped");
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _event: LobbyEvent) {}
}
