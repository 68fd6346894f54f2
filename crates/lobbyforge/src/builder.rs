//! `Lobbyforge` builder.
//!
//! This is the entry point for standing up a lobby service. It collects
//! configuration, then ties it to the three collaborators: the server
//! allocator, the repository and the notification sink.

use std::time::Duration;

use lobbyforge_lobby::{
    LobbyConfig, LobbyEvent, LobbyService, MemoryAllocator, MemoryRepository, NotificationSink,
    Repository, ServerAllocator,
};
use tokio::sync::mpsc;

/// A service wired to the in-memory collaborators and a channel sink.
pub type InMemoryService =
    LobbyService<MemoryAllocator, MemoryRepository, mpsc::UnboundedSender<LobbyEvent>>;

/// Namespace for [`Lobbyforge::builder`].
#[derive(Debug, Clone, Copy)]
pub struct Lobbyforge;

impl Lobbyforge {
    /// Creates a new builder.
    pub fn builder() -> LobbyforgeBuilder {
        LobbyforgeBuilder::new()
    }
}

/// Builder for configuring a [`LobbyService`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use lobbyforge::prelude::*;
///
/// # async fn demo() -> Result<(), LobbyforgeError> {
/// let (_service, _events) = Lobbyforge::builder()
///     .ready_timeout(Duration::from_secs(30))
///     .build_in_memory();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LobbyforgeBuilder {
    config: LobbyConfig,
}

impl LobbyforgeBuilder {
    /// Creates a builder with [`LobbyConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: LobbyConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long occupants have to ready up.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.ready_timeout = timeout;
        self
    }

    /// Caps substitutions for every lobby, overriding the per-type cap.
    pub fn max_substitutes(mut self, max: u32) -> Self {
        self.config.max_substitutes = Some(max);
        self
    }

    /// Sets the length of generated game-server passwords.
    pub fn server_password_len(mut self, len: usize) -> Self {
        self.config.server_password_len = len;
        self
    }

    /// Builds the service. Out-of-range settings are clamped.
    pub fn build<A, R, N>(self, allocator: A, repository: R, sink: N) -> LobbyService<A, R, N>
    where
        A: ServerAllocator,
        R: Repository,
        N: NotificationSink,
    {
        tracing::debug!(config = ?self.config, "building lobby service");
        LobbyService::new(self.config, allocator, repository, sink)
    }

    /// Builds a service on the in-memory collaborators, returning the
    /// receiving end of its event stream.
    pub fn build_in_memory(self) -> (InMemoryService, mpsc::UnboundedReceiver<LobbyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = self.build(MemoryAllocator::new(), MemoryRepository::new(), tx);
        (service, rx)
    }
}
