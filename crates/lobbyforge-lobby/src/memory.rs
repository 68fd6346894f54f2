//! In-memory collaborators.
//!
//! Good enough for tests, demos, and a single-process deployment that
//! doesn't need to survive restarts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lobbyforge_types::{LobbyId, LobbyType, PlayerId, ServerRef};

use crate::{
    AllocationError, LobbySnapshot, PlayerRecord, Repository, ServerAllocator, ServerConfig,
};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// A [`Repository`] backed by two hash maps.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    players: Mutex<HashMap<PlayerId, PlayerRecord>>,
    lobbies: Mutex<HashMap<LobbyId, LobbySnapshot>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a player record.
    pub fn insert_player(&self, record: PlayerRecord) {
        guard(&self.players).insert(record.id, record);
    }

    /// Registers a fresh player with no history, named after their id.
    pub fn register(&self, id: PlayerId) -> PlayerRecord {
        let record = PlayerRecord::new(id, id.to_string());
        self.insert_player(record.clone());
        record
    }

    pub fn lobby_count(&self) -> usize {
        guard(&self.lobbies).len()
    }
}

impl Repository for MemoryRepository {
    fn player(&self, id: PlayerId) -> Option<PlayerRecord> {
        guard(&self.players).get(&id).cloned()
    }

    fn record_played(&self, id: PlayerId, lobby_type: LobbyType) {
        let mut players = guard(&self.players);
        match players.get_mut(&id) {
            Some(record) => *record.played.entry(lobby_type).or_insert(0) += 1,
            None => tracing::warn!(player = %id, "record_played for unknown player"),
        }
    }

    fn save_lobby(&self, snapshot: &LobbySnapshot) {
        guard(&self.lobbies).insert(snapshot.id, snapshot.clone());
    }

    fn load_lobby(&self, id: LobbyId) -> Option<LobbySnapshot> {
        guard(&self.lobbies).get(&id).cloned()
    }

    fn find_lobbies(&self, filter: &dyn Fn(&LobbySnapshot) -> bool) -> Vec<LobbySnapshot> {
        guard(&self.lobbies)
            .values()
            .filter(|s| filter(s))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MemoryAllocator
// ---------------------------------------------------------------------------

/// A [`ServerAllocator`] that hands out sequential [`ServerRef`]s.
///
/// Refuses a host that is already allocated, and optionally caps how many
/// servers may be out at once. Released servers are remembered so tests
/// can assert on them.
#[derive(Debug)]
pub struct MemoryAllocator {
    next: AtomicU64,
    capacity: Option<usize>,
    allocated: Mutex<HashMap<ServerRef, ServerConfig>>,
    released: Mutex<Vec<ServerRef>>,
}

impl Default for MemoryAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
            capacity: None,
            allocated: Mutex::new(HashMap::new()),
            released: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An allocator that refuses once `capacity` servers are out.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// The configuration a server was allocated with.
    pub fn config(&self, server: ServerRef) -> Option<ServerConfig> {
        guard(&self.allocated).get(&server).cloned()
    }

    /// Servers released so far, in release order.
    pub fn released(&self) -> Vec<ServerRef> {
        guard(&self.released).clone()
    }

    pub fn in_use(&self) -> usize {
        guard(&self.allocated).len()
    }
}

impl ServerAllocator for MemoryAllocator {
    async fn allocate(&self, config: ServerConfig) -> Result<ServerRef, AllocationError> {
        let mut allocated = guard(&self.allocated);
        if allocated.values().any(|c| c.host == config.host) {
            return Err(AllocationError::Unavailable(format!(
                "host {} is already in use",
                config.host
            )));
        }
        if self.capacity.is_some_and(|cap| allocated.len() >= cap) {
            return Err(AllocationError::Unavailable("server pool exhausted".into()));
        }
        let server = ServerRef(self.next.fetch_add(1, Ordering::Relaxed));
        allocated.insert(server, config);
        Ok(server)
    }

    async fn release(&self, server: ServerRef) -> Result<(), AllocationError> {
        guard(&self.allocated)
            .remove(&server)
            .ok_or(AllocationError::UnknownServer(server))?;
        guard(&self.released).push(server);
        Ok(())
    }

    async fn allocated(&self) -> Vec<ServerRef> {
        guard(&self.allocated).keys().copied().collect()
    }
}
