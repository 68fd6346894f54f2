//! Per-lobby mutual exclusion.
//!
//! Each lobby lives behind its own `tokio::sync::Mutex`. The mutex is both
//! the lock and the data: holding the guard is the only way to read or
//! change a lobby, so "mutate under the lock" holds by construction.
//!
//! The table of mutexes sits behind a short-lived `std::sync::RwLock` that
//! is only held to clone an `Arc` out, never across an `.await`.
//! Operations on different lobbies therefore never block each other.
//!
//! # Lock ordering
//!
//! An operation that needs two lobbies at once (moving a player from one
//! lobby to another) must go through [`LobbyLocks::lock_pair`], which
//! always acquires the lower [`LobbyId`] first. Two concurrent cross-lobby
//! moves in opposite directions then queue up instead of deadlocking.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use lobbyforge_types::LobbyId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Lobby, LobbyError};

/// Exclusive access to one lobby. Dropping it releases the lock.
pub type LobbyGuard = OwnedMutexGuard<Lobby>;

/// The keyed-mutex table.
#[derive(Default)]
pub struct LobbyLocks {
    table: RwLock<HashMap<LobbyId, Arc<Mutex<Lobby>>>>,
}

impl LobbyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new lobby. Replaces nothing: ids are never reused.
    pub fn insert(&self, lobby: Lobby) {
        let id = lobby.id();
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.entry(id).or_insert_with(|| Arc::new(Mutex::new(lobby)));
    }

    fn entry(&self, id: LobbyId) -> Result<Arc<Mutex<Lobby>>, LobbyError> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(LobbyError::LobbyNotFound(id))
    }

    /// Acquires `id`'s lock, waiting for any operation already holding it.
    pub async fn lock(&self, id: LobbyId) -> Result<LobbyGuard, LobbyError> {
        Ok(self.entry(id)?.lock_owned().await)
    }

    /// Acquires two distinct lobbies' locks in ascending id order.
    ///
    /// Guards are returned in argument order, `(a, b)`.
    pub async fn lock_pair(
        &self,
        a: LobbyId,
        b: LobbyId,
    ) -> Result<(LobbyGuard, LobbyGuard), LobbyError> {
        if a == b {
            return Err(LobbyError::InvalidInput(format!(
                "cannot lock lobby {a} twice"
            )));
        }
        let (first, second) = (self.entry(a.min(b))?, self.entry(a.max(b))?);
        let first = first.lock_owned().await;
        let second = second.lock_owned().await;
        Ok(if a < b { (first, second) } else { (second, first) })
    }

    /// A lock-free read of the lobby if no one holds it right now.
    pub fn try_peek<T>(&self, id: LobbyId, f: impl FnOnce(&Lobby) -> T) -> Option<T> {
        let entry = self.entry(id).ok()?;
        let guard = entry.try_lock().ok()?;
        Some(f(&guard))
    }

    /// Every registered lobby id, ascending.
    pub fn ids(&self) -> Vec<LobbyId> {
        let mut ids: Vec<_> = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lobbyforge_types::{LobbyType, PlayerId, ServerRef};

    use super::*;
    use crate::LobbySettings;

    fn lobby(id: u64) -> Lobby {
        Lobby::new(
            LobbyId(id),
            LobbySettings::new(LobbyType::Debug, "cp_process_final"),
            PlayerId(1),
            ServerRef(id),
            2,
        )
    }

    #[tokio::test]
    async fn test_lock_unknown_lobby_is_not_found() {
        let locks = LobbyLocks::new();
        assert!(matches!(
            locks.lock(LobbyId(9)).await,
            Err(LobbyError::LobbyNotFound(LobbyId(9)))
        ));
    }

    #[tokio::test]
    async fn test_lock_pair_returns_argument_order() {
        let locks = LobbyLocks::new();
        locks.insert(lobby(1));
        locks.insert(lobby(2));

        let (b, a) = locks.lock_pair(LobbyId(2), LobbyId(1)).await.unwrap();
        assert_eq!(b.id(), LobbyId(2));
        assert_eq!(a.id(), LobbyId(1));
    }

    #[tokio::test]
    async fn test_lock_pair_same_id_is_rejected() {
        let locks = LobbyLocks::new();
        locks.insert(lobby(1));
        assert!(matches!(
            locks.lock_pair(LobbyId(1), LobbyId(1)).await,
            Err(LobbyError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_opposite_pairs_do_not_deadlock() {
        let locks = Arc::new(LobbyLocks::new());
        locks.insert(lobby(1));
        locks.insert(lobby(2));

        let mut tasks = Vec::new();
        for flip in [false, true] {
            let locks = Arc::clone(&locks);
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (a, b) = if flip {
                        (LobbyId(2), LobbyId(1))
                    } else {
                        (LobbyId(1), LobbyId(2))
                    };
                    let _guards = locks.lock_pair(a, b).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_lock_excludes_try_peek() {
        let locks = LobbyLocks::new();
        locks.insert(lobby(1));

        let guard = locks.lock(LobbyId(1)).await.unwrap();
        assert_eq!(locks.try_peek(LobbyId(1), |l| l.id()), None);
        drop(guard);
        assert_eq!(locks.try_peek(LobbyId(1), |l| l.id()), Some(LobbyId(1)));
    }

    #[test]
    fn test_ids_sorted() {
        let locks = LobbyLocks::new();
        locks.insert(lobby(3));
        locks.insert(lobby(1));
        assert_eq!(locks.ids(), vec![LobbyId(1), LobbyId(3)]);
        assert_eq!(locks.len(), 2);
    }
}
