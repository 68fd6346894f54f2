//! Keyed, cancelable delayed tasks for Lobbyforge.
//!
//! A [`TimerRegistry`] holds at most one pending timer per key. Scheduling
//! a timer for a key that already has one cancels the old timer first, so
//! there is never more than one live instance per key.
//!
//! Every scheduled timer gets a fresh [`TimerToken`]. The token is handed
//! to the fire callback, and callers are expected to store it next to the
//! state the timer guards. When the callback runs it compares its token
//! with the stored one under the caller's own lock; a mismatch means the
//! timer was cancelled (or replaced) after it had already woken up, and the
//! callback must do nothing.
//!
//! # Integration
//!
//! ```ignore
//! let token = timers.schedule(lobby_id, Duration::from_secs(30), move |token| async move {
//!     let mut lobby = locks.lock(lobby_id).await?;
//!     if lobby.ready_timer == Some(token) {
//!         // revert the lobby
//!     }
//! });
//! lobby.ready_timer = Some(token);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// TimerToken
// ---------------------------------------------------------------------------

/// Identifies one scheduled timer instance.
///
/// Tokens are unique per registry and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Pending {
    token: TimerToken,
    deadline: Instant,
    handle: JoinHandle<()>,
}

struct Shared<K> {
    pending: Mutex<HashMap<K, Pending>>,
    next_token: AtomicU64,
}

impl<K> Shared<K> {
    fn table(&self) -> MutexGuard<'_, HashMap<K, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A table of pending timers, one per key.
///
/// Cheap to clone: clones share the same table.
pub struct TimerRegistry<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for TimerRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> TimerRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Schedules `on_fire` to run once `delay` has elapsed.
    ///
    /// Any timer already pending for `key` is cancelled first. The entry is
    /// removed from the table just before `on_fire` runs, so
    /// [`pending`](Self::pending) reports `None` from then on.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, on_fire: F) -> TimerToken
    where
        F: FnOnce(TimerToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = TimerToken(self.shared.next_token.fetch_add(1, Ordering::Relaxed));
        let deadline = Instant::now() + delay;

        // Hold the table while spawning so the task can't look itself up
        // before its entry exists.
        let mut table = self.shared.table();
        if let Some(old) = table.remove(&key) {
            old.handle.abort();
            debug!(?key, old = %old.token, new = %token, "replacing pending timer");
        }

        let shared = Arc::clone(&self.shared);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            {
                let mut table = shared.table();
                match table.get(&task_key) {
                    Some(p) if p.token == token => {
                        table.remove(&task_key);
                    }
                    _ => {
                        trace!(key = ?task_key, %token, "timer superseded before firing");
                        return;
                    }
                }
            }
            trace!(key = ?task_key, %token, "timer fired");
            on_fire(token).await;
        });

        table.insert(
            key.clone(),
            Pending {
                token,
                deadline,
                handle,
            },
        );
        debug!(?key, %token, delay_ms = delay.as_millis() as u64, "timer scheduled");
        token
    }

    /// Cancels whatever timer is pending for `key`.
    ///
    /// Returns the cancelled token, or `None` if nothing was pending (never
    /// scheduled, already fired, or already cancelled).
    pub fn cancel(&self, key: &K) -> Option<TimerToken> {
        let pending = self.shared.table().remove(key)?;
        pending.handle.abort();
        debug!(?key, token = %pending.token, "timer cancelled");
        Some(pending.token)
    }

    /// Cancels the timer for `key` only if it is the given instance.
    ///
    /// Returns `true` if that instance was still pending.
    pub fn cancel_token(&self, key: &K, token: TimerToken) -> bool {
        let mut table = self.shared.table();
        match table.get(key) {
            Some(p) if p.token == token => {
                if let Some(p) = table.remove(key) {
                    p.handle.abort();
                }
                debug!(?key, %token, "timer cancelled");
                true
            }
            _ => false,
        }
    }

    /// Returns the token of the timer pending for `key`, if any.
    pub fn pending(&self, key: &K) -> Option<TimerToken> {
        self.shared.table().get(key).map(|p| p.token)
    }

    /// Time left until the pending timer for `key` fires.
    pub fn remaining(&self, key: &K) -> Option<Duration> {
        self.shared
            .table()
            .get(key)
            .map(|p| p.deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancels every pending timer, returning how many were dropped.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Pending> = self.shared.table().drain().map(|(_, p)| p).collect();
        for p in &drained {
            p.handle.abort();
        }
        drained.len()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.shared.table().len()
    }

    /// Returns `true` if no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.shared.table().is_empty()
    }
}

impl<K> Default for TimerRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
