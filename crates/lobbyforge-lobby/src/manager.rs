//! Lobby service: creates lobbies, routes players, drives the state
//! machine's side effects.
//!
//! [`LobbyService`] is the operation surface a transport layer calls. It
//! owns the lock table, the readiness timers, the player → lobby index and
//! the server reference table, and it talks to the three collaborators.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. lock the lobby (or two lobbies, in ascending id order),
//! 2. ask the [`Lobby`] aggregate to apply the change,
//! 3. act on the returned [`Transition`] while still holding the lock:
//!    schedule or cancel the readiness timer, run the finalizer,
//! 4. save the snapshot and notify.
//!
//! # The player index
//!
//! A player may hold a slot in at most one active lobby. The index maps
//! each seated player to that lobby. An entry `P → L` is only changed by
//! whoever holds `L`'s lock, or by a compare-and-swap from "no lobby" when
//! a player joins their first lobby. A join that finds the index changed
//! under it simply retries.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use lobbyforge_timer::{TimerRegistry, TimerToken};
use lobbyforge_types::{LobbyId, PlayerId, ServerRef, Team};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    Actor, CloseReason, Lobby, LobbyConfig, LobbyError, LobbyEvent, LobbyLocks, LobbySettings,
    LobbySnapshot, LobbyState, NotificationSink, PlayerRecord, Repository, Requirement,
    ServerAllocator, ServerConfig, Transition,
};

pub(crate) fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which flow is seating the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seat {
    Join,
    Fill,
}

pub(crate) struct Inner<A, R, N> {
    pub(crate) config: LobbyConfig,
    pub(crate) allocator: A,
    pub(crate) repository: R,
    pub(crate) sink: N,
    pub(crate) locks: LobbyLocks,
    pub(crate) timers: TimerRegistry<LobbyId>,
    /// Seated player → the active lobby they sit in.
    pub(crate) players: Mutex<HashMap<PlayerId, LobbyId>>,
    /// Server → active lobbies using it.
    pub(crate) servers: Mutex<HashMap<ServerRef, HashSet<LobbyId>>>,
    /// Creation holds it shared, the server sweep exclusively.
    pub(crate) creation_gate: RwLock<()>,
    next_id: AtomicU64,
}

/// The lobby matchmaking core.
///
/// Cheap to clone: clones share all state.
pub struct LobbyService<A, R, N> {
    pub(crate) inner: Arc<Inner<A, R, N>>,
}

impl<A, R, N> Clone for LobbyService<A, R, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R, N> LobbyService<A, R, N>
where
    A: ServerAllocator,
    R: Repository,
    N: NotificationSink,
{
    /// Creates a service. `config` is clamped with
    /// [`LobbyConfig::validated`].
    pub fn new(config: LobbyConfig, allocator: A, repository: R, sink: N) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: config.validated(),
                allocator,
                repository,
                sink,
                locks: LobbyLocks::new(),
                timers: TimerRegistry::new(),
                players: Mutex::new(HashMap::new()),
                servers: Mutex::new(HashMap::new()),
                creation_gate: RwLock::new(()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.inner.config
    }

    pub fn allocator(&self) -> &A {
        &self.inner.allocator
    }

    pub fn repository(&self) -> &R {
        &self.inner.repository
    }

    pub fn sink(&self) -> &N {
        &self.inner.sink
    }

    // =====================================================================
    // Creation
    // =====================================================================

    /// Allocates a server and opens a new lobby in Waiting.
    pub async fn create_lobby(
        &self,
        creator: PlayerId,
        settings: LobbySettings,
    ) -> Result<LobbySnapshot, LobbyError> {
        settings.validate()?;
        self.player_record(creator)?;

        let _gate = self.inner.creation_gate.read().await;
        let id = LobbyId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let server = self
            .inner
            .allocator
            .allocate(ServerConfig {
                lobby: id,
                host: settings.server_host.clone(),
                rcon_password: settings.rcon_password.clone(),
                server_password: generate_password(self.inner.config.server_password_len),
            })
            .await
            .map_err(|e| LobbyError::Allocation(e.to_string()))?;
        guard(&self.inner.servers)
            .entry(server)
            .or_default()
            .insert(id);

        let max_subs = self
            .inner
            .config
            .max_substitutes
            .unwrap_or_else(|| settings.lobby_type.max_substitutes());
        let lobby = Lobby::new(id, settings, creator, server, max_subs);
        let snapshot = lobby.snapshot();
        self.inner.repository.save_lobby(&snapshot);
        self.inner.locks.insert(lobby);

        info!(
            lobby_id = %id,
            creator = %creator,
            %server,
            lobby_type = %snapshot.lobby_type,
            map = %snapshot.map,
            "lobby created"
        );
        self.inner.sink.notify(LobbyEvent::LobbyListChanged);
        Ok(snapshot)
    }

    // =====================================================================
    // Roster
    // =====================================================================

    /// Seats `player` in slot `index` of `lobby_id`.
    ///
    /// Moving within the lobby vacates the old slot. If the player sits in
    /// another active lobby, that lobby lets them go once this one has
    /// accepted them: a plain leave while it is Waiting or ReadyingUp, a
    /// substitution while it is InProgress.
    pub async fn assign(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
        index: usize,
        password: Option<&str>,
    ) -> Result<LobbySnapshot, LobbyError> {
        self.seat(Seat::Join, lobby_id, player, index, password).await
    }

    /// [`assign`](Self::assign) addressed by team and class name.
    pub async fn join(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
        team: Team,
        class: &str,
        password: Option<&str>,
    ) -> Result<LobbySnapshot, LobbyError> {
        let lobby_type = self
            .inner
            .locks
            .try_peek(lobby_id, Lobby::lobby_type)
            .or_else(|| {
                self.inner
                    .repository
                    .load_lobby(lobby_id)
                    .map(|s| s.lobby_type)
            })
            .ok_or(LobbyError::LobbyNotFound(lobby_id))?;
        let index = lobby_type
            .slot_for(team, class)
            .map_err(|e| LobbyError::InvalidInput(e.to_string()))?;
        self.assign(lobby_id, player, index, password).await
    }

    /// Fills a slot left open by a substitution.
    pub async fn fill_substitute(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
        index: usize,
        password: Option<&str>,
    ) -> Result<LobbySnapshot, LobbyError> {
        self.seat(Seat::Fill, lobby_id, player, index, password).await
    }

    async fn seat(
        &self,
        mode: Seat,
        lobby_id: LobbyId,
        player: PlayerId,
        index: usize,
        password: Option<&str>,
    ) -> Result<LobbySnapshot, LobbyError> {
        let record = self.player_record(player)?;

        loop {
            let current = self.lobby_of(player);
            match current {
                Some(other) if other != lobby_id => {
                    let (mut target, mut previous) =
                        self.inner.locks.lock_pair(lobby_id, other).await?;
                    if self.lobby_of(player) != current {
                        continue;
                    }
                    // A rejected seat leaves both lobbies untouched.
                    let transition = apply_seat(mode, &mut target, index, &record, password)?;
                    let released = release_from(&mut previous, player);
                    guard(&self.inner.players).insert(player, lobby_id);

                    info!(
                        player_id = %player,
                        from = %other,
                        to = %lobby_id,
                        slot = index,
                        "player moved between lobbies"
                    );
                    self.inner.sink.notify(LobbyEvent::Removed {
                        lobby: other,
                        player,
                    });
                    self.commit(&mut previous, released).await;
                    return Ok(self.commit(&mut target, transition).await);
                }
                _ => {
                    let mut lobby = self.inner.locks.lock(lobby_id).await?;
                    if self.lobby_of(player) != current {
                        continue;
                    }
                    let claimed = current.is_none();
                    if claimed && !self.claim(player, lobby_id) {
                        continue;
                    }
                    let transition = apply_seat(mode, &mut lobby, index, &record, password)
                        .inspect_err(|_| {
                            if claimed {
                                self.release_player(player, lobby_id);
                            }
                        })?;
                    info!(lobby_id = %lobby_id, player_id = %player, slot = index, "player seated");
                    return Ok(self.commit(&mut lobby, transition).await);
                }
            }
        }
    }

    /// Removes `player` from their slot. Only before the match starts.
    pub async fn leave(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
    ) -> Result<LobbySnapshot, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        let transition = lobby.vacate(player)?;
        self.release_player(player, lobby_id);
        info!(lobby_id = %lobby_id, player_id = %player, "player left");
        Ok(self.commit(&mut lobby, transition).await)
    }

    /// Substitutes `player` out of `lobby_id`, keeping their seat open.
    pub async fn substitute(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
    ) -> Result<LobbySnapshot, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        let transition = lobby.substitute(player)?;
        self.release_player(player, lobby_id);
        info!(
            lobby_id = %lobby_id,
            player_id = %player,
            substitutions = lobby.substitutions(),
            "player substituted out"
        );
        Ok(self.commit(&mut lobby, transition).await)
    }

    /// Removes `target` from a slot or the spectators, optionally banning
    /// them from the lobby.
    ///
    /// Kicking yourself is a leave. Kicking anyone else needs the creator
    /// or a privileged role.
    pub async fn kick(
        &self,
        actor: Actor,
        lobby_id: LobbyId,
        target: PlayerId,
        ban: bool,
    ) -> Result<LobbySnapshot, LobbyError> {
        let self_kick = actor.id == target;
        if self_kick && ban {
            return Err(LobbyError::InvalidInput("cannot ban yourself".into()));
        }

        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        if !self_kick {
            lobby.authorize(&actor, "kick players")?;
        }
        let kicked = lobby.kick(target, ban)?;
        if kicked.was_seated {
            self.release_player(target, lobby_id);
        }
        if !self_kick {
            info!(lobby_id = %lobby_id, by = %actor.id, player_id = %target, ban, "player kicked");
            self.inner.sink.notify(LobbyEvent::Removed {
                lobby: lobby_id,
                player: target,
            });
        }
        Ok(self.commit(&mut lobby, kicked.transition).await)
    }

    /// Adds `player` as a spectator. Returns `false` if they already were.
    pub async fn add_spectator(&self, lobby_id: LobbyId, player: PlayerId) -> Result<bool, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        let added = lobby.add_spectator(player)?;
        if added {
            self.commit(&mut lobby, Transition::Unchanged).await;
        }
        Ok(added)
    }

    /// Removes `player` from the spectators. A non-member is a no-op.
    pub async fn remove_spectator(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
    ) -> Result<bool, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        let removed = lobby.remove_spectator(player);
        if removed {
            self.commit(&mut lobby, Transition::Unchanged).await;
        }
        Ok(removed)
    }

    // =====================================================================
    // Readiness
    // =====================================================================

    /// Marks `player` ready. The last one starts the match.
    pub async fn ready(&self, lobby_id: LobbyId, player: PlayerId) -> Result<LobbySnapshot, LobbyError> {
        self.set_ready(lobby_id, player, true).await
    }

    /// Clears `player`'s ready flag. They keep their slot.
    pub async fn unready(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
    ) -> Result<LobbySnapshot, LobbyError> {
        self.set_ready(lobby_id, player, false).await
    }

    async fn set_ready(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
        ready: bool,
    ) -> Result<LobbySnapshot, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        let transition = lobby.set_ready(player, ready)?;
        debug!(lobby_id = %lobby_id, player_id = %player, ready, "ready flag changed");
        Ok(self.commit(&mut lobby, transition).await)
    }

    /// Time left on `lobby_id`'s readiness window, if one is running.
    pub fn readiness_remaining(&self, lobby_id: LobbyId) -> Option<Duration> {
        self.inner.timers.remaining(&lobby_id)
    }

    fn start_ready_timer(&self, lobby: &mut Lobby) {
        let id = lobby.id();
        let timeout = self.inner.config.ready_timeout;
        let weak: Weak<Inner<A, R, N>> = Arc::downgrade(&self.inner);
        let token = self.inner.timers.schedule(id, timeout, move |token| async move {
            if let Some(inner) = weak.upgrade() {
                LobbyService { inner }.expire_readiness(id, token).await;
            }
        });
        lobby.ready_timer = Some(token);
        info!(lobby_id = %id, %token, timeout_secs = timeout.as_secs(), "readying up");
        self.inner.sink.notify(LobbyEvent::ReadyUp {
            lobby: id,
            timeout_secs: timeout.as_secs(),
        });
    }

    pub(crate) fn cancel_ready_timer(&self, lobby: &mut Lobby) {
        if let Some(token) = lobby.ready_timer.take() {
            let cancelled = self.inner.timers.cancel_token(&lobby.id(), token);
            debug!(lobby_id = %lobby.id(), %token, cancelled, "readiness timer stopped");
        }
    }

    /// The readiness timer's fire path.
    async fn expire_readiness(&self, lobby_id: LobbyId, token: TimerToken) {
        let Ok(mut lobby) = self.inner.locks.lock(lobby_id).await else {
            return;
        };
        let Some(evicted) = lobby.expire_readiness(token) else {
            debug!(lobby_id = %lobby_id, %token, "stale readiness timeout ignored");
            return;
        };

        info!(
            lobby_id = %lobby_id,
            evicted = evicted.len(),
            "readiness timed out, reverting to waiting"
        );
        for player in evicted {
            self.release_player(player, lobby_id);
            self.inner.sink.notify(LobbyEvent::Removed {
                lobby: lobby_id,
                player,
            });
        }
        self.publish(&lobby, true);
    }

    // =====================================================================
    // Match
    // =====================================================================

    /// Forces the match to start without waiting for everyone to ready.
    pub async fn start(&self, actor: Actor, lobby_id: LobbyId) -> Result<LobbySnapshot, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        lobby.authorize(&actor, "start the lobby")?;
        let transition = lobby.start()?;
        info!(lobby_id = %lobby_id, by = %actor.id, "lobby started by moderator");
        Ok(self.commit(&mut lobby, transition).await)
    }

    /// Records whether `player` has connected to the game server.
    pub async fn set_in_game(
        &self,
        lobby_id: LobbyId,
        player: PlayerId,
        in_game: bool,
    ) -> Result<LobbySnapshot, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        lobby.set_in_game(player, in_game)?;
        Ok(self.commit(&mut lobby, Transition::Unchanged).await)
    }

    /// Ends the lobby. `aborted` skips the played-lobby stats.
    pub async fn close(
        &self,
        actor: Actor,
        lobby_id: LobbyId,
        aborted: bool,
    ) -> Result<LobbySnapshot, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        lobby.authorize(&actor, "close the lobby")?;
        let reason = if aborted {
            CloseReason::Aborted
        } else {
            CloseReason::Normal
        };
        let transition = lobby.close(reason)?;
        Ok(self.commit(&mut lobby, transition).await)
    }

    pub async fn set_requirement(
        &self,
        actor: Actor,
        lobby_id: LobbyId,
        index: usize,
        requirement: Requirement,
    ) -> Result<LobbySnapshot, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        lobby.authorize(&actor, "change slot requirements")?;
        lobby.set_requirement(index, requirement)?;
        Ok(self.commit(&mut lobby, Transition::Unchanged).await)
    }

    pub async fn clear_requirement(
        &self,
        actor: Actor,
        lobby_id: LobbyId,
        index: usize,
    ) -> Result<Option<Requirement>, LobbyError> {
        let mut lobby = self.inner.locks.lock(lobby_id).await?;
        lobby.authorize(&actor, "change slot requirements")?;
        let cleared = lobby.clear_requirement(index)?;
        self.commit(&mut lobby, Transition::Unchanged).await;
        Ok(cleared)
    }

    // =====================================================================
    // Queries
    // =====================================================================

    /// The last committed snapshot of `lobby_id`. Doesn't take the lock.
    pub fn snapshot(&self, lobby_id: LobbyId) -> Result<LobbySnapshot, LobbyError> {
        self.inner
            .repository
            .load_lobby(lobby_id)
            .or_else(|| self.inner.locks.try_peek(lobby_id, Lobby::snapshot))
            .ok_or(LobbyError::LobbyNotFound(lobby_id))
    }

    /// Lobbies in `state`, newest first.
    pub fn list_lobbies(&self, state: LobbyState) -> Vec<LobbySnapshot> {
        let mut lobbies = self.inner.repository.find_lobbies(&|s| s.state == state);
        lobbies.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        lobbies
    }

    /// The active lobby `player` is seated in, if any.
    pub fn lobby_of(&self, player: PlayerId) -> Option<LobbyId> {
        guard(&self.inner.players).get(&player).copied()
    }

    pub fn lobby_count(&self) -> usize {
        self.inner.locks.len()
    }

    // =====================================================================
    // Internals
    // =====================================================================

    fn player_record(&self, player: PlayerId) -> Result<PlayerRecord, LobbyError> {
        self.inner
            .repository
            .player(player)
            .ok_or(LobbyError::PlayerNotFound(player))
    }

    /// Claims an index entry for a player not seated anywhere.
    fn claim(&self, player: PlayerId, lobby_id: LobbyId) -> bool {
        let mut players = guard(&self.inner.players);
        if players.contains_key(&player) {
            return false;
        }
        players.insert(player, lobby_id);
        true
    }

    /// Drops `player`'s index entry if it still points at `lobby_id`.
    pub(crate) fn release_player(&self, player: PlayerId, lobby_id: LobbyId) {
        let mut players = guard(&self.inner.players);
        if players.get(&player) == Some(&lobby_id) {
            players.remove(&player);
        }
    }

    /// Runs a transition's side effects, then saves and broadcasts.
    async fn commit(&self, lobby: &mut Lobby, transition: Transition) -> LobbySnapshot {
        match transition {
            Transition::Unchanged => {}
            Transition::ReadyUp => self.start_ready_timer(lobby),
            Transition::Reverted => {
                self.cancel_ready_timer(lobby);
                info!(lobby_id = %lobby.id(), "readying up cancelled, back to waiting");
            }
            Transition::Started => {
                self.cancel_ready_timer(lobby);
                info!(lobby_id = %lobby.id(), "lobby in progress");
                self.inner
                    .sink
                    .notify(LobbyEvent::LobbyStarted { lobby: lobby.id() });
            }
            Transition::Ended(reason) => self.finalize(lobby, reason).await,
        }
        self.publish(lobby, transition != Transition::Unchanged)
    }

    fn publish(&self, lobby: &Lobby, list_changed: bool) -> LobbySnapshot {
        let snapshot = lobby.snapshot();
        self.inner.repository.save_lobby(&snapshot);
        self.inner.sink.notify(LobbyEvent::LobbyUpdated {
            snapshot: snapshot.clone(),
        });
        if list_changed {
            self.inner.sink.notify(LobbyEvent::LobbyListChanged);
        }
        snapshot
    }
}

/// Takes `player` out of a lobby they're leaving for another one.
fn release_from(previous: &mut Lobby, player: PlayerId) -> Transition {
    if previous.roster().slot_of(player).is_none() {
        return Transition::Unchanged;
    }
    let released = match previous.state() {
        LobbyState::Waiting | LobbyState::ReadyingUp => previous.vacate(player),
        LobbyState::InProgress => previous.substitute(player),
        LobbyState::Ended => Ok(Transition::Unchanged),
    };
    released.unwrap_or_else(|e| {
        warn!(lobby_id = %previous.id(), player_id = %player, error = %e, "could not release player");
        Transition::Unchanged
    })
}

fn apply_seat(
    mode: Seat,
    lobby: &mut Lobby,
    index: usize,
    record: &PlayerRecord,
    password: Option<&str>,
) -> Result<Transition, LobbyError> {
    match mode {
        Seat::Join => lobby.assign(index, record, password),
        Seat::Fill => lobby.fill_substitute(index, record, password),
    }
}

/// Random lowercase hex, used as the game server's join password.
fn generate_password(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from_digit(rng.random_range(0..16u32), 16).unwrap_or('0'))
        .collect()
}
