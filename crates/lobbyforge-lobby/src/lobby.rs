//! The lobby aggregate and its state machine.
//!
//! [`Lobby`] is plain data plus synchronous transition rules. It never
//! touches locks, timers, storage or the network. Every mutating method
//! either rejects the request (leaving the lobby untouched) or applies it
//! and returns a [`Transition`] telling the caller which side effects are
//! now due: start the readiness timer, cancel it, announce the match, or
//! run the finalizer.
//!
//! The service layer calls these methods while holding the lobby's lock,
//! so from the aggregate's point of view every call is serialized.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use lobbyforge_timer::TimerToken;
use lobbyforge_types::{League, LobbyId, LobbyType, PlayerId, Role, ServerRef};
use serde::{Deserialize, Serialize};

use crate::{
    LobbyError, LobbySnapshot, LobbyState, PlayerRecord, Requirement, Roster, SlotSnapshot,
};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Who is asking for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: PlayerId,
    pub role: Role,
}

impl Actor {
    pub fn player(id: PlayerId) -> Self {
        Self {
            id,
            role: Role::Player,
        }
    }

    pub fn admin(id: PlayerId) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }
}

/// Everything needed to create a lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySettings {
    pub lobby_type: LobbyType,
    pub map: String,
    pub league: League,
    pub whitelist: u32,
    pub mumble_required: bool,
    /// Optional password required to take a slot.
    pub password: Option<String>,
    /// Game server address handed to the allocator.
    pub server_host: String,
    pub rcon_password: String,
}

impl LobbySettings {
    /// Settings with sensible defaults for the given type and map.
    pub fn new(lobby_type: LobbyType, map: impl Into<String>) -> Self {
        Self {
            lobby_type,
            map: map.into(),
            league: League::Etf2l,
            whitelist: 0,
            mumble_required: false,
            password: None,
            server_host: "127.0.0.1:27015".to_string(),
            rcon_password: String::new(),
        }
    }

    /// Rejects malformed settings before anything is allocated.
    pub fn validate(&self) -> Result<(), LobbyError> {
        if self.map.trim().is_empty() {
            return Err(LobbyError::InvalidInput("map name is empty".into()));
        }
        if self.server_host.trim().is_empty() {
            return Err(LobbyError::InvalidInput("server host is empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Why a lobby ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Closed normally; participants are credited with a played lobby.
    Normal,
    /// Torn down without a result (empty or never started).
    Aborted,
    /// Forced closed after reaching the substitution cap.
    TooManySubs,
}

impl CloseReason {
    /// Whether participants' played-lobby counters should be bumped.
    pub fn applies_stats(self) -> bool {
        matches!(self, Self::Normal)
    }

    /// The system chat line announcing the closure.
    pub fn message(self) -> &'static str {
        match self {
            Self::Normal => "Lobby closed.",
            Self::Aborted => "Lobby closed (aborted).",
            Self::TooManySubs => "Lobby closed (Too many subs).",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The side effect a successful mutation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State unchanged.
    Unchanged,
    /// Waiting → ReadyingUp: start the readiness timer.
    ReadyUp,
    /// ReadyingUp → Waiting: cancel the readiness timer.
    Reverted,
    /// → InProgress: cancel the readiness timer, announce the start.
    Started,
    /// → Ended: run the finalizer.
    Ended(CloseReason),
}

/// Result of a [`Lobby::kick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kicked {
    /// `true` if the target held a slot, `false` if they were spectating.
    pub was_seated: bool,
    pub transition: Transition,
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// The aggregate root: one lobby's full state.
#[derive(Debug, Clone)]
pub struct Lobby {
    id: LobbyId,
    settings: LobbySettings,
    creator: PlayerId,
    server: ServerRef,
    state: LobbyState,
    roster: Roster,
    substitutions: u32,
    max_substitutes: u32,
    /// Everyone ever seated here; credited on a normal close.
    participants: BTreeSet<PlayerId>,
    /// Who was substituted out of each slot still awaiting a replacement.
    subbed_out: HashMap<usize, PlayerId>,
    /// The live readiness timer, if the lobby is readying up.
    pub(crate) ready_timer: Option<TimerToken>,
    close_reason: Option<CloseReason>,
    created_at: u64,
}

impl Lobby {
    /// Creates an empty lobby in [`LobbyState::Waiting`].
    pub fn new(
        id: LobbyId,
        settings: LobbySettings,
        creator: PlayerId,
        server: ServerRef,
        max_substitutes: u32,
    ) -> Self {
        let roster = Roster::new(settings.lobby_type, settings.password.clone());
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            id,
            settings,
            creator,
            server,
            state: LobbyState::Waiting,
            roster,
            substitutions: 0,
            max_substitutes,
            participants: BTreeSet::new(),
            subbed_out: HashMap::new(),
            ready_timer: None,
            close_reason: None,
            created_at,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn lobby_type(&self) -> LobbyType {
        self.settings.lobby_type
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub fn creator(&self) -> PlayerId {
        self.creator
    }

    pub fn server(&self) -> ServerRef {
        self.server
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn substitutions(&self) -> u32 {
        self.substitutions
    }

    pub fn max_substitutes(&self) -> u32 {
        self.max_substitutes
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Players whose played-lobby counter a normal close bumps.
    pub fn participants(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.participants.iter().copied()
    }

    pub fn ready_timer(&self) -> Option<TimerToken> {
        self.ready_timer
    }

    /// Fails unless `actor` created the lobby or holds a privileged role.
    pub fn authorize(&self, actor: &Actor, action: &str) -> Result<(), LobbyError> {
        if actor.id == self.creator || actor.role.is_privileged() {
            Ok(())
        } else {
            Err(LobbyError::NotAuthorized(format!(
                "only the lobby creator or a moderator can {action}"
            )))
        }
    }

    // -- Roster operations --------------------------------------------------

    /// Runs every check [`assign`](Self::assign) would, without mutating.
    pub fn check_assign(
        &self,
        index: usize,
        player: &PlayerRecord,
        password: Option<&str>,
    ) -> Result<(), LobbyError> {
        if !self.state.is_active() {
            return Err(self.conflict("join"));
        }
        if index >= self.roster.len() {
            return Err(LobbyError::SlotOutOfRange {
                slot: index,
                slots: self.roster.len(),
            });
        }
        if self.state.has_started() {
            if !self.roster.needs_sub(index) {
                return Err(self.conflict("join without substituting"));
            }
            if self.roster.slot_of(player.id).is_some() {
                return Err(LobbyError::AlreadyInSlot(player.id));
            }
            if self.subbed_out.get(&index) == Some(&player.id) {
                return Err(LobbyError::InvalidInput(
                    "a player cannot substitute for themselves".into(),
                ));
            }
        }
        self.roster.check_assign(index, player, password)
    }

    /// Seats `player` in slot `index`.
    ///
    /// Filling the last open slot while Waiting moves the lobby to
    /// ReadyingUp. While InProgress only slots awaiting a substitute can be
    /// filled.
    pub fn assign(
        &mut self,
        index: usize,
        player: &PlayerRecord,
        password: Option<&str>,
    ) -> Result<Transition, LobbyError> {
        self.check_assign(index, player, password)?;
        self.roster.assign(index, player, password)?;
        self.subbed_out.remove(&index);
        self.participants.insert(player.id);

        if self.state == LobbyState::Waiting && self.roster.is_full() {
            self.enter(LobbyState::ReadyingUp);
            return Ok(Transition::ReadyUp);
        }
        Ok(Transition::Unchanged)
    }

    /// Fills a slot left open by a substitution.
    pub fn fill_substitute(
        &mut self,
        index: usize,
        player: &PlayerRecord,
        password: Option<&str>,
    ) -> Result<Transition, LobbyError> {
        if !self.state.is_active() {
            return Err(self.conflict("fill a substitute slot"));
        }
        if index >= self.roster.len() {
            return Err(LobbyError::SlotOutOfRange {
                slot: index,
                slots: self.roster.len(),
            });
        }
        if !self.roster.needs_sub(index) {
            return Err(LobbyError::InvalidInput(format!(
                "slot {index} does not need a substitute"
            )));
        }
        if self.subbed_out.get(&index) == Some(&player.id) {
            return Err(LobbyError::InvalidInput(
                "a player cannot substitute for themselves".into(),
            ));
        }
        self.assign(index, player, password)
    }

    /// Removes `player` from their slot.
    ///
    /// Leaving while ReadyingUp breaks fullness and reverts to Waiting.
    pub fn vacate(&mut self, player: PlayerId) -> Result<Transition, LobbyError> {
        if !matches!(self.state, LobbyState::Waiting | LobbyState::ReadyingUp) {
            return Err(self.conflict("leave"));
        }
        self.roster.vacate(player)?;

        if self.state == LobbyState::ReadyingUp {
            self.revert();
            return Ok(Transition::Reverted);
        }
        Ok(Transition::Unchanged)
    }

    /// Removes `target` from a slot or the spectator set, optionally
    /// banning them. Authorization is the caller's concern.
    pub fn kick(&mut self, target: PlayerId, ban: bool) -> Result<Kicked, LobbyError> {
        if !matches!(self.state, LobbyState::Waiting | LobbyState::ReadyingUp) {
            return Err(self.conflict("kick"));
        }
        let kicked = if self.roster.slot_of(target).is_some() {
            Kicked {
                was_seated: true,
                transition: self.vacate(target)?,
            }
        } else if self.roster.remove_spectator(target) {
            Kicked {
                was_seated: false,
                transition: Transition::Unchanged,
            }
        } else {
            return Err(LobbyError::PlayerNotInLobby(target));
        };
        if ban {
            self.roster.ban(target);
        }
        Ok(kicked)
    }

    /// Substitutes `player` out, keeping the seat open for a replacement.
    ///
    /// The lobby stays in its current state with the slot flagged
    /// needs-substitute. Reaching the substitution cap ends the lobby
    /// whatever the roster looks like.
    pub fn substitute(&mut self, player: PlayerId) -> Result<Transition, LobbyError> {
        if !matches!(
            self.state,
            LobbyState::ReadyingUp | LobbyState::InProgress
        ) {
            return Err(self.conflict("substitute"));
        }
        let index = self.roster.mark_needs_sub(player)?;
        self.subbed_out.insert(index, player);
        self.substitutions += 1;

        if self.substitutions >= self.max_substitutes {
            return Ok(self.end(CloseReason::TooManySubs));
        }
        Ok(Transition::Unchanged)
    }

    pub fn add_spectator(&mut self, player: PlayerId) -> Result<bool, LobbyError> {
        if !self.state.is_active() {
            return Err(self.conflict("spectate"));
        }
        self.roster.add_spectator(player)
    }

    pub fn remove_spectator(&mut self, player: PlayerId) -> bool {
        self.roster.remove_spectator(player)
    }

    pub fn set_requirement(&mut self, index: usize, req: Requirement) -> Result<(), LobbyError> {
        if self.state != LobbyState::Waiting {
            return Err(self.conflict("change slot requirements"));
        }
        self.roster.set_requirement(index, req)
    }

    pub fn clear_requirement(&mut self, index: usize) -> Result<Option<Requirement>, LobbyError> {
        if self.state != LobbyState::Waiting {
            return Err(self.conflict("change slot requirements"));
        }
        Ok(self.roster.clear_requirement(index))
    }

    // -- Readiness ----------------------------------------------------------

    /// Sets `player`'s ready flag. Only valid while ReadyingUp.
    ///
    /// The last occupant readying up starts the match.
    pub fn set_ready(&mut self, player: PlayerId, ready: bool) -> Result<Transition, LobbyError> {
        if self.state != LobbyState::ReadyingUp {
            return Err(self.conflict(if ready { "ready" } else { "unready" }));
        }
        self.roster.set_ready(player, ready)?;
        if ready && self.roster.all_ready() {
            self.enter(LobbyState::InProgress);
            return Ok(Transition::Started);
        }
        Ok(Transition::Unchanged)
    }

    /// Applies an elapsed readiness timeout.
    ///
    /// Only acts if `token` is still the lobby's live timer: a timer that
    /// lost the race against a cancellation returns `None` and changes
    /// nothing. Otherwise never-ready occupants are moved to spectators,
    /// the rest are unreadied, and the lobby reverts to Waiting.
    pub fn expire_readiness(&mut self, token: TimerToken) -> Option<Vec<PlayerId>> {
        if self.ready_timer != Some(token) || self.state != LobbyState::ReadyingUp {
            return None;
        }
        self.ready_timer = None;
        let evicted = self.roster.evict_unready();
        self.revert();
        Some(evicted)
    }

    pub fn set_in_game(&mut self, player: PlayerId, in_game: bool) -> Result<(), LobbyError> {
        if self.state != LobbyState::InProgress {
            return Err(self.conflict("change in-game status"));
        }
        self.roster.set_in_game(player, in_game).map(|_| ())
    }

    // -- Administrative -----------------------------------------------------

    /// Forces the match to start from Waiting or ReadyingUp.
    pub fn start(&mut self) -> Result<Transition, LobbyError> {
        if !matches!(self.state, LobbyState::Waiting | LobbyState::ReadyingUp) {
            return Err(self.conflict("start"));
        }
        self.enter(LobbyState::InProgress);
        Ok(Transition::Started)
    }

    /// Ends the lobby. Fails if it already ended.
    pub fn close(&mut self, reason: CloseReason) -> Result<Transition, LobbyError> {
        if !self.state.is_active() {
            return Err(self.conflict("close"));
        }
        Ok(self.end(reason))
    }

    // -- Projection ---------------------------------------------------------

    /// A read-only copy of the lobby for broadcast and persistence.
    pub fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            id: self.id,
            lobby_type: self.settings.lobby_type,
            map: self.settings.map.clone(),
            league: self.settings.league,
            whitelist: self.settings.whitelist,
            mumble_required: self.settings.mumble_required,
            password_protected: self.roster.is_password_protected(),
            creator: self.creator,
            server: self.server,
            state: self.state,
            players: self.roster.occupied_count(),
            max_players: self.roster.len(),
            substitutions: self.substitutions,
            slots: self
                .roster
                .slots()
                .iter()
                .map(|s| SlotSnapshot {
                    index: s.index,
                    team: s.label.team,
                    class: s.label.class.to_string(),
                    player: s.occupant,
                    ready: s.ready,
                    in_game: s.in_game,
                    needs_sub: s.needs_sub,
                })
                .collect(),
            spectators: self.roster.spectators().collect(),
            created_at: self.created_at,
            close_reason: self.close_reason,
        }
    }

    // -- Internals ----------------------------------------------------------

    fn enter(&mut self, next: LobbyState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal lobby transition {} -> {next}",
            self.state
        );
        self.state = next;
    }

    fn revert(&mut self) {
        self.enter(LobbyState::Waiting);
        self.roster.unready_all();
    }

    fn end(&mut self, reason: CloseReason) -> Transition {
        self.enter(LobbyState::Ended);
        self.close_reason = Some(reason);
        Transition::Ended(reason)
    }

    fn conflict(&self, operation: &'static str) -> LobbyError {
        LobbyError::InvalidState {
            operation,
            state: self.state,
        }
    }
}
