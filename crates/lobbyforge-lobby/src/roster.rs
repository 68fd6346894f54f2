//! The roster: a lobby's ordered slots, its spectators and its ban list.
//!
//! The roster enforces the seat-level invariants on its own:
//!
//! - a slot holds at most one player, and a player holds at most one slot;
//! - a banned player can never be seated again;
//! - a slot's ready and in-game flags are cleared whenever it empties;
//! - seating a spectator removes them from the spectator set.
//!
//! It knows nothing about lobby state; [`Lobby`](crate::Lobby) decides
//! *when* a roster operation is allowed.

use std::collections::{BTreeSet, HashMap, HashSet};

use lobbyforge_types::{LobbyType, PlayerId, SlotLabel};

use crate::{LobbyError, PlayerRecord, Requirement};

/// One seat in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub label: SlotLabel,
    pub occupant: Option<PlayerId>,
    pub ready: bool,
    pub in_game: bool,
    /// The previous occupant was substituted out and nobody has taken
    /// the seat since.
    pub needs_sub: bool,
}

impl Slot {
    fn new(index: usize, label: SlotLabel) -> Self {
        Self {
            index,
            label,
            occupant: None,
            ready: false,
            in_game: false,
            needs_sub: false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    fn clear(&mut self) -> Option<PlayerId> {
        self.ready = false;
        self.in_game = false;
        self.occupant.take()
    }
}

/// A lobby's seats plus its spectator and ban sets.
#[derive(Debug, Clone)]
pub struct Roster {
    lobby_type: LobbyType,
    slots: Vec<Slot>,
    spectators: BTreeSet<PlayerId>,
    banned: HashSet<PlayerId>,
    requirements: HashMap<usize, Requirement>,
    password: Option<String>,
}

impl Roster {
    /// Creates an empty roster laid out for `lobby_type`.
    pub fn new(lobby_type: LobbyType, password: Option<String>) -> Self {
        let slots = (0..lobby_type.slot_count())
            .filter_map(|i| lobby_type.label(i).map(|label| Slot::new(i, label)))
            .collect();
        Self {
            lobby_type,
            slots,
            spectators: BTreeSet::new(),
            banned: HashSet::new(),
            requirements: HashMap::new(),
            password: password.filter(|p| !p.is_empty()),
        }
    }

    // -- Seats --------------------------------------------------------------

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the roster has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// The slot `player` occupies, if any.
    pub fn slot_of(&self, player: PlayerId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.occupant == Some(player))
    }

    /// Who sits in slot `index`, if anyone.
    pub fn occupant_of(&self, index: usize) -> Option<PlayerId> {
        self.slots.get(index).and_then(|s| s.occupant)
    }

    /// Every seated player, in slot order.
    pub fn occupants(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.slots.iter().filter_map(|s| s.occupant)
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    /// Every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Slot::is_occupied)
    }

    pub fn is_password_protected(&self) -> bool {
        self.password.is_some()
    }

    /// Runs every check [`assign`](Self::assign) would, without mutating.
    ///
    /// Order: range, occupancy, ban, password, requirement.
    pub fn check_assign(
        &self,
        index: usize,
        player: &PlayerRecord,
        password: Option<&str>,
    ) -> Result<(), LobbyError> {
        let slot = self.slots.get(index).ok_or(LobbyError::SlotOutOfRange {
            slot: index,
            slots: self.slots.len(),
        })?;
        if let Some(current) = slot.occupant {
            if current != player.id {
                return Err(LobbyError::SlotOccupiedByOther(index));
            }
        }
        if self.banned.contains(&player.id) {
            return Err(LobbyError::PlayerBanned(player.id));
        }
        if let Some(expected) = &self.password {
            if password != Some(expected.as_str()) {
                return Err(LobbyError::BadSlotPassword);
            }
        }
        if let Some(req) = self.requirements.get(&index) {
            req.check(player, self.lobby_type)?;
        }
        Ok(())
    }

    /// Seats `player` in slot `index`.
    ///
    /// If the player already sits elsewhere in this roster they are moved,
    /// not duplicated; the old slot index is returned. Seating clears the
    /// slot's needs-substitute flag and the player's spectator membership.
    pub fn assign(
        &mut self,
        index: usize,
        player: &PlayerRecord,
        password: Option<&str>,
    ) -> Result<Option<usize>, LobbyError> {
        self.check_assign(index, player, password)?;

        let previous = self.slot_of(player.id);
        if previous == Some(index) {
            return Ok(None);
        }
        if let Some(old) = previous {
            self.slots[old].clear();
        }

        let slot = &mut self.slots[index];
        slot.occupant = Some(player.id);
        slot.ready = false;
        slot.in_game = false;
        slot.needs_sub = false;
        self.spectators.remove(&player.id);
        Ok(previous)
    }

    /// Empties the slot `player` occupies and returns its index.
    pub fn vacate(&mut self, player: PlayerId) -> Result<usize, LobbyError> {
        let index = self
            .slot_of(player)
            .ok_or(LobbyError::PlayerNotInLobby(player))?;
        self.slots[index].clear();
        Ok(index)
    }

    /// Empties the player's slot and flags it as awaiting a substitute.
    pub fn mark_needs_sub(&mut self, player: PlayerId) -> Result<usize, LobbyError> {
        let index = self.vacate(player)?;
        self.slots[index].needs_sub = true;
        Ok(index)
    }

    /// Whether slot `index` is awaiting a substitute.
    pub fn needs_sub(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.needs_sub)
    }

    // -- Readiness ----------------------------------------------------------

    /// Sets the ready flag on the player's slot.
    pub fn set_ready(&mut self, player: PlayerId, ready: bool) -> Result<usize, LobbyError> {
        let index = self
            .slot_of(player)
            .ok_or(LobbyError::PlayerNotInLobby(player))?;
        self.slots[index].ready = ready;
        Ok(index)
    }

    /// The player's ready flag, or `None` if they aren't seated.
    pub fn is_ready(&self, player: PlayerId) -> Option<bool> {
        self.slot_of(player).map(|i| self.slots[i].ready)
    }

    /// Every occupied slot is ready (and at least one is occupied).
    pub fn all_ready(&self) -> bool {
        let mut occupied = self.slots.iter().filter(|s| s.is_occupied()).peekable();
        occupied.peek().is_some() && occupied.all(|s| s.ready)
    }

    pub fn unready_all(&mut self) {
        for slot in &mut self.slots {
            slot.ready = false;
        }
    }

    /// Removes every occupant who never readied and makes them spectators.
    ///
    /// Returns the evicted players in slot order.
    pub fn evict_unready(&mut self) -> Vec<PlayerId> {
        let mut evicted = Vec::new();
        for slot in &mut self.slots {
            if slot.is_occupied() && !slot.ready {
                if let Some(player) = slot.clear() {
                    evicted.push(player);
                }
            }
        }
        self.spectators.extend(evicted.iter().copied());
        evicted
    }

    pub fn set_in_game(&mut self, player: PlayerId, in_game: bool) -> Result<usize, LobbyError> {
        let index = self
            .slot_of(player)
            .ok_or(LobbyError::PlayerNotInLobby(player))?;
        self.slots[index].in_game = in_game;
        Ok(index)
    }

    pub fn is_in_game(&self, player: PlayerId) -> Option<bool> {
        self.slot_of(player).map(|i| self.slots[i].in_game)
    }

    // -- Spectators ---------------------------------------------------------

    /// Adds a spectator. Returns `false` if they already were one.
    ///
    /// Seated players can't spectate.
    pub fn add_spectator(&mut self, player: PlayerId) -> Result<bool, LobbyError> {
        if self.slot_of(player).is_some() {
            return Err(LobbyError::AlreadyInSlot(player));
        }
        Ok(self.spectators.insert(player))
    }

    /// Removes a spectator. Returns `false` if they weren't one.
    pub fn remove_spectator(&mut self, player: PlayerId) -> bool {
        self.spectators.remove(&player)
    }

    pub fn is_spectating(&self, player: PlayerId) -> bool {
        self.spectators.contains(&player)
    }

    pub fn spectators(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.spectators.iter().copied()
    }

    // -- Bans and requirements ----------------------------------------------

    /// Bans `player` from ever taking a slot here. Does not vacate.
    pub fn ban(&mut self, player: PlayerId) {
        self.banned.insert(player);
    }

    pub fn is_banned(&self, player: PlayerId) -> bool {
        self.banned.contains(&player)
    }

    pub fn set_requirement(&mut self, index: usize, req: Requirement) -> Result<(), LobbyError> {
        if index >= self.slots.len() {
            return Err(LobbyError::SlotOutOfRange {
                slot: index,
                slots: self.slots.len(),
            });
        }
        self.requirements.insert(index, req);
        Ok(())
    }

    pub fn clear_requirement(&mut self, index: usize) -> Option<Requirement> {
        self.requirements.remove(&index)
    }

    pub fn requirement(&self, index: usize) -> Option<&Requirement> {
        self.requirements.get(&index)
    }
}
