//! Integration tests for the lobby service against in-memory collaborators.

use std::time::Duration;

use lobbyforge_lobby::{
    Actor, CloseReason, ErrorKind, LobbyConfig, LobbyError, LobbyEvent, LobbyService,
    LobbySettings, LobbySnapshot, LobbyState, MemoryAllocator, MemoryRepository, PlayerRecord,
    Repository, Requirement,
};
use lobbyforge_types::{LobbyId, LobbyType, PlayerId, Team};
use tokio::sync::mpsc;

type Service = LobbyService<MemoryAllocator, MemoryRepository, mpsc::UnboundedSender<LobbyEvent>>;

const CREATOR: PlayerId = PlayerId(1000);

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    service: Service,
    events: mpsc::UnboundedReceiver<LobbyEvent>,
    next_host: u32,
}

fn harness() -> Harness {
    harness_with(LobbyConfig::default())
}

fn harness_with(config: LobbyConfig) -> Harness {
    let (tx, events) = mpsc::unbounded_channel();
    let service = LobbyService::new(config, MemoryAllocator::new(), MemoryRepository::new(), tx);
    service.repository().register(CREATOR);
    for id in 1..=40 {
        service.repository().register(pid(id));
    }
    Harness {
        service,
        events,
        next_host: 1,
    }
}

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn creator() -> Actor {
    Actor::player(CREATOR)
}

impl Harness {
    async fn lobby(&mut self, lobby_type: LobbyType) -> LobbyId {
        self.lobby_with(LobbySettings::new(lobby_type, "cp_process_final"))
            .await
    }

    async fn lobby_with(&mut self, mut settings: LobbySettings) -> LobbyId {
        settings.server_host = format!("10.0.0.{}:27015", self.next_host);
        self.next_host += 1;
        self.service.create_lobby(CREATOR, settings).await.unwrap().id
    }

    /// Seats players `first..first + slot_count` in slot order.
    async fn fill(&self, lobby: LobbyId, lobby_type: LobbyType, first: u64) {
        for i in 0..lobby_type.slot_count() {
            self.service
                .assign(lobby, pid(first + i as u64), i, None)
                .await
                .unwrap();
        }
    }

    async fn ready_all(&self, lobby: LobbyId, ids: impl IntoIterator<Item = u64>) {
        for id in ids {
            self.service.ready(lobby, pid(id)).await.unwrap();
        }
    }

    fn snapshot(&self, lobby: LobbyId) -> LobbySnapshot {
        self.service.snapshot(lobby).unwrap()
    }

    fn drain(&mut self) -> Vec<LobbyEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

fn ready_ups(events: &[LobbyEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, LobbyEvent::ReadyUp { .. }))
        .count()
}

// =========================================================================
// Creation and listing
// =========================================================================

#[tokio::test]
async fn test_create_lobby_allocates_server_and_lists_waiting() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;

    let snap = h.snapshot(lobby);
    assert_eq!(snap.state, LobbyState::Waiting);
    assert_eq!(snap.max_players, 12);
    assert_eq!(snap.creator, CREATOR);
    assert_eq!(h.service.allocator().in_use(), 1);

    let config = h.service.allocator().config(snap.server).unwrap();
    assert_eq!(config.server_password.len(), 12);

    let waiting = h.service.list_lobbies(LobbyState::Waiting);
    assert_eq!(waiting.len(), 1);
    assert!(h.drain().contains(&LobbyEvent::LobbyListChanged));
}

#[tokio::test]
async fn test_create_lobby_unknown_creator_is_not_found() {
    let h = harness();
    let result = h
        .service
        .create_lobby(pid(999), LobbySettings::new(LobbyType::Sixes, "cp_snakewater"))
        .await;
    assert_eq!(result, Err(LobbyError::PlayerNotFound(pid(999))));
}

#[tokio::test]
async fn test_create_lobby_allocation_failure_is_external() {
    let h = harness();
    let settings = LobbySettings::new(LobbyType::Sixes, "cp_snakewater");
    h.service.create_lobby(CREATOR, settings.clone()).await.unwrap();

    // Same host twice: the allocator refuses.
    let err = h.service.create_lobby(CREATOR, settings).await.unwrap_err();
    assert!(matches!(err, LobbyError::Allocation(_)));
    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(h.service.lobby_count(), 1);
}

#[tokio::test]
async fn test_list_lobbies_newest_first() {
    let mut h = harness();
    let first = h.lobby(LobbyType::Sixes).await;
    let second = h.lobby(LobbyType::Highlander).await;
    let started = h.lobby(LobbyType::Debug).await;
    h.service.start(creator(), started).await.unwrap();

    let ids: Vec<_> = h
        .service
        .list_lobbies(LobbyState::Waiting)
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![second, first]);
    assert_eq!(h.service.list_lobbies(LobbyState::InProgress).len(), 1);
}

// =========================================================================
// Roster
// =========================================================================

#[tokio::test]
async fn test_assign_moves_player_within_lobby() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;

    h.service.assign(lobby, pid(1), 0, None).await.unwrap();
    let snap = h.service.assign(lobby, pid(1), 7, None).await.unwrap();

    assert_eq!(snap.slots[0].player, None);
    assert_eq!(snap.slots[7].player, Some(pid(1)));
    assert_eq!(snap.players, 1);
    assert_eq!(h.service.lobby_of(pid(1)), Some(lobby));
}

#[tokio::test]
async fn test_assign_occupied_slot_is_rejected() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.service.assign(lobby, pid(1), 0, None).await.unwrap();

    assert_eq!(
        h.service.assign(lobby, pid(2), 0, None).await,
        Err(LobbyError::SlotOccupiedByOther(0))
    );
    assert_eq!(
        h.service.assign(lobby, pid(2), 12, None).await,
        Err(LobbyError::SlotOutOfRange { slot: 12, slots: 12 })
    );
    assert_eq!(h.service.lobby_of(pid(2)), None);
}

#[tokio::test]
async fn test_join_by_team_and_class() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Highlander).await;

    let snap = h
        .service
        .join(lobby, pid(1), Team::Blu, "medic", None)
        .await
        .unwrap();
    let medic = snap.slots.iter().find(|s| s.player == Some(pid(1))).unwrap();
    assert_eq!(medic.team, Team::Blu);
    assert_eq!(medic.class, "medic");

    assert!(matches!(
        h.service.join(lobby, pid(2), Team::Red, "pyromancer", None).await,
        Err(LobbyError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_kick_with_ban_blocks_rejoin() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.service.assign(lobby, pid(1), 3, None).await.unwrap();

    h.service.kick(creator(), lobby, pid(1), true).await.unwrap();
    assert_eq!(h.service.lobby_of(pid(1)), None);
    assert!(h.drain().contains(&LobbyEvent::Removed {
        lobby,
        player: pid(1)
    }));

    assert_eq!(
        h.service.assign(lobby, pid(1), 3, None).await,
        Err(LobbyError::PlayerBanned(pid(1)))
    );
}

#[tokio::test]
async fn test_kick_needs_creator_or_moderator() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.service.assign(lobby, pid(1), 0, None).await.unwrap();

    let err = h
        .service
        .kick(Actor::player(pid(2)), lobby, pid(1), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    assert!(matches!(
        h.service.kick(Actor::player(pid(1)), lobby, pid(1), true).await,
        Err(LobbyError::InvalidInput(_))
    ));

    // Kicking yourself is leaving.
    h.service
        .kick(Actor::player(pid(1)), lobby, pid(1), false)
        .await
        .unwrap();
    assert_eq!(h.snapshot(lobby).players, 0);
}

#[tokio::test]
async fn test_slot_password_checked_after_ban() {
    let mut h = harness();
    let mut settings = LobbySettings::new(LobbyType::Sixes, "cp_granary_pro");
    settings.password = Some("hunter2".into());
    let lobby = h.lobby_with(settings).await;

    assert_eq!(
        h.service.assign(lobby, pid(1), 0, None).await,
        Err(LobbyError::BadSlotPassword)
    );
    assert_eq!(
        h.service.assign(lobby, pid(1), 0, Some("nope")).await,
        Err(LobbyError::BadSlotPassword)
    );
    h.service
        .assign(lobby, pid(1), 0, Some("hunter2"))
        .await
        .unwrap();
    assert!(h.snapshot(lobby).password_protected);
}

#[tokio::test]
async fn test_requirements_checked_in_order() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.service
        .set_requirement(creator(), lobby, 4, Requirement { hours: 500, lobbies: 3 })
        .await
        .unwrap();

    let mut record = PlayerRecord::new(pid(30), "newbie");
    h.service.repository().insert_player(record.clone());
    assert_eq!(
        h.service.assign(lobby, pid(30), 4, None).await,
        Err(LobbyError::RequirementHours {
            required: 500,
            actual: 0
        })
    );

    record.game_hours = 800;
    h.service.repository().insert_player(record.clone());
    assert_eq!(
        h.service.assign(lobby, pid(30), 4, None).await,
        Err(LobbyError::RequirementLobbies {
            required: 3,
            actual: 0
        })
    );

    record.played.insert(LobbyType::Sixes, 3);
    h.service.repository().insert_player(record);
    h.service.assign(lobby, pid(30), 4, None).await.unwrap();
}

#[tokio::test]
async fn test_set_requirement_needs_authority_and_waiting() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Debug).await;

    assert!(matches!(
        h.service
            .set_requirement(Actor::player(pid(5)), lobby, 0, Requirement::default())
            .await,
        Err(LobbyError::NotAuthorized(_))
    ));

    h.fill(lobby, LobbyType::Debug, 1).await;
    assert!(matches!(
        h.service
            .set_requirement(creator(), lobby, 0, Requirement::default())
            .await,
        Err(LobbyError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_spectators_are_idempotent() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;

    assert_eq!(h.service.add_spectator(lobby, pid(9)).await, Ok(true));
    assert_eq!(h.service.add_spectator(lobby, pid(9)).await, Ok(false));
    assert_eq!(h.snapshot(lobby).spectators, vec![pid(9)]);

    assert_eq!(h.service.remove_spectator(lobby, pid(9)).await, Ok(true));
    assert_eq!(h.service.remove_spectator(lobby, pid(9)).await, Ok(false));

    // Taking a slot supersedes spectating.
    h.service.add_spectator(lobby, pid(9)).await.unwrap();
    h.service.assign(lobby, pid(9), 0, None).await.unwrap();
    assert!(h.snapshot(lobby).spectators.is_empty());
    assert_eq!(
        h.service.add_spectator(lobby, pid(9)).await,
        Err(LobbyError::AlreadyInSlot(pid(9)))
    );
}

// =========================================================================
// Readiness
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_full_roster_enters_readying_up_once() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.drain();

    h.fill(lobby, LobbyType::Sixes, 1).await;
    assert_eq!(h.snapshot(lobby).state, LobbyState::ReadyingUp);
    assert_eq!(
        h.service.readiness_remaining(lobby),
        Some(Duration::from_secs(30))
    );

    // Re-seating in place doesn't restart anything.
    h.service.assign(lobby, pid(12), 11, None).await.unwrap();
    assert_eq!(ready_ups(&h.drain()), 1);
}

#[tokio::test]
async fn test_ready_while_waiting_is_state_conflict() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.service.assign(lobby, pid(1), 0, None).await.unwrap();

    let err = h.service.ready(lobby, pid(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}

#[tokio::test(start_paused = true)]
async fn test_all_ready_starts_match_and_cancels_timeout() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.fill(lobby, LobbyType::Sixes, 1).await;

    h.ready_all(lobby, 1..=12).await;
    assert_eq!(h.snapshot(lobby).state, LobbyState::InProgress);
    assert_eq!(h.service.readiness_remaining(lobby), None);
    assert!(h.drain().contains(&LobbyEvent::LobbyStarted { lobby }));

    tokio::time::sleep(Duration::from_secs(60)).await;
    let snap = h.snapshot(lobby);
    assert_eq!(snap.state, LobbyState::InProgress);
    assert_eq!(snap.players, 12);
}

#[tokio::test(start_paused = true)]
async fn test_unready_keeps_slot() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Debug).await;
    h.fill(lobby, LobbyType::Debug, 1).await;

    h.service.ready(lobby, pid(1)).await.unwrap();
    let snap = h.service.unready(lobby, pid(1)).await.unwrap();
    assert_eq!(snap.state, LobbyState::ReadyingUp);
    assert_eq!(snap.slots[0].player, Some(pid(1)));
    assert!(!snap.slots[0].ready);
}

#[tokio::test(start_paused = true)]
async fn test_leave_while_readying_reverts_and_cancels_timeout() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.fill(lobby, LobbyType::Sixes, 1).await;
    h.ready_all(lobby, 1..=5).await;

    let snap = h.service.leave(lobby, pid(7)).await.unwrap();
    assert_eq!(snap.state, LobbyState::Waiting);
    assert!(snap.slots.iter().all(|s| !s.ready));
    assert_eq!(h.service.readiness_remaining(lobby), None);

    // The cancelled timeout never evicts anyone.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let snap = h.snapshot(lobby);
    assert_eq!(snap.state, LobbyState::Waiting);
    assert_eq!(snap.players, 11);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_evicts_unready_players() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.fill(lobby, LobbyType::Sixes, 1).await;
    h.ready_all(lobby, 1..=10).await;
    h.drain();

    tokio::time::sleep(Duration::from_secs(31)).await;

    let snap = h.snapshot(lobby);
    assert_eq!(snap.state, LobbyState::Waiting);
    assert_eq!(snap.players, 10);
    assert_eq!(snap.slots[10].player, None);
    assert_eq!(snap.slots[11].player, None);
    assert!(snap.slots.iter().all(|s| !s.ready));
    assert_eq!(snap.spectators, vec![pid(11), pid(12)]);
    assert_eq!(h.service.lobby_of(pid(11)), None);
    assert_eq!(h.service.lobby_of(pid(1)), Some(lobby));

    let events = h.drain();
    assert!(events.contains(&LobbyEvent::Removed {
        lobby,
        player: pid(11)
    }));
    assert!(events.contains(&LobbyEvent::Removed {
        lobby,
        player: pid(12)
    }));
}

#[tokio::test(start_paused = true)]
async fn test_refill_after_timeout_starts_fresh_window() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Debug).await;
    h.fill(lobby, LobbyType::Debug, 1).await;
    h.service.ready(lobby, pid(1)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.snapshot(lobby).state, LobbyState::Waiting);

    tokio::time::sleep(Duration::from_secs(5)).await;
    h.service.assign(lobby, pid(3), 1, None).await.unwrap();
    assert_eq!(h.snapshot(lobby).state, LobbyState::ReadyingUp);
    assert_eq!(
        h.service.readiness_remaining(lobby),
        Some(Duration::from_secs(30))
    );
}

#[tokio::test(start_paused = true)]
async fn test_custom_ready_timeout() {
    let mut h = harness_with(LobbyConfig {
        ready_timeout: Duration::from_secs(10),
        ..LobbyConfig::default()
    });
    let lobby = h.lobby(LobbyType::Debug).await;
    h.fill(lobby, LobbyType::Debug, 1).await;

    tokio::time::sleep(Duration::from_secs(11)).await;
    let snap = h.snapshot(lobby);
    assert_eq!(snap.state, LobbyState::Waiting);
    assert_eq!(snap.players, 0);
}

// =========================================================================
// Substitution
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_too_many_subs_closes_lobby() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Debug).await;
    h.fill(lobby, LobbyType::Debug, 1).await;
    h.ready_all(lobby, 1..=2).await;
    let server = h.snapshot(lobby).server;
    h.drain();

    h.service.substitute(lobby, pid(1)).await.unwrap();
    let snap = h.service.substitute(lobby, pid(2)).await.unwrap();

    assert_eq!(snap.state, LobbyState::Ended);
    assert_eq!(snap.close_reason, Some(CloseReason::TooManySubs));
    let events = h.drain();
    assert!(events.contains(&LobbyEvent::SystemMessage {
        lobby,
        text: "Lobby closed (Too many subs).".into()
    }));
    assert!(events.contains(&LobbyEvent::LobbyClosed {
        lobby,
        reason: CloseReason::TooManySubs
    }));

    // Aborted: nobody is credited, and the server goes back.
    let record = h.service.repository().player(pid(1)).unwrap();
    assert_eq!(record.played_count(LobbyType::Debug), 0);
    assert_eq!(h.service.allocator().released(), vec![server]);
}

#[tokio::test(start_paused = true)]
async fn test_too_many_subs_while_readying_closes_lobby() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Debug).await;
    h.fill(lobby, LobbyType::Debug, 1).await;
    assert_eq!(h.snapshot(lobby).state, LobbyState::ReadyingUp);
    h.drain();

    let snap = h.service.substitute(lobby, pid(1)).await.unwrap();
    assert_eq!(snap.state, LobbyState::ReadyingUp);
    assert_eq!(snap.substitutions, 1);
    assert_eq!(snap.open_sub_slots(), vec![0]);
    assert!(h.service.readiness_remaining(lobby).is_some());

    let snap = h.service.substitute(lobby, pid(2)).await.unwrap();
    assert_eq!(snap.state, LobbyState::Ended);
    assert_eq!(snap.close_reason, Some(CloseReason::TooManySubs));
    assert_eq!(h.service.readiness_remaining(lobby), None);
    assert_eq!(h.service.lobby_of(pid(2)), None);
    assert!(h.drain().contains(&LobbyEvent::SystemMessage {
        lobby,
        text: "Lobby closed (Too many subs).".into()
    }));

    // The cancelled timeout never reverts the ended lobby.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.snapshot(lobby).state, LobbyState::Ended);
}

#[tokio::test]
async fn test_fill_substitute_reopens_and_refills_slot() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    h.fill(lobby, LobbyType::Sixes, 1).await;
    h.service.start(creator(), lobby).await.unwrap();

    h.service.substitute(lobby, pid(4)).await.unwrap();
    assert_eq!(h.snapshot(lobby).open_sub_slots(), vec![3]);

    // Fresh joins are refused while InProgress, except into the open seat.
    assert!(matches!(
        h.service.assign(lobby, pid(20), 0, None).await,
        Err(LobbyError::InvalidState { .. })
    ));
    assert!(matches!(
        h.service.fill_substitute(lobby, pid(4), 3, None).await,
        Err(LobbyError::InvalidInput(_))
    ));
    let snap = h.service.fill_substitute(lobby, pid(20), 3, None).await.unwrap();
    assert_eq!(snap.slots[3].player, Some(pid(20)));
    assert!(!snap.slots[3].needs_sub);
    assert_eq!(snap.substitutions, 1);
}

// =========================================================================
// Cross-lobby moves
// =========================================================================

#[tokio::test]
async fn test_cross_lobby_move_from_in_progress_marks_needs_sub() {
    let mut h = harness();
    let a = h.lobby(LobbyType::Sixes).await;
    let b = h.lobby(LobbyType::Sixes).await;
    h.fill(a, LobbyType::Sixes, 1).await;
    h.service.start(creator(), a).await.unwrap();

    h.service.assign(b, pid(1), 0, None).await.unwrap();

    let snap_a = h.snapshot(a);
    assert!(snap_a.slots[0].needs_sub);
    assert_eq!(snap_a.slots[0].player, None);
    assert_eq!(snap_a.substitutions, 1);
    assert_eq!(snap_a.state, LobbyState::InProgress);
    assert_eq!(h.snapshot(b).slots[0].player, Some(pid(1)));
    assert_eq!(h.service.lobby_of(pid(1)), Some(b));
}

#[tokio::test(start_paused = true)]
async fn test_cross_lobby_move_from_readying_reverts_other_lobby() {
    let mut h = harness();
    let a = h.lobby(LobbyType::Debug).await;
    let b = h.lobby(LobbyType::Sixes).await;
    h.fill(a, LobbyType::Debug, 1).await;
    assert_eq!(h.snapshot(a).state, LobbyState::ReadyingUp);

    h.service.assign(b, pid(2), 5, None).await.unwrap();

    let snap_a = h.snapshot(a);
    assert_eq!(snap_a.state, LobbyState::Waiting);
    assert_eq!(snap_a.players, 1);
    assert!(!snap_a.slots[1].needs_sub);
    assert_eq!(h.service.readiness_remaining(a), None);
}

#[tokio::test]
async fn test_cross_lobby_rejected_join_leaves_other_lobby_untouched() {
    let mut h = harness();
    let a = h.lobby(LobbyType::Sixes).await;
    let mut settings = LobbySettings::new(LobbyType::Sixes, "koth_product");
    settings.password = Some("secret".into());
    let b = h.lobby_with(settings).await;
    h.service.assign(a, pid(1), 2, None).await.unwrap();

    assert_eq!(
        h.service.assign(b, pid(1), 0, Some("wrong")).await,
        Err(LobbyError::BadSlotPassword)
    );
    assert_eq!(h.snapshot(a).slots[2].player, Some(pid(1)));
    assert_eq!(h.service.lobby_of(pid(1)), Some(a));
}

// =========================================================================
// Closure
// =========================================================================

#[tokio::test]
async fn test_close_normal_credits_every_participant_once() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;
    // Joins and leaves before the roster fills; still counts as seated here.
    h.service.assign(lobby, pid(35), 0, None).await.unwrap();
    h.service.leave(lobby, pid(35)).await.unwrap();
    h.fill(lobby, LobbyType::Sixes, 1).await;
    h.service.start(creator(), lobby).await.unwrap();
    h.service.substitute(lobby, pid(6)).await.unwrap();
    h.service.fill_substitute(lobby, pid(30), 5, None).await.unwrap();

    let snap = h.service.close(creator(), lobby, false).await.unwrap();
    assert_eq!(snap.state, LobbyState::Ended);

    let repo = h.service.repository();
    for id in (1..=12).chain([30, 35]) {
        assert_eq!(
            repo.player(pid(id)).unwrap().played_count(LobbyType::Sixes),
            1,
            "player {id}"
        );
    }
    assert_eq!(h.service.lobby_of(pid(1)), None);
    assert_eq!(h.service.lobby_of(pid(30)), None);
    assert_eq!(
        repo.player(pid(36)).unwrap().played_count(LobbyType::Sixes),
        0,
        "never seated"
    );
}

#[tokio::test]
async fn test_close_aborted_skips_stats() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Debug).await;
    h.service.assign(lobby, pid(1), 0, None).await.unwrap();

    h.service.close(creator(), lobby, true).await.unwrap();
    let record = h.service.repository().player(pid(1)).unwrap();
    assert_eq!(record.played_count(LobbyType::Debug), 0);
}

#[tokio::test]
async fn test_close_authorization_and_terminal_state() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Debug).await;

    assert!(matches!(
        h.service.close(Actor::player(pid(3)), lobby, false).await,
        Err(LobbyError::NotAuthorized(_))
    ));
    h.service
        .close(Actor::admin(pid(3)), lobby, false)
        .await
        .unwrap();

    let err = h.service.close(creator(), lobby, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert!(h.service.assign(lobby, pid(1), 0, None).await.is_err());
}

#[tokio::test]
async fn test_close_releases_server_and_sweep_collects_orphans() {
    use lobbyforge_lobby::{ServerAllocator, ServerConfig};

    let mut h = harness();
    let lobby = h.lobby(LobbyType::Debug).await;
    let server = h.snapshot(lobby).server;

    // A server nobody references, e.g. left over from a crashed process.
    let orphan = h
        .service
        .allocator()
        .allocate(ServerConfig {
            lobby: LobbyId(999),
            host: "192.168.1.1:27015".into(),
            rcon_password: String::new(),
            server_password: "x".into(),
        })
        .await
        .unwrap();

    assert_eq!(h.service.sweep_servers().await, vec![orphan]);
    assert!(h.service.sweep_servers().await.is_empty());
    assert_eq!(h.service.allocator().in_use(), 1);

    h.service.close(creator(), lobby, true).await.unwrap();
    assert_eq!(h.service.allocator().released(), vec![orphan, server]);
    assert_eq!(h.service.allocator().in_use(), 0);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_for_one_slot_have_one_winner() {
    let mut h = harness();
    let lobby = h.lobby(LobbyType::Sixes).await;

    let mut tasks = Vec::new();
    for id in 1..=20 {
        let service = h.service.clone();
        tasks.push(tokio::spawn(async move {
            service.assign(lobby, pid(id), 0, None).await
        }));
    }
    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(h.snapshot(lobby).players, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_to_two_lobbies_seat_player_once() {
    let mut h = harness();
    let a = h.lobby(LobbyType::Sixes).await;
    let b = h.lobby(LobbyType::Sixes).await;

    for round in 0..20u64 {
        let player = pid(1 + round);
        let (sa, sb) = (h.service.clone(), h.service.clone());
        let ta = tokio::spawn(async move { sa.assign(a, player, 0, None).await });
        let tb = tokio::spawn(async move { sb.assign(b, player, 1, None).await });
        ta.await.unwrap().unwrap();
        tb.await.unwrap().unwrap();

        let seats = [a, b]
            .into_iter()
            .map(|l| {
                h.snapshot(l)
                    .slots
                    .iter()
                    .filter(|s| s.player == Some(player))
                    .count()
            })
            .sum::<usize>();
        assert_eq!(seats, 1, "round {round}");
        let home = h.service.lobby_of(player).unwrap();
        assert!(h.snapshot(home).slots.iter().any(|s| s.player == Some(player)));

        // Clear both lobbies for the next round.
        h.service.leave(home, player).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_cross_lobby_moves_do_not_deadlock() {
    let mut h = harness();
    let a = h.lobby(LobbyType::Sixes).await;
    let b = h.lobby(LobbyType::Sixes).await;
    h.service.assign(a, pid(1), 0, None).await.unwrap();
    h.service.assign(b, pid(2), 0, None).await.unwrap();

    let (s1, s2) = (h.service.clone(), h.service.clone());
    let t1 = tokio::spawn(async move {
        for i in 0..50 {
            let (to, slot) = if i % 2 == 0 { (b, 4) } else { (a, 4) };
            s1.assign(to, pid(1), slot, None).await.unwrap();
        }
    });
    let t2 = tokio::spawn(async move {
        for i in 0..50 {
            let (to, slot) = if i % 2 == 0 { (a, 5) } else { (b, 5) };
            s2.assign(to, pid(2), slot, None).await.unwrap();
        }
    });
    tokio::time::timeout(Duration::from_secs(10), async {
        t1.await.unwrap();
        t2.await.unwrap();
    })
    .await
    .expect("cross-lobby moves deadlocked");

    assert_eq!(h.service.lobby_of(pid(1)), Some(a));
    assert_eq!(h.service.lobby_of(pid(2)), Some(b));
}
