//! End-of-life handling: the per-lobby finalizer and the server sweep.
//!
//! The finalizer runs exactly once per lobby. The lobby's lock is held
//! throughout, and [`LobbyState::Ended`](crate::LobbyState::Ended) is
//! terminal, so no second transition into Ended can reach it.

use std::collections::HashSet;

use lobbyforge_types::ServerRef;
use tracing::{info, warn};

use crate::manager::guard;
use crate::{
    CloseReason, Lobby, LobbyEvent, LobbyService, NotificationSink, Repository, ServerAllocator,
};

impl<A, R, N> LobbyService<A, R, N>
where
    A: ServerAllocator,
    R: Repository,
    N: NotificationSink,
{
    /// Runs the closure side effects for a lobby that just entered Ended.
    pub(crate) async fn finalize(&self, lobby: &mut Lobby, reason: CloseReason) {
        let id = lobby.id();
        self.cancel_ready_timer(lobby);

        if reason.applies_stats() {
            let lobby_type = lobby.lobby_type();
            let mut credited = 0usize;
            for player in lobby.participants() {
                self.inner.repository.record_played(player, lobby_type);
                credited += 1;
            }
            info!(lobby_id = %id, credited, "played-lobby stats recorded");
        }

        let occupants: Vec<_> = lobby.roster().occupants().collect();
        for player in occupants {
            self.release_player(player, id);
        }

        if reason == CloseReason::TooManySubs {
            self.inner.sink.notify(LobbyEvent::SystemMessage {
                lobby: id,
                text: reason.message().to_string(),
            });
        }

        let server = lobby.server();
        let unreferenced = {
            let mut servers = guard(&self.inner.servers);
            match servers.get_mut(&server) {
                Some(lobbies) => {
                    lobbies.remove(&id);
                    if lobbies.is_empty() {
                        servers.remove(&server);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if unreferenced {
            if let Err(e) = self.inner.allocator.release(server).await {
                warn!(lobby_id = %id, %server, error = %e, "server release failed");
            }
        }

        info!(lobby_id = %id, %reason, substitutions = lobby.substitutions(), "lobby closed");
        self.inner
            .sink
            .notify(LobbyEvent::LobbyClosed { lobby: id, reason });
    }

    /// Releases every allocated server that no active lobby references.
    ///
    /// Idempotent. Lobby creation is held off while the sweep runs, so a
    /// server allocated for a lobby still being created is never taken.
    pub async fn sweep_servers(&self) -> Vec<ServerRef> {
        let _gate = self.inner.creation_gate.write().await;

        let referenced: HashSet<ServerRef> =
            guard(&self.inner.servers).keys().copied().collect();
        let mut released = Vec::new();
        for server in self.inner.allocator.allocated().await {
            if referenced.contains(&server) {
                continue;
            }
            match self.inner.allocator.release(server).await {
                Ok(()) => released.push(server),
                Err(e) => warn!(%server, error = %e, "sweep could not release server"),
            }
        }
        if !released.is_empty() {
            info!(count = released.len(), "unused servers released");
        }
        released
    }
}
