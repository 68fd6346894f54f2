//! Drives a six-a-side lobby through its whole life against the in-memory
//! collaborators, printing every event as JSON.
//!
//! ```text
//! RUST_LOG=debug cargo run -p readyup
//! ```

use std::time::Duration;

use lobbyforge::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;

const CREATOR: PlayerId = PlayerId(1);

#[tokio::main]
async fn main() -> Result<(), LobbyforgeError> {
    lobbyforge::init_tracing();

    let (service, events) = Lobbyforge::builder()
        .ready_timeout(Duration::from_secs(2))
        .build_in_memory();
    let printer = tokio::spawn(print_events(events));

    for id in 1..=14 {
        service.repository().register(PlayerId(id));
    }

    let mut settings = LobbySettings::new(LobbyType::Sixes, "cp_process_final");
    settings.league = League::Etf2l;
    settings.server_host = "127.0.0.1:27015".into();
    let lobby = service.create_lobby(CREATOR, settings).await?.id;

    // Everyone grabs a seat; the twelfth starts the ready-up window.
    let layout = LobbyType::Sixes;
    for (i, team) in [Team::Red, Team::Blu].into_iter().enumerate() {
        for (j, class) in layout.classes().iter().enumerate() {
            let player = PlayerId((i * layout.classes_per_team() + j) as u64 + 1);
            service.join(lobby, player, team, class, None).await?;
        }
    }

    // Two players never ready; the timeout moves them to spectators.
    for id in 1..=10 {
        service.ready(lobby, PlayerId(id)).await?;
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
    tracing::info!(state = %service.snapshot(lobby)?.state, "after timeout");

    // Two fresh players take the open seats and everyone readies.
    service.assign(lobby, PlayerId(13), 10, None).await?;
    service.assign(lobby, PlayerId(14), 11, None).await?;
    for id in (1..=10).chain([13, 14]) {
        service.ready(lobby, PlayerId(id)).await?;
    }

    // Mid-match substitution, then a normal close that credits everyone.
    service.substitute(lobby, PlayerId(6)).await?;
    service.fill_substitute(lobby, PlayerId(11), 5, None).await?;
    service
        .close(Actor::player(CREATOR), lobby, false)
        .await?;

    let record = service
        .repository()
        .player(PlayerId(6))
        .ok_or(LobbyError::PlayerNotFound(PlayerId(6)))?;
    tracing::info!(
        player = %record.id,
        played = record.played_count(LobbyType::Sixes),
        "stats after close"
    );

    drop(service);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "event printer stopped");
    }
    Ok(())
}

async fn print_events(mut events: UnboundedReceiver<LobbyEvent>) {
    while let Some(event) = events.recv().await {
        if matches!(event, LobbyEvent::LobbyUpdated { .. }) {
            continue;
        }
        match serde_json::to_string(&event) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "could not encode event"),
        }
    }
}
