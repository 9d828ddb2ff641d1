//! Headless duel.
//!
//! Usage: `dungeon-headless [config.ron]`
//!
//! Two scripted participants join through the lobby. The first one walks up
//! to wherever its replica last saw the second and swings every tick until
//! the round ends.

use std::process::ExitCode;

use dungeon_room::config::RoomConfig;
use dungeon_room::{Lobby, LobbyError};
use dungeon_sim::{Command, Transform};
use glam::DVec3;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    info!("=== Dark Dungeon Headless ===");

    let config = match std::env::args().nth(1) {
        Some(path) => match RoomConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                error!(error = %err, path = %path, "config_load_failed");
                return ExitCode::FAILURE;
            }
        },
        None => RoomConfig::default(),
    };
    let lobby = match Lobby::new(config) {
        Ok(lobby) => lobby,
        Err(err) => {
            error!(error = %err, "config_invalid");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = run_duel(lobby) {
        error!(error = %err, "duel_failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn run_duel(mut lobby: Lobby) -> Result<(), LobbyError> {
    let version = lobby.config().game_version.clone();
    let max_ticks = lobby.config().round_duration_ticks() + 1;

    let attacker = lobby.join_random_or_create(&version)?;
    let defender = lobby.join_random_or_create(&version)?;
    let room_name = attacker.room.clone();
    let room = lobby
        .room_mut(&room_name)
        .ok_or_else(|| LobbyError::RoomNotFound(room_name.clone()))?;

    let participant = attacker.grant.participant;
    let entity_id = attacker.grant.entity_id;
    let target = defender.grant.entity_id;
    info!(
        room = %room_name,
        attacker = participant,
        defender = defender.grant.participant,
        "duel_started"
    );

    for _ in 0..max_ticks {
        let tick = room.tick();
        let seen_at = room
            .peer(participant)
            .and_then(|peer| peer.world().entity(target))
            .map(|entity| entity.transform().position);
        if let Some(position) = seen_at {
            room.submit_command(
                participant,
                tick,
                Command::Move {
                    entity_id,
                    transform: Transform::at(position - DVec3::Z),
                },
            );
            room.submit_command(participant, tick, Command::Attack { entity_id });
        }

        let report = room.step();
        if let Some(reason) = report.round_end {
            info!(tick = report.tick, ?reason, "duel_finished");
            break;
        }
    }

    info!(
        scores = ?room.coordinator().scores(),
        ticks = room.tick(),
        "final_scores"
    );
    Ok(())
}
