//! Lobby: named rooms and matchmaking.
//!
//! Rooms are kept in name order. Random join picks the first room that
//! still accepts joins; when none does, the `_or_create` variants create
//! exactly one new room and join it.

use std::collections::BTreeMap;

use dungeon_sim::ParticipantId;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, RoomConfig};
use crate::coordinator::{Departure, JoinError};
use crate::{JoinTicket, Room, StepReport};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("room `{0}` already exists")]
    NameTaken(String),
    #[error("room `{0}` not found")]
    RoomNotFound(String),
    #[error("room `{0}` is closed")]
    RoomClosed(String),
    #[error("room `{name}` is full ({max} players)")]
    RoomFull { name: String, max: usize },
    #[error("no open room available")]
    NoRoomAvailable,
    #[error("game version mismatch: lobby runs {expected}, client has {got}")]
    VersionMismatch { expected: String, got: String },
    #[error(transparent)]
    Join(#[from] JoinError),
}

impl LobbyError {
    fn from_join(name: &str, err: JoinError) -> Self {
        match err {
            JoinError::RoomClosed => Self::RoomClosed(name.to_string()),
            JoinError::RoomFull { max } => Self::RoomFull {
                name: name.to_string(),
                max,
            },
            other => Self::Join(other),
        }
    }
}

pub struct Lobby {
    config: RoomConfig,
    rooms: BTreeMap<String, Room>,
    next_room: u64,
}

impl Lobby {
    /// Every room the lobby creates uses `config`, which is validated once
    /// here.
    pub fn new(config: RoomConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            rooms: BTreeMap::new(),
            next_room: 1,
        })
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn room_mut(&mut self, name: &str) -> Option<&mut Room> {
        self.rooms.get_mut(name)
    }

    /// Room names in order.
    pub fn room_names(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn check_version(&self, version: &str) -> Result<(), LobbyError> {
        if version != self.config.game_version {
            warn!(expected = %self.config.game_version, got = %version, "version_mismatch");
            return Err(LobbyError::VersionMismatch {
                expected: self.config.game_version.clone(),
                got: version.to_string(),
            });
        }
        Ok(())
    }

    /// Create a room. Without a name one is generated.
    pub fn create_room(&mut self, name: Option<String>) -> Result<String, LobbyError> {
        let name = match name {
            Some(name) => {
                if self.rooms.contains_key(&name) {
                    return Err(LobbyError::NameTaken(name));
                }
                name
            }
            None => loop {
                let candidate = format!("room-{}", self.next_room);
                self.next_room += 1;
                if !self.rooms.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        self.rooms
            .insert(name.clone(), Room::new(name.clone(), self.config.clone()));
        info!(room = %name, rooms = self.rooms.len(), "lobby_room_created");
        Ok(name)
    }

    pub fn join_room(&mut self, name: &str, version: &str) -> Result<JoinTicket, LobbyError> {
        self.check_version(version)?;
        let room = self
            .rooms
            .get_mut(name)
            .ok_or_else(|| LobbyError::RoomNotFound(name.to_string()))?;
        room.join().map_err(|err| LobbyError::from_join(name, err))
    }

    /// Join the first room, in name order, that accepts joins.
    pub fn join_random(&mut self, version: &str) -> Result<JoinTicket, LobbyError> {
        self.check_version(version)?;
        let name = self
            .rooms
            .iter()
            .find(|(_, room)| room.is_open())
            .map(|(name, _)| name.clone())
            .ok_or(LobbyError::NoRoomAvailable)?;
        self.join_room(&name, version)
    }

    /// Random join, falling back to creating one new room.
    pub fn join_random_or_create(&mut self, version: &str) -> Result<JoinTicket, LobbyError> {
        match self.join_random(version) {
            Err(LobbyError::NoRoomAvailable) => {
                info!("random_join_failed_creating_room");
                let name = self.create_room(None)?;
                self.join_room(&name, version)
            }
            result => result,
        }
    }

    /// Join `name`, creating it first if it does not exist.
    pub fn join_or_create(&mut self, name: &str, version: &str) -> Result<JoinTicket, LobbyError> {
        self.check_version(version)?;
        if !self.rooms.contains_key(name) {
            self.create_room(Some(name.to_string()))?;
        }
        self.join_room(name, version)
    }

    /// Remove a participant. The room is destroyed when it empties.
    pub fn leave(
        &mut self,
        name: &str,
        participant: ParticipantId,
    ) -> Result<Option<Departure>, LobbyError> {
        let room = self
            .rooms
            .get_mut(name)
            .ok_or_else(|| LobbyError::RoomNotFound(name.to_string()))?;
        let departure = room.leave(participant);
        if room.is_empty() {
            self.rooms.remove(name);
            info!(room = %name, "lobby_room_destroyed");
        }
        Ok(departure)
    }

    /// Step every room once, in name order.
    pub fn step_all(&mut self) -> Vec<(String, StepReport)> {
        self.rooms
            .iter_mut()
            .map(|(name, room)| (name.clone(), room.step()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: &str = crate::config::DEFAULT_GAME_VERSION;

    fn lobby(max_players: usize) -> Lobby {
        Lobby::new(RoomConfig {
            max_players,
            ..RoomConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Lobby::new(RoomConfig {
            max_players: 0,
            ..RoomConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { field: "max_players", .. }));

        let result = Lobby::new(RoomConfig {
            tick_rate_hz: 0,
            ..RoomConfig::default()
        });
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { field: "tick_rate_hz", .. })
        ));
    }

    #[test]
    fn test_create_room_names() {
        let mut lobby = lobby(4);
        assert_eq!(lobby.create_room(None).unwrap(), "room-1");
        assert_eq!(lobby.create_room(Some("arena".into())).unwrap(), "arena");
        assert_eq!(
            lobby.create_room(Some("arena".into())),
            Err(LobbyError::NameTaken("arena".into()))
        );
        // A user-chosen name never blocks generation
        lobby.create_room(Some("room-2".into())).unwrap();
        assert_eq!(lobby.create_room(None).unwrap(), "room-3");
    }

    #[test]
    fn test_join_room_errors() {
        let mut lobby = lobby(1);
        assert_eq!(
            lobby.join_room("nowhere", VERSION),
            Err(LobbyError::RoomNotFound("nowhere".into()))
        );

        let name = lobby.create_room(None).unwrap();
        lobby.join_room(&name, VERSION).unwrap();
        assert_eq!(
            lobby.join_room(&name, VERSION),
            Err(LobbyError::RoomFull { name, max: 1 })
        );
    }

    #[test]
    fn test_closed_room_rejects_join() {
        let mut lobby = Lobby::new(RoomConfig {
            round_duration_secs: 0.05,
            ..RoomConfig::default()
        })
        .unwrap();
        let name = lobby.create_room(None).unwrap();
        lobby.join_room(&name, VERSION).unwrap();
        for _ in 0..5 {
            lobby.step_all();
        }
        assert_eq!(
            lobby.join_room(&name, VERSION),
            Err(LobbyError::RoomClosed(name))
        );
    }

    #[test]
    fn test_version_mismatch() {
        let mut lobby = lobby(4);
        lobby.create_room(None).unwrap();
        assert_eq!(
            lobby.join_random("9.9"),
            Err(LobbyError::VersionMismatch {
                expected: VERSION.into(),
                got: "9.9".into()
            })
        );
        // Mismatch never falls back to creating a room
        assert!(lobby.join_random_or_create("9.9").is_err());
        assert_eq!(lobby.len(), 1);
    }

    #[test]
    fn test_join_random_picks_first_open_room() {
        let mut lobby = lobby(1);
        lobby.create_room(Some("a".into())).unwrap();
        lobby.create_room(Some("b".into())).unwrap();

        assert_eq!(lobby.join_random(VERSION).unwrap().room, "a");
        assert_eq!(lobby.join_random(VERSION).unwrap().room, "b");
        assert_eq!(lobby.join_random(VERSION), Err(LobbyError::NoRoomAvailable));
    }

    #[test]
    fn test_random_join_fallback_creates_one_room() {
        let mut lobby = lobby(2);

        let first = lobby.join_random_or_create(VERSION).unwrap();
        assert_eq!(lobby.len(), 1);
        let second = lobby.join_random_or_create(VERSION).unwrap();
        assert_eq!(second.room, first.room);
        assert_eq!(lobby.len(), 1);

        // Room full: exactly one more room
        let third = lobby.join_random_or_create(VERSION).unwrap();
        assert_ne!(third.room, first.room);
        assert_eq!(lobby.len(), 2);
        assert_eq!(third.grant.host, third.grant.participant);
    }

    #[test]
    fn test_join_or_create() {
        let mut lobby = lobby(4);
        let ticket = lobby.join_or_create("den", VERSION).unwrap();
        assert_eq!(ticket.room, "den");
        lobby.join_or_create("den", VERSION).unwrap();
        assert_eq!(lobby.room("den").unwrap().len(), 2);
        assert_eq!(lobby.len(), 1);
    }

    #[test]
    fn test_last_leave_destroys_room() {
        let mut lobby = lobby(4);
        let a = lobby.join_or_create("den", VERSION).unwrap();
        let b = lobby.join_or_create("den", VERSION).unwrap();

        let departure = lobby.leave("den", a.grant.participant).unwrap().unwrap();
        assert_eq!(departure.host, Some(b.grant.participant));
        assert!(lobby.room("den").is_some());

        lobby.leave("den", b.grant.participant).unwrap();
        assert!(lobby.room("den").is_none());
        assert_eq!(
            lobby.leave("den", 1),
            Err(LobbyError::RoomNotFound("den".into()))
        );
    }
}
