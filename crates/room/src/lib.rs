//! Dark Dungeon Room Edge
//!
//! A [`Room`] hosts one match. It owns:
//! - the session coordinator (membership, spawn points, ownership, round)
//! - the state channel (reliable-ordered messages and snapshot slots)
//! - one [`Peer`] per participant, each holding that participant's replica
//! - the command buffer that feeds each replica its per-tick commands
//!
//! The room itself is participant 0. Its replica owns the props, sees every
//! broadcast, and is the source of the baseline handed to late joiners.
//!
//! [`Lobby`] groups rooms and implements matchmaking on top.

#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod input_buffer;
pub mod lobby;
pub mod peer;
pub mod sequencer;
pub mod session;
pub mod transport;
pub mod validation;

use std::collections::BTreeMap;

use dungeon_sim::{
    AuthorityError, Command, Effect, EntityId, OrphanResolution, ParticipantId, ROOM_PARTICIPANT,
    Tick, Transform, World,
};
use dungeon_wire::{
    AuthorityMigrated, Body, EntityDespawned, EntitySpawned, JoinBaseline, JoinGrant,
    RoundEndReasonProto, RoundEnded, SnapshotProto, vec3_to_wire,
};
use glam::DVec3;
use tracing::{debug, info, warn};

use channel::{Recipients, SnapshotSlot, StateChannel};
use config::RoomConfig;
use coordinator::{Departure, JoinError, RoundEndReason, SessionCoordinator};
use input_buffer::CommandBuffer;
use peer::Peer;
use transport::TransportEvent;
use validation::{CommandResult, validate_command};

pub use lobby::{Lobby, LobbyError};

/// Upper bound on delivery passes per step. A hit settles in two: the
/// damage request, then the owner's health result.
pub const MAX_DELIVERY_PASSES: usize = 8;

// ============================================================================
// Join / Step Results
// ============================================================================

/// Everything a newly joined participant is handed.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTicket {
    pub room: String,
    pub grant: JoinGrant,
    pub baseline: JoinBaseline,
}

/// Summary of one [`Room::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub tick: Tick,
    /// Set on the step the round ended.
    pub round_end: Option<RoundEndReason>,
    /// Reliable frames handed to peers.
    pub delivered: usize,
    /// Reliable messages addressed to disconnected participants.
    pub dropped: usize,
}

// ============================================================================
// Room
// ============================================================================

pub struct Room {
    name: String,
    config: RoomConfig,
    tick: Tick,
    coordinator: SessionCoordinator,
    channel: StateChannel,
    /// Keyed by participant; includes the room's own peer.
    peers: BTreeMap<ParticipantId, Peer>,
    commands: CommandBuffer,
    next_participant: ParticipantId,
}

impl Room {
    /// Create an empty room. `config` must pass [`RoomConfig::validate`];
    /// [`Lobby::new`] checks it once for every room it creates.
    pub fn new(name: impl Into<String>, config: RoomConfig) -> Self {
        debug_assert!(config.validate().is_ok(), "room config not validated");
        let name = name.into();
        let mut channel = StateChannel::new();
        channel.connect(ROOM_PARTICIPANT);

        let mut peers = BTreeMap::new();
        let world = World::new(ROOM_PARTICIPANT, &config.world_config(), 0);
        peers.insert(
            ROOM_PARTICIPANT,
            Peer::new(world, config.max_pending_frames),
        );

        info!(room = %name, max_players = config.max_players, "room_created");

        Self {
            coordinator: SessionCoordinator::new(&config),
            commands: CommandBuffer::new(config.validation_config()),
            name,
            config,
            tick: 0,
            channel,
            peers,
            next_participant: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Next tick to be stepped.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    pub fn channel(&self) -> &StateChannel {
        &self.channel
    }

    pub fn peer(&self, participant: ParticipantId) -> Option<&Peer> {
        self.peers.get(&participant)
    }

    pub fn peer_mut(&mut self, participant: ParticipantId) -> Option<&mut Peer> {
        self.peers.get_mut(&participant)
    }

    /// The room's own replica.
    pub fn room_world(&self) -> Option<&World> {
        self.peer(ROOM_PARTICIPANT).map(Peer::world)
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.coordinator.participants()
    }

    pub fn host(&self) -> Option<ParticipantId> {
        self.coordinator.host()
    }

    pub fn len(&self) -> usize {
        self.coordinator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinator.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.coordinator.is_full()
    }

    /// True while the round runs and a seat is free.
    pub fn is_open(&self) -> bool {
        self.coordinator.accepts_joins()
    }

    pub fn round_end(&self) -> Option<RoundEndReason> {
        self.coordinator.round_end()
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Join with the next free participant id.
    pub fn join(&mut self) -> Result<JoinTicket, JoinError> {
        self.join_as(self.next_participant)
    }

    /// Join with a transport-assigned participant id.
    pub fn join_as(&mut self, participant: ParticipantId) -> Result<JoinTicket, JoinError> {
        if participant == ROOM_PARTICIPANT {
            return Err(JoinError::AlreadyJoined(participant));
        }
        let grant = self.coordinator.join(participant, self.tick)?;
        let transform = Transform::at(grant.spawn_position);

        let baseline = match self.admit(participant, grant.entity_id, transform) {
            Ok(baseline) => baseline,
            Err(err) => {
                self.coordinator.leave(participant);
                return Err(err.into());
            }
        };

        self.next_participant = self.next_participant.max(participant + 1);
        info!(
            room = %self.name,
            participant,
            entity = grant.entity_id,
            tick = self.tick,
            "room_joined"
        );

        Ok(JoinTicket {
            room: self.name.clone(),
            grant: JoinGrant {
                participant,
                entity_id: grant.entity_id,
                spawn_position: vec3_to_wire(grant.spawn_position),
                tick_rate_hz: grant.tick_rate_hz,
                host: grant.host,
            },
            baseline,
        })
    }

    /// Spawn the player in the room replica, announce it to everyone
    /// already present, then build the newcomer's replica from the baseline.
    fn admit(
        &mut self,
        participant: ParticipantId,
        entity_id: EntityId,
        transform: Transform,
    ) -> Result<JoinBaseline, AuthorityError> {
        let room_world = self.room_world_mut()?;
        room_world.spawn_player(entity_id, participant, transform)?;
        let spawned = room_world
            .entity_snapshot(entity_id)
            .ok_or(AuthorityError::NotRegistered { entity_id })?;
        let entities = room_world.baseline();
        let digest = room_world.state_digest();

        // Sent before the newcomer connects, so only existing members get it
        self.channel.send(
            ROOM_PARTICIPANT,
            Recipients::Others,
            Body::EntitySpawned(EntitySpawned {
                entity: Some((&spawned).into()),
            }),
        );

        let mut world = World::new(participant, &self.config.world_config(), self.tick);
        for snapshot in &entities {
            world.insert_snapshot(snapshot)?;
        }
        debug_assert_eq!(world.state_digest(), digest);

        self.peers
            .insert(participant, Peer::new(world, self.config.max_pending_frames));
        self.channel.connect(participant);
        self.flush();

        Ok(JoinBaseline::from_entities(self.tick, &entities, digest))
    }

    /// Remove a participant, resolving its entities per the orphan policy.
    pub fn leave(&mut self, participant: ParticipantId) -> Option<Departure> {
        let departure = self.coordinator.leave(participant)?;

        self.peers.remove(&participant);
        let discarded = self.channel.disconnect(participant);
        self.commands.forget(participant);
        for peer in self.peers.values_mut() {
            peer.forget_sender(participant);
        }

        for resolution in &departure.resolutions {
            self.announce_orphan(*resolution);
        }
        self.flush();

        info!(
            room = %self.name,
            participant,
            discarded,
            host = ?departure.host,
            "room_left"
        );
        Some(departure)
    }

    fn announce_orphan(&mut self, resolution: OrphanResolution) {
        let body = match resolution {
            OrphanResolution::Despawn(entity_id) => {
                if let Ok(world) = self.room_world_mut() {
                    world.despawn(entity_id);
                }
                Body::EntityDespawned(EntityDespawned { entity_id })
            }
            OrphanResolution::MigrateTo {
                entity_id,
                new_owner,
            } => {
                let migrated = self
                    .room_world_mut()
                    .and_then(|world| world.migrate(entity_id, new_owner));
                if let Err(err) = migrated {
                    warn!(room = %self.name, error = %err, "room_migration_failed");
                }
                Body::AuthorityMigrated(AuthorityMigrated {
                    entity_id,
                    new_owner,
                })
            }
        };
        let entity_id = match resolution {
            OrphanResolution::Despawn(entity_id) | OrphanResolution::MigrateTo { entity_id, .. } => {
                entity_id
            }
        };
        self.channel.remove_slot(entity_id);
        self.channel.send(ROOM_PARTICIPANT, Recipients::Others, body);
    }

    /// Place a non-damageable prop owned by the room.
    pub fn spawn_prop(&mut self, position: DVec3) -> Result<EntityId, AuthorityError> {
        let entity_id = self.coordinator.allocate_prop()?;
        let room_world = self.room_world_mut()?;
        room_world.spawn_prop(entity_id, position)?;
        let snapshot = room_world
            .entity_snapshot(entity_id)
            .ok_or(AuthorityError::NotRegistered { entity_id })?;

        self.channel.send(
            ROOM_PARTICIPANT,
            Recipients::Others,
            Body::EntitySpawned(EntitySpawned {
                entity: Some((&snapshot).into()),
            }),
        );
        self.flush();
        debug!(room = %self.name, entity = entity_id, ?position, "prop_spawned");
        Ok(entity_id)
    }

    fn room_world_mut(&mut self) -> Result<&mut World, AuthorityError> {
        self.peers
            .get_mut(&ROOM_PARTICIPANT)
            .map(Peer::world_mut)
            .ok_or(AuthorityError::NotRegistered { entity_id: 0 })
    }

    /// React to a transport lifecycle event.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Result<(), JoinError> {
        debug!(room = %self.name, kind = event.kind(), "transport_event");
        match event {
            TransportEvent::Connected => {
                info!(room = %self.name, "transport_connected");
            }
            TransportEvent::JoinedRoom { participant }
            | TransportEvent::PlayerEntered { participant } => {
                if !self.coordinator.is_member(participant) {
                    self.join_as(participant)?;
                }
            }
            TransportEvent::PlayerLeft { participant } => {
                self.leave(participant);
            }
            TransportEvent::Disconnected {
                participant,
                reason,
            } => {
                warn!(room = %self.name, participant, %reason, "participant_disconnected");
                self.leave(participant);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Queue a command for `participant` to run at `tick`.
    pub fn submit_command(
        &mut self,
        participant: ParticipantId,
        tick: Tick,
        command: Command,
    ) -> CommandResult {
        if !self.coordinator.is_member(participant) {
            return CommandResult::DroppedUnknownParticipant;
        }
        let result = validate_command(&command, tick, self.tick, &mut self.commands, participant);
        if !result.is_accepted() {
            debug!(participant, tick, ?result, "command_dropped");
        }
        result
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Run one tick of the room.
    pub fn step(&mut self) -> StepReport {
        let tick = self.tick;
        let mut report = StepReport {
            tick,
            ..StepReport::default()
        };

        let participants: Vec<ParticipantId> = self.peers.keys().copied().collect();
        for participant in participants {
            let commands = self.commands.take(participant, tick);
            let Some(peer) = self.peers.get_mut(&participant) else {
                continue;
            };
            let effects = peer.world_mut().advance(tick, &commands);
            self.route(participant, effects, &mut report);
        }
        self.commands.evict_before(tick + 1);

        self.deliver(&mut report);

        if (tick + 1) % self.config.snapshot_interval_ticks.max(1) == 0 {
            self.exchange_snapshots();
        }

        if let Some(reason) = self.coordinator.advance_round() {
            self.announce_round_end(reason, &mut report);
            self.deliver(&mut report);
        }

        self.tick += 1;
        report
    }

    /// Send a participant's effects on the channel.
    fn route(&mut self, sender: ParticipantId, effects: Vec<Effect>, report: &mut StepReport) {
        for effect in effects {
            let recipients = match &effect {
                Effect::AttackTriggered { .. } => Recipients::Others,
                Effect::DamageRequested { owner, .. } => Recipients::Only(*owner),
                Effect::HealthChanged { .. } | Effect::Died { .. } | Effect::Respawned { .. } => {
                    Recipients::All
                }
            };
            let sent = self.channel.send(sender, recipients, Body::from(&effect));
            report.dropped += sent.dropped;

            if let Effect::Died { victim, killer } = effect
                && let Some(reason) = self.coordinator.record_death(victim, killer)
            {
                self.announce_round_end(reason, report);
            }
        }
    }

    /// Hand queued frames to peers until nothing is left in flight.
    fn deliver(&mut self, report: &mut StepReport) {
        for _ in 0..MAX_DELIVERY_PASSES {
            if self.channel.pending_frames() == 0 {
                return;
            }
            let participants: Vec<ParticipantId> = self.peers.keys().copied().collect();
            for participant in participants {
                let frames = self.channel.take_inbound(participant);
                if frames.is_empty() {
                    continue;
                }
                report.delivered += frames.len();
                let Some(peer) = self.peers.get_mut(&participant) else {
                    continue;
                };
                let effects = peer.receive(frames);
                self.route(participant, effects, report);
            }
        }
        if self.channel.pending_frames() > 0 {
            warn!(
                room = %self.name,
                pending = self.channel.pending_frames(),
                "delivery_not_quiescent"
            );
        }
    }

    /// Deliver outside of a step (after joins, leaves and prop spawns).
    fn flush(&mut self) {
        let mut report = StepReport::default();
        self.deliver(&mut report);
    }

    /// Every peer publishes its owned entities, then every peer adopts the
    /// slots for entities it does not own.
    fn exchange_snapshots(&mut self) {
        for peer in self.peers.values() {
            let owned = peer.world().owned_snapshots();
            if owned.is_empty() {
                continue;
            }
            self.channel.publish_snapshot(SnapshotProto::from_entities(
                peer.participant(),
                peer.world().tick(),
                &owned,
            ));
        }

        let slots: Vec<SnapshotSlot> = self.channel.slots().cloned().collect();
        for peer in self.peers.values_mut() {
            for slot in &slots {
                peer.apply_snapshot_slot(slot);
            }
        }
    }

    fn announce_round_end(&mut self, reason: RoundEndReason, report: &mut StepReport) {
        let proto = match reason {
            RoundEndReason::TimeExpired => RoundEndReasonProto::TimeExpired,
            RoundEndReason::ScoreReached { .. } => RoundEndReasonProto::ScoreReached,
        };
        let sent = self.channel.send(
            ROOM_PARTICIPANT,
            Recipients::All,
            Body::RoundEnded(RoundEnded {
                reason: proto as i32,
                winner: reason.winner(),
            }),
        );
        report.dropped += sent.dropped;
        report.round_end = Some(reason);
    }

    /// Start a new round in place: timer and scores reset, room reopened.
    pub fn restart_round(&mut self) {
        self.coordinator.restart_round();
        info!(room = %self.name, round = self.coordinator.round_number(), "room_round_restarted");
    }
}

#[cfg(test)]
mod tests {
    use dungeon_sim::{OrphanPolicy, WeaponSpec};

    use super::*;

    fn config() -> RoomConfig {
        RoomConfig::default()
    }

    /// Put participant 1 at the origin facing +Z and participant 2 one unit
    /// in front of it, then step until a snapshot has spread the positions.
    fn face_off(room: &mut Room) {
        let tick = room.tick();
        let moves = [
            (1, 1, DVec3::ZERO),
            (2, 2, DVec3::new(0.0, 0.0, 1.0)),
        ];
        for (participant, entity_id, position) in moves {
            let result = room.submit_command(
                participant,
                tick,
                Command::Move {
                    entity_id,
                    transform: Transform::at(position),
                },
            );
            assert!(result.is_accepted());
        }
        let interval = room.config().snapshot_interval_ticks;
        while (room.tick() % interval) != 0 || room.tick() == tick {
            room.step();
        }
    }

    fn health_of(room: &Room, viewer: ParticipantId, entity_id: EntityId) -> f64 {
        room.peer(viewer)
            .unwrap()
            .world()
            .health(entity_id)
            .unwrap()
            .current()
    }

    fn digests(room: &Room) -> Vec<u64> {
        room.peers.values().map(|p| p.world().state_digest()).collect()
    }

    // ========================================================================
    // Join / Leave
    // ========================================================================

    #[test]
    fn test_join_baseline_matches_replica() {
        let mut room = Room::new("r", config());
        room.spawn_prop(DVec3::new(5.0, 0.0, 5.0)).unwrap();
        room.join().unwrap();
        let ticket = room.join().unwrap();

        assert_eq!(ticket.room, "r");
        assert_eq!(ticket.grant.participant, 2);
        assert_eq!(ticket.grant.host, 1);
        assert_eq!(ticket.baseline.entities.len(), 3);
        assert_eq!(
            ticket.baseline.digest,
            room.peer(2).unwrap().world().state_digest()
        );

        // Earlier members learned about the newcomer
        let first = room.peer(1).unwrap().world();
        assert_eq!(ticket.grant.entity_id, 3);
        assert_eq!(first.entity(3).unwrap().owner(), 2);
        assert_eq!(first.entity(2).unwrap().owner(), 1);
        assert_eq!(first.entity(1).unwrap().owner(), ROOM_PARTICIPANT);
    }

    #[test]
    fn test_all_replicas_agree_after_join() {
        let mut room = Room::new("r", config());
        for _ in 0..3 {
            room.join().unwrap();
        }
        let all = digests(&room);
        assert!(all.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_room_full() {
        let mut room = Room::new(
            "r",
            RoomConfig {
                max_players: 2,
                ..config()
            },
        );
        room.join().unwrap();
        room.join().unwrap();
        assert_eq!(room.join(), Err(JoinError::RoomFull { max: 2 }));
        assert!(!room.is_open());
    }

    #[test]
    fn test_leave_despawns_orphans() {
        let mut room = Room::new("r", config());
        room.join().unwrap();
        room.join().unwrap();
        room.join().unwrap();

        let departure = room.leave(1).unwrap();
        assert_eq!(departure.host, Some(2));
        assert_eq!(room.host(), Some(2));

        for viewer in [0, 2, 3] {
            assert!(room.peer(viewer).unwrap().world().entity(1).is_none());
        }
        assert!(room.peer(1).is_none());
        assert!(room.leave(1).is_none());
    }

    #[test]
    fn test_leave_migrates_orphans_to_host() {
        let mut room = Room::new(
            "r",
            RoomConfig {
                orphan_policy: OrphanPolicy::MigrateToHost,
                ..config()
            },
        );
        room.join().unwrap();
        room.join().unwrap();
        room.leave(2).unwrap();

        let host_world = room.peer(1).unwrap().world();
        assert!(host_world.is_authoritative(2));
        assert_eq!(
            room.room_world().unwrap().authority().owner_of(2),
            Some(1)
        );

        // The host now drives the migrated entity
        let result = room.submit_command(1, room.tick(), Command::Attack { entity_id: 2 });
        assert!(result.is_accepted());
        room.step();
        assert!(room.peer(1).unwrap().world().entity(2).unwrap().attack().is_attacking());
    }

    #[test]
    fn test_host_respawns_migrated_dead_entity() {
        let mut room = Room::new(
            "r",
            RoomConfig {
                orphan_policy: OrphanPolicy::MigrateToHost,
                win_score: 0,
                weapon: WeaponSpec {
                    damage: 100.0,
                    ..WeaponSpec::default()
                },
                ..config()
            },
        );
        room.join().unwrap();
        room.join().unwrap();
        face_off(&mut room);

        room.submit_command(1, room.tick(), Command::Attack { entity_id: 1 });
        for _ in 0..20 {
            room.step();
        }
        assert!(!room.peer(1).unwrap().world().health(2).unwrap().is_alive());

        // Owner leaves while its entity is dead
        room.leave(2).unwrap();
        for _ in 0..300 {
            room.step();
        }

        for viewer in [ROOM_PARTICIPANT, 1] {
            let health = room.peer(viewer).unwrap().world().health(2).unwrap();
            assert!(health.is_alive(), "viewer {viewer} still sees entity 2 dead");
            assert_eq!(health_of(&room, viewer, 2), 100.0);
        }
    }

    #[test]
    fn test_transport_events_drive_membership() {
        let mut room = Room::new("r", config());
        room.handle_transport_event(TransportEvent::Connected).unwrap();
        room.handle_transport_event(TransportEvent::PlayerEntered { participant: 7 })
            .unwrap();
        // Repeated enter for a member is a no-op
        room.handle_transport_event(TransportEvent::JoinedRoom { participant: 7 })
            .unwrap();
        assert_eq!(room.participants(), vec![7]);

        room.handle_transport_event(TransportEvent::Disconnected {
            participant: 7,
            reason: "timeout".to_string(),
        })
        .unwrap();
        assert!(room.is_empty());

        // Ids are never reused
        assert_eq!(room.join().unwrap().grant.participant, 8);
    }

    // ========================================================================
    // Commands
    // ========================================================================

    #[test]
    fn test_submit_command_validation() {
        let mut room = Room::new("r", config());
        room.join().unwrap();
        room.step();

        assert_eq!(
            room.submit_command(9, 1, Command::Attack { entity_id: 1 }),
            CommandResult::DroppedUnknownParticipant
        );
        assert_eq!(
            room.submit_command(1, 0, Command::Attack { entity_id: 1 }),
            CommandResult::DroppedLate {
                tick: 0,
                current: 1
            }
        );
        assert!(room.submit_command(1, 1, Command::Attack { entity_id: 1 }).is_accepted());
    }

    // ========================================================================
    // Combat
    // ========================================================================

    #[test]
    fn test_hit_replicates_to_every_participant() {
        let mut room = Room::new("r", config());
        room.join().unwrap();
        room.join().unwrap();
        face_off(&mut room);

        // Attack every tick; the cooldown lets only one swing through
        for _ in 0..40 {
            let tick = room.tick();
            room.submit_command(1, tick, Command::Attack { entity_id: 1 });
            room.step();
        }

        for viewer in [0, 1, 2] {
            assert_eq!(health_of(&room, viewer, 2), 75.0);
        }
        assert_eq!(room.peer(2).unwrap().stats().attack_feedback, 1);
        assert_eq!(room.peer(1).unwrap().stats().attack_feedback, 0);
    }

    #[test]
    fn test_replicas_converge_after_snapshot() {
        let mut room = Room::new("r", config());
        room.join().unwrap();
        room.join().unwrap();
        face_off(&mut room);
        room.submit_command(1, room.tick(), Command::Attack { entity_id: 1 });
        face_off(&mut room);
        face_off(&mut room);

        let all = digests(&room);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_kill_reaches_win_score_and_closes_room() {
        let mut room = Room::new(
            "r",
            RoomConfig {
                win_score: 1,
                weapon: WeaponSpec {
                    damage: 100.0,
                    ..WeaponSpec::default()
                },
                ..config()
            },
        );
        room.join().unwrap();
        room.join().unwrap();
        face_off(&mut room);

        room.submit_command(1, room.tick(), Command::Attack { entity_id: 1 });
        let mut end = None;
        for _ in 0..20 {
            let report = room.step();
            if report.round_end.is_some() {
                end = report.round_end;
            }
        }

        assert_eq!(end, Some(RoundEndReason::ScoreReached { winner: 1 }));
        assert_eq!(room.coordinator().score(1), Some(1));
        assert!(!room.peer(1).unwrap().world().health(2).unwrap().is_alive());
        let announced = room.peer(2).unwrap().last_round_end().unwrap();
        assert_eq!(announced.winner, Some(1));
        assert_eq!(room.join(), Err(JoinError::RoomClosed));
    }

    #[test]
    fn test_round_ends_on_time() {
        let mut room = Room::new(
            "r",
            RoomConfig {
                round_duration_secs: 0.1,
                ..config()
            },
        );
        room.join().unwrap();

        let ends: Vec<_> = (0..20).filter_map(|_| room.step().round_end).collect();
        assert_eq!(ends, vec![RoundEndReason::TimeExpired]);

        let announced = room.peer(1).unwrap().last_round_end().unwrap();
        assert_eq!(announced.reason, RoundEndReasonProto::TimeExpired as i32);
        assert_eq!(announced.winner, None);

        room.restart_round();
        assert!(room.is_open());
    }

    #[test]
    fn test_prop_replicated_and_owned_by_room() {
        let mut room = Room::new("r", config());
        room.join().unwrap();
        let prop = room.spawn_prop(DVec3::new(1.0, 0.0, 1.0)).unwrap();

        let replica = room.peer(1).unwrap().world();
        let entity = replica.entity(prop).unwrap();
        assert_eq!(entity.owner(), ROOM_PARTICIPANT);
        assert!(entity.health().is_none());
        assert!(room.room_world().unwrap().is_authoritative(prop));
    }
}
