//! A participant's replica plus its receive path.
//!
//! Inbound frames are decoded, put back in per-sender order, validated
//! against the replica's authority view, and dispatched by message kind.

use dungeon_sim::{DamageSource, Effect, EntitySnapshot, ParticipantId, World};
use dungeon_wire::{Body, ReliableEnvelope, RoundEnded, decode_envelope};
use tracing::{debug, warn};

use crate::channel::SnapshotSlot;
use crate::sequencer::{PushResult, ReliableSequencer};
use crate::validation::validate_message;

/// Per-peer receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub applied: u64,
    pub rejected: u64,
    pub undecodable: u64,
    pub duplicates: u64,
    /// Frames this peer sent to itself; the local world already has them.
    pub loopback: u64,
    pub attack_feedback: u64,
    pub snapshots_applied: u64,
}

#[derive(Debug)]
pub struct Peer {
    world: World,
    sequencer: ReliableSequencer,
    stats: PeerStats,
    last_round_end: Option<RoundEnded>,
}

impl Peer {
    pub fn new(world: World, max_pending_frames: usize) -> Self {
        Self {
            world,
            sequencer: ReliableSequencer::new(max_pending_frames),
            stats: PeerStats::default(),
            last_round_end: None,
        }
    }

    pub fn participant(&self) -> ParticipantId {
        self.world.local()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn stats(&self) -> PeerStats {
        self.stats
    }

    /// Most recent round-end announcement received.
    pub fn last_round_end(&self) -> Option<&RoundEnded> {
        self.last_round_end.as_ref()
    }

    /// Process inbound frames. Returns the effects the local world produced
    /// in response (health results of damage requests).
    pub fn receive(&mut self, frames: Vec<Vec<u8>>) -> Vec<Effect> {
        let local = self.participant();
        for frame in frames {
            let envelope = match decode_envelope(&frame) {
                Ok(envelope) => envelope,
                Err(err) => {
                    self.stats.undecodable += 1;
                    warn!(participant = local, error = %err, "frame_undecodable");
                    continue;
                }
            };
            if envelope.sender == local {
                self.stats.loopback += 1;
                continue;
            }
            match self.sequencer.push(envelope) {
                PushResult::Accepted { .. } => {}
                PushResult::Duplicate => self.stats.duplicates += 1,
                PushResult::TooFarAhead { seq, next } => {
                    self.stats.rejected += 1;
                    warn!(participant = local, seq, next, "frame_outside_window");
                }
            }
        }

        for envelope in self.sequencer.drain_ready() {
            self.dispatch(envelope);
        }
        self.world.drain_effects()
    }

    fn dispatch(&mut self, envelope: ReliableEnvelope) {
        let local = self.participant();
        let sender = envelope.sender;
        let Some(body) = envelope.body else {
            return;
        };

        let verdict = validate_message(&self.world, sender, &body);
        if !verdict.is_accepted() {
            self.stats.rejected += 1;
            warn!(
                participant = local,
                sender,
                kind = body.kind(),
                ?verdict,
                "message_rejected"
            );
            return;
        }
        self.stats.applied += 1;

        match body {
            Body::AttackTriggered(msg) => {
                self.stats.attack_feedback += 1;
                debug!(participant = local, attacker = msg.attacker, "attack_feedback");
            }
            Body::DamageRequest(msg) => {
                let source = msg.source.map(DamageSource::from);
                if let Err(refusal) = self.world.apply_damage(msg.target, msg.amount, source) {
                    debug!(participant = local, target = msg.target, ?refusal, "damage_refused");
                }
            }
            Body::HealthChanged(msg) => {
                self.world
                    .apply_health_update(msg.target, msg.current, msg.max, msg.alive);
            }
            Body::Died(msg) => {
                self.world
                    .apply_death(msg.victim, msg.killer.map(DamageSource::from));
            }
            Body::Respawned(msg) => match msg.transform() {
                Ok(transform) => {
                    self.world.apply_respawn(msg.entity_id, transform);
                }
                Err(err) => {
                    warn!(participant = local, entity = msg.entity_id, error = %err, "respawn_malformed");
                }
            },
            Body::EntitySpawned(msg) => {
                let Some(proto) = msg.entity else {
                    warn!(participant = local, "spawn_without_entity");
                    return;
                };
                if self.world.entity(proto.entity_id).is_some() {
                    return;
                }
                match EntitySnapshot::try_from(&proto) {
                    Ok(snapshot) => {
                        if let Err(err) = self.world.insert_snapshot(&snapshot) {
                            warn!(participant = local, error = %err, "spawn_rejected");
                        }
                    }
                    Err(err) => {
                        warn!(participant = local, entity = proto.entity_id, error = %err, "spawn_malformed");
                    }
                }
            }
            Body::EntityDespawned(msg) => {
                self.world.despawn(msg.entity_id);
            }
            Body::AuthorityMigrated(msg) => {
                if let Err(err) = self.world.migrate(msg.entity_id, msg.new_owner) {
                    warn!(participant = local, error = %err, "migration_rejected");
                }
            }
            Body::RoundEnded(msg) => {
                debug!(participant = local, winner = ?msg.winner, "round_end_received");
                self.last_round_end = Some(msg);
            }
        }
    }

    /// Adopt a snapshot slot for an entity owned elsewhere. The slot is
    /// ignored unless its sender is the entity's current owner.
    pub fn apply_snapshot_slot(&mut self, slot: &SnapshotSlot) -> bool {
        let entity_id = slot.entity.entity_id;
        if slot.sender == self.participant() {
            return false;
        }
        if self.world.authority().owner_of(entity_id) != Some(slot.sender)
            || slot.entity.owner != slot.sender
        {
            debug!(
                participant = self.participant(),
                entity = entity_id,
                sender = slot.sender,
                "snapshot_from_non_owner"
            );
            return false;
        }
        let snapshot = match EntitySnapshot::try_from(&slot.entity) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(participant = self.participant(), entity = entity_id, error = %err, "snapshot_malformed");
                return false;
            }
        };
        let applied = self.world.apply_snapshot(&snapshot);
        if applied {
            self.stats.snapshots_applied += 1;
        }
        applied
    }

    /// Drop reassembly state for a departed sender.
    pub fn forget_sender(&mut self, sender: ParticipantId) {
        self.sequencer.forget(sender);
    }
}

#[cfg(test)]
mod tests {
    use dungeon_sim::{EntityId, Transform, WorldConfig};
    use dungeon_wire::{
        AttackTriggered, DamageRequest, DamageSourceProto, HealthChanged, SnapshotProto,
        encode_envelope,
    };

    use super::*;

    fn peer(local: ParticipantId) -> Peer {
        let mut world = World::new(local, &WorldConfig::default(), 0);
        world.spawn_player(1, 1, Transform::default()).unwrap();
        world.spawn_player(2, 2, Transform::default()).unwrap();
        Peer::new(world, 64)
    }

    fn frame(sender: ParticipantId, seq: u64, body: Body) -> Vec<u8> {
        encode_envelope(&ReliableEnvelope {
            sender,
            seq,
            body: Some(body),
        })
    }

    fn health_changed(target: EntityId, current: f64) -> Body {
        Body::HealthChanged(HealthChanged {
            target,
            current,
            max: 100.0,
            alive: current > 0.0,
        })
    }

    // ========================================================================
    // Reliable
    // ========================================================================

    #[test]
    fn test_owner_update_applied_in_order() {
        let mut peer = peer(2);
        // seq 1 arrives first and waits for seq 0
        peer.receive(vec![frame(1, 1, health_changed(1, 50.0))]);
        assert_eq!(peer.world().health(1).unwrap().current(), 100.0);

        peer.receive(vec![frame(1, 0, health_changed(1, 75.0))]);
        assert_eq!(peer.world().health(1).unwrap().current(), 50.0);
        assert_eq!(peer.stats().applied, 2);
    }

    #[test]
    fn test_duplicate_frames_dropped() {
        let mut peer = peer(2);
        let bytes = frame(1, 0, health_changed(1, 75.0));
        peer.receive(vec![bytes.clone(), bytes]);
        assert_eq!(peer.stats().applied, 1);
        assert_eq!(peer.stats().duplicates, 1);
    }

    #[test]
    fn test_non_owner_update_rejected() {
        let mut peer = peer(2);
        peer.receive(vec![frame(3, 0, health_changed(1, 10.0))]);
        assert_eq!(peer.world().health(1).unwrap().current(), 100.0);
        assert_eq!(peer.stats().rejected, 1);
    }

    #[test]
    fn test_undecodable_and_loopback_frames() {
        let mut peer = peer(2);
        peer.receive(vec![vec![0xff, 0xff, 0xff], frame(2, 0, health_changed(2, 1.0))]);
        assert_eq!(peer.stats().undecodable, 1);
        assert_eq!(peer.stats().loopback, 1);
        assert_eq!(peer.world().health(2).unwrap().current(), 100.0);
    }

    #[test]
    fn test_damage_request_applied_by_owner() {
        let mut peer = peer(2);
        let request = Body::DamageRequest(DamageRequest {
            target: 2,
            amount: 25.0,
            source: Some(DamageSourceProto {
                entity_id: 1,
                participant: 1,
            }),
        });

        let effects = peer.receive(vec![frame(1, 0, request)]);

        assert_eq!(peer.world().health(2).unwrap().current(), 75.0);
        assert_eq!(
            effects,
            vec![Effect::HealthChanged {
                target: 2,
                current: 75.0,
                max: 100.0,
                alive: true
            }]
        );
    }

    #[test]
    fn test_attack_feedback_counted() {
        let mut peer = peer(2);
        let body = Body::AttackTriggered(AttackTriggered { attacker: 1 });
        let effects = peer.receive(vec![frame(1, 0, body)]);
        assert!(effects.is_empty());
        assert_eq!(peer.stats().attack_feedback, 1);
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    fn slot(sender: ParticipantId, entity_id: EntityId, current: f64) -> SnapshotSlot {
        let mut owner_world = World::new(sender, &WorldConfig::default(), 0);
        owner_world
            .spawn_player(entity_id, sender, Transform::default())
            .unwrap();
        let mut proto =
            SnapshotProto::from_entities(sender, 6, &owner_world.owned_snapshots()).entities;
        let mut entity = proto.remove(0);
        if let Some(health) = entity.health.as_mut() {
            health.current = current;
        }
        SnapshotSlot {
            tick: 6,
            sender,
            entity,
        }
    }

    #[test]
    fn test_snapshot_from_owner_heals_missed_update() {
        let mut peer = peer(2);
        assert!(peer.apply_snapshot_slot(&slot(1, 1, 40.0)));
        assert_eq!(peer.world().health(1).unwrap().current(), 40.0);
        assert_eq!(peer.stats().snapshots_applied, 1);
    }

    #[test]
    fn test_snapshot_from_non_owner_ignored() {
        let mut peer = peer(2);
        let mut forged = slot(1, 1, 40.0);
        forged.sender = 3;
        assert!(!peer.apply_snapshot_slot(&forged));
        // Own entities are never overwritten
        assert!(!peer.apply_snapshot_slot(&slot(2, 2, 10.0)));
        assert_eq!(peer.world().health(2).unwrap().current(), 100.0);
    }
}
