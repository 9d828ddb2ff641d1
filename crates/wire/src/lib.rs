//! Dark Dungeon Wire Protocol Types
//!
//! Protobuf messages carried by the state channel. Every participant's
//! peer and the room coordinator encode and decode through this crate.
//!
//! # Message Categories
//!
//! - **Reliable** (ordered per sender/recipient pair): [`ReliableEnvelope`]
//!   wrapping one typed [`reliable_envelope::Body`]
//! - **Snapshot** (latest tick wins per entity): [`SnapshotProto`]
//! - **Join**: [`JoinGrant`] and [`JoinBaseline`], sent once per join

#![deny(unsafe_code)]

use dungeon_sim::{
    DamageSource, Effect, EntityId, EntitySnapshot, HealthSnapshot, ParticipantId, Tick,
    Transform,
};
use glam::DVec3;
use prost::Message;
use thiserror::Error;

/// Sequence number of a reliable message within one (sender, recipient) pair.
pub type Seq = u64;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("reliable envelope has no body")]
    MissingBody,

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` must hold 3 components, got {len}")]
    BadVector { field: &'static str, len: usize },

    #[error("unknown enum value {value} for `{field}`")]
    UnknownEnum { field: &'static str, value: i32 },
}

// ============================================================================
// Shared Messages
// ============================================================================

/// Identity of whoever dealt a blow.
#[derive(Clone, PartialEq, Message)]
pub struct DamageSourceProto {
    #[prost(uint64, tag = "1")]
    pub entity_id: EntityId,

    #[prost(uint32, tag = "2")]
    pub participant: ParticipantId,
}

/// Replicated health values.
#[derive(Clone, PartialEq, Message)]
pub struct HealthProto {
    #[prost(double, tag = "1")]
    pub current: f64,

    #[prost(double, tag = "2")]
    pub max: f64,

    #[prost(bool, tag = "3")]
    pub alive: bool,
}

/// Entity state embedded in snapshots, baselines, and spawn announcements.
#[derive(Clone, PartialEq, Message)]
pub struct EntitySnapshotProto {
    #[prost(uint64, tag = "1")]
    pub entity_id: EntityId,

    #[prost(uint32, tag = "2")]
    pub owner: ParticipantId,

    /// Position [x, y, z].
    #[prost(double, repeated, tag = "3")]
    pub position: Vec<f64>,

    /// Unit facing [x, y, z].
    #[prost(double, repeated, tag = "4")]
    pub forward: Vec<f64>,

    /// Absent for props.
    #[prost(message, optional, tag = "5")]
    pub health: Option<HealthProto>,
}

// ============================================================================
// Reliable Messages
// ============================================================================

/// A swing started. Feedback only; carries no damage.
#[derive(Clone, PartialEq, Message)]
pub struct AttackTriggered {
    #[prost(uint64, tag = "1")]
    pub attacker: EntityId,
}

/// Sent only to the target's owner, who performs the arithmetic.
#[derive(Clone, PartialEq, Message)]
pub struct DamageRequest {
    #[prost(uint64, tag = "1")]
    pub target: EntityId,

    #[prost(double, tag = "2")]
    pub amount: f64,

    #[prost(message, optional, tag = "3")]
    pub source: Option<DamageSourceProto>,
}

/// Authoritative health result, broadcast by the owner.
#[derive(Clone, PartialEq, Message)]
pub struct HealthChanged {
    #[prost(uint64, tag = "1")]
    pub target: EntityId,

    #[prost(double, tag = "2")]
    pub current: f64,

    #[prost(double, tag = "3")]
    pub max: f64,

    #[prost(bool, tag = "4")]
    pub alive: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct Died {
    #[prost(uint64, tag = "1")]
    pub victim: EntityId,

    #[prost(message, optional, tag = "2")]
    pub killer: Option<DamageSourceProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Respawned {
    #[prost(uint64, tag = "1")]
    pub entity_id: EntityId,

    #[prost(double, repeated, tag = "2")]
    pub position: Vec<f64>,

    #[prost(double, repeated, tag = "3")]
    pub forward: Vec<f64>,
}

/// Coordinator announcement of a new entity.
#[derive(Clone, PartialEq, Message)]
pub struct EntitySpawned {
    #[prost(message, optional, tag = "1")]
    pub entity: Option<EntitySnapshotProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EntityDespawned {
    #[prost(uint64, tag = "1")]
    pub entity_id: EntityId,
}

/// Coordinator announcement of an ownership change.
#[derive(Clone, PartialEq, Message)]
pub struct AuthorityMigrated {
    #[prost(uint64, tag = "1")]
    pub entity_id: EntityId,

    #[prost(uint32, tag = "2")]
    pub new_owner: ParticipantId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RoundEndReasonProto {
    Unspecified = 0,
    TimeExpired = 1,
    ScoreReached = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct RoundEnded {
    #[prost(enumeration = "RoundEndReasonProto", tag = "1")]
    pub reason: i32,

    /// Set when a participant reached the win score.
    #[prost(uint32, optional, tag = "2")]
    pub winner: Option<ParticipantId>,
}

/// One reliable frame on the state channel.
#[derive(Clone, PartialEq, Message)]
pub struct ReliableEnvelope {
    #[prost(uint32, tag = "1")]
    pub sender: ParticipantId,

    #[prost(uint64, tag = "2")]
    pub seq: Seq,

    #[prost(
        oneof = "reliable_envelope::Body",
        tags = "3, 4, 5, 6, 7, 8, 9, 10, 11"
    )]
    pub body: Option<reliable_envelope::Body>,
}

pub mod reliable_envelope {
    /// Typed reliable message, dispatched by kind on receipt.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "3")]
        AttackTriggered(super::AttackTriggered),
        #[prost(message, tag = "4")]
        DamageRequest(super::DamageRequest),
        #[prost(message, tag = "5")]
        HealthChanged(super::HealthChanged),
        #[prost(message, tag = "6")]
        Died(super::Died),
        #[prost(message, tag = "7")]
        Respawned(super::Respawned),
        #[prost(message, tag = "8")]
        EntitySpawned(super::EntitySpawned),
        #[prost(message, tag = "9")]
        EntityDespawned(super::EntityDespawned),
        #[prost(message, tag = "10")]
        AuthorityMigrated(super::AuthorityMigrated),
        #[prost(message, tag = "11")]
        RoundEnded(super::RoundEnded),
    }

    impl Body {
        /// Short name for logs.
        pub fn kind(&self) -> &'static str {
            match self {
                Self::AttackTriggered(_) => "attack_triggered",
                Self::DamageRequest(_) => "damage_request",
                Self::HealthChanged(_) => "health_changed",
                Self::Died(_) => "died",
                Self::Respawned(_) => "respawned",
                Self::EntitySpawned(_) => "entity_spawned",
                Self::EntityDespawned(_) => "entity_despawned",
                Self::AuthorityMigrated(_) => "authority_migrated",
                Self::RoundEnded(_) => "round_ended",
            }
        }
    }
}

pub use reliable_envelope::Body;

// ============================================================================
// Snapshot & Join Messages
// ============================================================================

/// Periodic state of the entities one participant owns.
#[derive(Clone, PartialEq, Message)]
pub struct SnapshotProto {
    #[prost(uint32, tag = "1")]
    pub sender: ParticipantId,

    #[prost(uint64, tag = "2")]
    pub tick: Tick,

    /// Ordered by entity_id ascending.
    #[prost(message, repeated, tag = "3")]
    pub entities: Vec<EntitySnapshotProto>,
}

/// Reply to a successful join.
#[derive(Clone, PartialEq, Message)]
pub struct JoinGrant {
    #[prost(uint32, tag = "1")]
    pub participant: ParticipantId,

    /// Entity the participant controls.
    #[prost(uint64, tag = "2")]
    pub entity_id: EntityId,

    #[prost(double, repeated, tag = "3")]
    pub spawn_position: Vec<f64>,

    #[prost(uint32, tag = "4")]
    pub tick_rate_hz: u32,

    /// Current host (earliest-joined participant).
    #[prost(uint32, tag = "5")]
    pub host: ParticipantId,
}

/// Full room state handed to a joining participant.
#[derive(Clone, PartialEq, Message)]
pub struct JoinBaseline {
    #[prost(uint64, tag = "1")]
    pub tick: Tick,

    /// Ordered by entity_id ascending.
    #[prost(message, repeated, tag = "2")]
    pub entities: Vec<EntitySnapshotProto>,

    /// `World::state_digest()` of the sending replica.
    #[prost(uint64, tag = "3")]
    pub digest: u64,
}

// ============================================================================
// Encoding Helpers
// ============================================================================

pub fn encode_envelope(envelope: &ReliableEnvelope) -> Vec<u8> {
    envelope.encode_to_vec()
}

/// Decode a reliable frame. Envelopes without a body are rejected.
pub fn decode_envelope(bytes: &[u8]) -> Result<ReliableEnvelope, WireError> {
    let envelope = ReliableEnvelope::decode(bytes)?;
    if envelope.body.is_none() {
        return Err(WireError::MissingBody);
    }
    Ok(envelope)
}

pub fn vec3_to_wire(v: DVec3) -> Vec<f64> {
    v.to_array().to_vec()
}

pub fn vec3_from_wire(values: &[f64], field: &'static str) -> Result<DVec3, WireError> {
    match values {
        [x, y, z] => Ok(DVec3::new(*x, *y, *z)),
        _ => Err(WireError::BadVector {
            field,
            len: values.len(),
        }),
    }
}

// ============================================================================
// Conversion Traits
// ============================================================================

impl From<DamageSource> for DamageSourceProto {
    fn from(s: DamageSource) -> Self {
        Self {
            entity_id: s.entity_id,
            participant: s.participant,
        }
    }
}

impl From<DamageSourceProto> for DamageSource {
    fn from(s: DamageSourceProto) -> Self {
        Self {
            entity_id: s.entity_id,
            participant: s.participant,
        }
    }
}

impl From<&EntitySnapshot> for EntitySnapshotProto {
    fn from(e: &EntitySnapshot) -> Self {
        Self {
            entity_id: e.entity_id,
            owner: e.owner,
            position: vec3_to_wire(e.transform.position),
            forward: vec3_to_wire(e.transform.forward),
            health: e.health.map(|h| HealthProto {
                current: h.current,
                max: h.max,
                alive: h.alive,
            }),
        }
    }
}

impl TryFrom<&EntitySnapshotProto> for EntitySnapshot {
    type Error = WireError;

    fn try_from(e: &EntitySnapshotProto) -> Result<Self, Self::Error> {
        Ok(Self {
            entity_id: e.entity_id,
            owner: e.owner,
            transform: Transform {
                position: vec3_from_wire(&e.position, "position")?,
                forward: vec3_from_wire(&e.forward, "forward")?,
            },
            health: e.health.as_ref().map(|h| HealthSnapshot {
                current: h.current,
                max: h.max,
                alive: h.alive,
            }),
        })
    }
}

impl Respawned {
    pub fn transform(&self) -> Result<Transform, WireError> {
        Ok(Transform {
            position: vec3_from_wire(&self.position, "position")?,
            forward: vec3_from_wire(&self.forward, "forward")?,
        })
    }
}

impl SnapshotProto {
    pub fn from_entities(sender: ParticipantId, tick: Tick, entities: &[EntitySnapshot]) -> Self {
        Self {
            sender,
            tick,
            entities: entities.iter().map(Into::into).collect(),
        }
    }
}

impl JoinBaseline {
    pub fn from_entities(tick: Tick, entities: &[EntitySnapshot], digest: u64) -> Self {
        Self {
            tick,
            entities: entities.iter().map(Into::into).collect(),
            digest,
        }
    }

    pub fn to_entities(&self) -> Result<Vec<EntitySnapshot>, WireError> {
        self.entities.iter().map(TryInto::try_into).collect()
    }
}

impl From<&Effect> for Body {
    fn from(effect: &Effect) -> Self {
        match effect {
            Effect::AttackTriggered { attacker } => Self::AttackTriggered(AttackTriggered {
                attacker: *attacker,
            }),
            Effect::DamageRequested {
                target,
                amount,
                source,
                ..
            } => Self::DamageRequest(DamageRequest {
                target: *target,
                amount: *amount,
                source: Some((*source).into()),
            }),
            Effect::HealthChanged {
                target,
                current,
                max,
                alive,
            } => Self::HealthChanged(HealthChanged {
                target: *target,
                current: *current,
                max: *max,
                alive: *alive,
            }),
            Effect::Died { victim, killer } => Self::Died(Died {
                victim: *victim,
                killer: killer.map(Into::into),
            }),
            Effect::Respawned {
                entity_id,
                transform,
            } => Self::Respawned(Respawned {
                entity_id: *entity_id,
                position: vec3_to_wire(transform.position),
                forward: vec3_to_wire(transform.forward),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn player_snapshot() -> EntitySnapshot {
        EntitySnapshot {
            entity_id: 7,
            owner: 2,
            transform: Transform {
                position: DVec3::new(1.0, 2.0, -3.5),
                forward: DVec3::X,
            },
            health: Some(HealthSnapshot {
                current: 75.0,
                max: 100.0,
                alive: true,
            }),
        }
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = ReliableEnvelope {
            sender: 3,
            seq: 41,
            body: Some(Body::Died(Died {
                victim: 2,
                killer: Some(DamageSourceProto {
                    entity_id: 1,
                    participant: 1,
                }),
            })),
        };
        let bytes = encode_envelope(&envelope);
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_envelope_without_body_is_rejected() {
        let envelope = ReliableEnvelope {
            sender: 1,
            seq: 0,
            body: None,
        };
        let bytes = envelope.encode_to_vec();
        assert!(matches!(
            decode_envelope(&bytes),
            Err(WireError::MissingBody)
        ));
    }

    #[test]
    fn test_garbage_frame_is_a_decode_error() {
        let result = decode_envelope(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(WireError::Decode(_))));
    }

    #[test]
    fn test_entity_snapshot_conversion() {
        let snapshot = player_snapshot();
        let proto = EntitySnapshotProto::from(&snapshot);
        assert_eq!(proto.position, vec![1.0, 2.0, -3.5]);
        let back = EntitySnapshot::try_from(&proto).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_prop_snapshot_has_no_health() {
        let prop = EntitySnapshot {
            health: None,
            owner: 0,
            ..player_snapshot()
        };
        let proto = EntitySnapshotProto::from(&prop);
        assert!(proto.health.is_none());
    }

    #[test]
    fn test_short_vector_rejected() {
        let mut proto = EntitySnapshotProto::from(&player_snapshot());
        proto.forward = vec![0.0, 1.0];
        let err = EntitySnapshot::try_from(&proto).unwrap_err();
        assert!(matches!(
            err,
            WireError::BadVector {
                field: "forward",
                len: 2
            }
        ));
    }

    #[test]
    fn test_damage_request_from_effect_drops_routing_owner() {
        let effect = Effect::DamageRequested {
            target: 2,
            owner: 5,
            amount: 25.0,
            source: DamageSource {
                entity_id: 1,
                participant: 1,
            },
        };
        let body = Body::from(&effect);
        assert_eq!(body.kind(), "damage_request");
        let Body::DamageRequest(request) = body else {
            panic!("expected damage request");
        };
        assert_eq!(request.target, 2);
        assert_eq!(request.amount, 25.0);
        assert_eq!(request.source.map(|s| s.participant), Some(1));
    }

    #[test]
    fn test_round_ended_reason_enum() {
        let msg = RoundEnded {
            reason: RoundEndReasonProto::ScoreReached as i32,
            winner: Some(2),
        };
        let decoded = RoundEnded::decode(msg.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.reason(), RoundEndReasonProto::ScoreReached);
        assert_eq!(decoded.winner, Some(2));
    }

    #[test]
    fn test_baseline_entities_roundtrip() {
        let entities = vec![player_snapshot()];
        let baseline = JoinBaseline::from_entities(12, &entities, 0xfeed);
        let decoded = JoinBaseline::decode(baseline.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.to_entities().unwrap(), entities);
        assert_eq!(decoded.digest, 0xfeed);
    }
}
