//! Dark Dungeon Simulation Core
//!
//! Per-participant replica of a room: entity registry, authority table,
//! health lifecycle, and melee combat. Every participant runs one
//! [`World`]; each entity is mutated only on the replica of its owner and
//! reaches everyone else as [`Effect`]s and snapshots.
//!
//! # Constraints
//!
//! The Simulation Core does not:
//! - Perform I/O (file, network, etc.)
//! - Read wall-clock time; all timers are counted in [`Tick`]s
//! - Use unseeded randomness; spawn selection is seeded per participant
//!
//! Transport, sequencing, and room management live in the room edge.

#![deny(unsafe_code)]

use glam::DVec3;
use serde::{Deserialize, Serialize};

pub mod authority;
pub mod combat;
pub mod events;
pub mod health;
pub mod spawn;
pub mod world;

pub use authority::{AuthorityError, AuthorityResolver, OrphanPolicy, OrphanResolution};
pub use combat::{AttackRejection, Weapon, WeaponSpec};
pub use events::{HealthEvent, Subscription};
pub use health::{DamageOutcome, DamageSource, HealOutcome, Health, HealthSpec, RegenSpec};
pub use spawn::{SpawnConfig, SpawnTable};
pub use world::{
    AttackOutcome, Command, Effect, Entity, EntitySnapshot, HealthSnapshot, Refusal, World,
    WorldConfig,
};

// ============================================================================
// Type Aliases
// ============================================================================

/// A single discrete simulation timestep.
pub type Tick = u64;

/// Room-scoped participant identifier. Assigned by the coordinator in join
/// order starting at 1; never reused within a room.
pub type ParticipantId = u32;

/// Room-unique entity identifier, assigned by the coordinator from 1.
pub type EntityId = u64;

/// Reserved participant id for the room coordinator. Props are owned by it,
/// and coordinator announcements carry it as their sender.
pub const ROOM_PARTICIPANT: ParticipantId = 0;

/// Default simulation rate.
pub const DEFAULT_TICK_RATE_HZ: u32 = 60;

// ============================================================================
// Core Types
// ============================================================================

/// Position and facing of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    /// Unit facing vector.
    pub forward: DVec3,
}

impl Transform {
    /// Facing +Z at `position`.
    pub fn at(position: DVec3) -> Self {
        Self {
            position,
            forward: DVec3::Z,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::at(DVec3::ZERO)
    }
}

/// Convert a duration in seconds to whole ticks, rounding to nearest.
///
/// Any positive duration lasts at least one tick. Negative and non-finite
/// durations map to zero.
pub fn seconds_to_ticks(seconds: f64, tick_rate_hz: u32) -> Tick {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    let ticks = (seconds * f64::from(tick_rate_hz)).round();
    (ticks as Tick).max(1)
}

// ============================================================================
// StateDigest
// ============================================================================

/// Identifier of the digest layout produced by [`World::state_digest`].
pub const STATE_DIGEST_ALGO_ID: &str = "statedigest-v1-fnv1a64-le-f64canon-eidasc-owner-xform-health";

/// FNV-1a 64-bit offset basis.
const FNV1A_OFFSET_BASIS: u64 = 0xcbf29ce484222325;

/// FNV-1a 64-bit prime.
const FNV1A_PRIME: u64 = 0x100000001b3;

#[derive(Debug, Clone)]
pub(crate) struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    pub(crate) fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    pub(crate) fn finish(self) -> u64 {
        self.state
    }
}

/// Canonicalize an f64 for hashing.
///
/// - `-0.0` → `+0.0`
/// - Any NaN → quiet NaN bit pattern `0x7ff8000000000000`
pub(crate) fn canonicalize_f64(value: f64) -> u64 {
    const QUIET_NAN_BITS: u64 = 0x7ff8000000000000;

    if value.is_nan() {
        QUIET_NAN_BITS
    } else if value == 0.0 {
        0u64
    } else {
        value.to_bits()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_ticks_rounds_to_nearest() {
        assert_eq!(seconds_to_ticks(0.8, 60), 48);
        assert_eq!(seconds_to_ticks(0.3, 60), 18);
        assert_eq!(seconds_to_ticks(3.0, 60), 180);
        assert_eq!(seconds_to_ticks(0.5, 60), 30);
    }

    #[test]
    fn test_seconds_to_ticks_short_durations_last_one_tick() {
        assert_eq!(seconds_to_ticks(0.001, 60), 1);
        assert_eq!(seconds_to_ticks(0.0, 60), 0);
        assert_eq!(seconds_to_ticks(-1.0, 60), 0);
        assert_eq!(seconds_to_ticks(f64::NAN, 60), 0);
    }

    #[test]
    fn test_f64_canonicalization() {
        assert_eq!(canonicalize_f64(-0.0), canonicalize_f64(0.0));
        assert_eq!(canonicalize_f64(-0.0), 0u64);

        let nan1 = f64::NAN;
        let nan2 = f64::from_bits(0x7ff0000000000001);
        assert_eq!(canonicalize_f64(nan1), canonicalize_f64(nan2));
        assert_eq!(canonicalize_f64(nan1), 0x7ff8000000000000);

        assert_eq!(canonicalize_f64(1.0), 1.0f64.to_bits());
        assert_eq!(canonicalize_f64(-1.0), (-1.0f64).to_bits());
    }

    #[test]
    fn test_fnv1a_known_vector() {
        // FNV-1a 64 of "a"
        let mut hasher = Fnv1a64::new();
        hasher.update(b"a");
        assert_eq!(hasher.finish(), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_state_digest_tracks_health() {
        let mut world = World::new(1, &WorldConfig::default(), 0);
        world
            .spawn_player(1, 1, Transform::default())
            .expect("fresh entity");
        let before = world.state_digest();

        world.apply_damage(1, 10.0, None).expect("owned entity");
        assert_ne!(before, world.state_digest());
    }

    #[test]
    fn test_state_digest_independent_of_local_participant() {
        let config = WorldConfig::default();
        let mut a = World::new(1, &config, 0);
        let mut b = World::new(2, &config, 7);
        for world in [&mut a, &mut b] {
            world.spawn_player(1, 1, Transform::default()).unwrap();
            world.spawn_player(2, 2, Transform::at(DVec3::X)).unwrap();
            world.spawn_prop(3, DVec3::new(4.0, 0.0, 4.0)).unwrap();
        }
        assert_eq!(a.state_digest(), b.state_digest());
    }
}
