//! Melee combat: weapon tuning, attack phases, and cone hit detection.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{EntityId, Tick, seconds_to_ticks};

/// Slack applied to the inclusive arc boundary to absorb float rounding in
/// the angle computation.
pub const ARC_TOLERANCE_DEGREES: f64 = 1e-6;

/// Colliders closer than this to the attack origin have no meaningful
/// direction and always count as inside the arc.
const MIN_DIRECTION_LENGTH: f64 = 1e-9;

/// Weapon tuning in seconds and world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponSpec {
    pub damage: f64,
    pub range: f64,
    /// Full width of the attack cone in degrees.
    pub arc_degrees: f64,
    pub cooldown_secs: f64,
    /// Swing length; the hit lands halfway through.
    pub duration_secs: f64,
}

impl Default for WeaponSpec {
    fn default() -> Self {
        Self {
            damage: 25.0,
            range: 2.0,
            arc_degrees: 45.0,
            cooldown_secs: 0.8,
            duration_secs: 0.3,
        }
    }
}

/// A weapon resolved against the world tick rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weapon {
    spec: WeaponSpec,
    cooldown_ticks: Tick,
    windup_ticks: Tick,
    duration_ticks: Tick,
}

impl Weapon {
    pub fn new(spec: WeaponSpec, tick_rate_hz: u32) -> Self {
        let duration_ticks = seconds_to_ticks(spec.duration_secs, tick_rate_hz);
        Self {
            spec,
            cooldown_ticks: seconds_to_ticks(spec.cooldown_secs, tick_rate_hz),
            windup_ticks: duration_ticks / 2,
            duration_ticks,
        }
    }

    pub fn spec(&self) -> &WeaponSpec {
        &self.spec
    }

    pub fn damage(&self) -> f64 {
        self.spec.damage
    }

    pub fn range(&self) -> f64 {
        self.spec.range
    }

    pub fn half_arc_degrees(&self) -> f64 {
        self.spec.arc_degrees / 2.0
    }

    pub fn cooldown_ticks(&self) -> Tick {
        self.cooldown_ticks
    }

    pub fn windup_ticks(&self) -> Tick {
        self.windup_ticks
    }

    pub fn duration_ticks(&self) -> Tick {
        self.duration_ticks
    }
}

/// Where an entity is in its swing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttackPhase {
    #[default]
    Idle,
    /// Waiting for the hit frame.
    WindUp { started: Tick },
    /// Hit has landed; waiting for the swing to finish.
    Recovery { started: Tick },
}

/// What advancing an attack by one tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStep {
    Nothing,
    /// The hit frame was crossed; run hit detection now.
    Strike,
    /// The swing finished.
    Finished,
}

/// Why an attack attempt had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackRejection {
    NotAuthority,
    UnknownEntity,
    NoWeapon,
    Dead,
    Blocking,
    CoolingDown,
    MidAttack,
}

/// Per-entity attack bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttackState {
    phase: AttackPhase,
    last_attack: Option<Tick>,
}

impl AttackState {
    pub fn phase(&self) -> AttackPhase {
        self.phase
    }

    pub fn last_attack(&self) -> Option<Tick> {
        self.last_attack
    }

    pub fn is_attacking(&self) -> bool {
        self.phase != AttackPhase::Idle
    }

    /// Cooldown has elapsed and no swing is in flight.
    pub fn can_attack(&self, now: Tick, weapon: &Weapon) -> Result<(), AttackRejection> {
        if self.is_attacking() {
            return Err(AttackRejection::MidAttack);
        }
        match self.last_attack {
            Some(last) if now < last + weapon.cooldown_ticks() => {
                Err(AttackRejection::CoolingDown)
            }
            _ => Ok(()),
        }
    }

    /// Start a swing. Callers check [`AttackState::can_attack`] first.
    pub fn begin(&mut self, now: Tick) {
        self.last_attack = Some(now);
        self.phase = AttackPhase::WindUp { started: now };
    }

    /// Move the phase field forward to `now`.
    ///
    /// The strike fires exactly once per swing, on the first tick at or past
    /// the wind-up threshold.
    pub fn advance(&mut self, now: Tick, weapon: &Weapon) -> PhaseStep {
        match self.phase {
            AttackPhase::Idle => PhaseStep::Nothing,
            AttackPhase::WindUp { started } => {
                if now >= started + weapon.windup_ticks() {
                    self.phase = AttackPhase::Recovery { started };
                    PhaseStep::Strike
                } else {
                    PhaseStep::Nothing
                }
            }
            AttackPhase::Recovery { started } => {
                if now >= started + weapon.duration_ticks() {
                    self.phase = AttackPhase::Idle;
                    PhaseStep::Finished
                } else {
                    PhaseStep::Nothing
                }
            }
        }
    }

    /// Drop any in-flight swing (used when ownership migrates).
    pub fn reset(&mut self) {
        self.phase = AttackPhase::Idle;
    }
}

/// A hittable shape, identified by the root entity it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitCandidate {
    pub root: EntityId,
    pub position: DVec3,
}

/// Angle in degrees between `forward` and the direction to `target`.
/// `None` when the target sits on the origin.
pub fn angle_to(origin: DVec3, forward: DVec3, target: DVec3) -> Option<f64> {
    let delta = target - origin;
    let lengths = delta.length() * forward.length();
    if delta.length() < MIN_DIRECTION_LENGTH || forward.length() < MIN_DIRECTION_LENGTH {
        return None;
    }
    let cos = (forward.dot(delta) / lengths).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

/// True if `target` lies inside the attack cone: within `range` (inclusive)
/// and at most `half_arc_degrees` off the forward axis (inclusive).
pub fn in_attack_cone(
    origin: DVec3,
    forward: DVec3,
    target: DVec3,
    range: f64,
    half_arc_degrees: f64,
) -> bool {
    if origin.distance(target) > range {
        return false;
    }
    match angle_to(origin, forward, target) {
        Some(angle) => angle <= half_arc_degrees + ARC_TOLERANCE_DEGREES,
        None => true,
    }
}

/// Roots struck by a swing, in first-seen order.
///
/// Colliders belonging to `attacker` are skipped by root identity, and each
/// root is reported at most once even if several of its colliders are in
/// the cone.
pub fn detect_hits(
    attacker: EntityId,
    origin: DVec3,
    forward: DVec3,
    weapon: &Weapon,
    candidates: &[HitCandidate],
) -> Vec<EntityId> {
    let mut hits: Vec<EntityId> = Vec::new();
    for candidate in candidates {
        if candidate.root == attacker || hits.contains(&candidate.root) {
            continue;
        }
        if in_attack_cone(
            origin,
            forward,
            candidate.position,
            weapon.range(),
            weapon.half_arc_degrees(),
        ) {
            hits.push(candidate.root);
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_angle(distance: f64, degrees: f64) -> DVec3 {
        let radians = degrees.to_radians();
        DVec3::new(distance * radians.sin(), 0.0, distance * radians.cos())
    }

    fn default_weapon() -> Weapon {
        Weapon::new(WeaponSpec::default(), 60)
    }

    #[test]
    fn test_weapon_ticks_at_60hz() {
        let weapon = default_weapon();
        assert_eq!(weapon.cooldown_ticks(), 48);
        assert_eq!(weapon.duration_ticks(), 18);
        assert_eq!(weapon.windup_ticks(), 9);
        assert_eq!(weapon.half_arc_degrees(), 22.5);
    }

    #[test]
    fn test_cone_accepts_target_inside_arc() {
        assert!(in_attack_cone(
            DVec3::ZERO,
            DVec3::Z,
            at_angle(1.5, 10.0),
            2.0,
            22.5
        ));
    }

    #[test]
    fn test_cone_boundary_is_inclusive() {
        assert!(in_attack_cone(
            DVec3::ZERO,
            DVec3::Z,
            at_angle(1.0, 22.5),
            2.0,
            22.5
        ));
        assert!(!in_attack_cone(
            DVec3::ZERO,
            DVec3::Z,
            at_angle(1.0, 23.5),
            2.0,
            22.5
        ));
    }

    #[test]
    fn test_cone_range_is_inclusive() {
        assert!(in_attack_cone(
            DVec3::ZERO,
            DVec3::Z,
            DVec3::new(0.0, 0.0, 2.0),
            2.0,
            22.5
        ));
        assert!(!in_attack_cone(
            DVec3::ZERO,
            DVec3::Z,
            DVec3::new(0.0, 0.0, 2.01),
            2.0,
            22.5
        ));
    }

    #[test]
    fn test_cone_rejects_behind() {
        assert!(!in_attack_cone(
            DVec3::ZERO,
            DVec3::Z,
            DVec3::new(0.0, 0.0, -1.0),
            2.0,
            22.5
        ));
    }

    #[test]
    fn test_target_on_origin_counts_as_hit() {
        assert!(in_attack_cone(DVec3::ZERO, DVec3::Z, DVec3::ZERO, 2.0, 22.5));
    }

    #[test]
    fn test_detect_hits_excludes_attacker_root_and_dedups() {
        let weapon = default_weapon();
        let candidates = [
            // Attacker's own sub-part, right in front
            HitCandidate {
                root: 1,
                position: DVec3::new(0.0, 0.0, 0.5),
            },
            HitCandidate {
                root: 2,
                position: DVec3::new(0.0, 0.0, 1.0),
            },
            // Second collider on the same target
            HitCandidate {
                root: 2,
                position: DVec3::new(0.0, 0.5, 1.0),
            },
            // Out of range
            HitCandidate {
                root: 3,
                position: DVec3::new(0.0, 0.0, 5.0),
            },
            HitCandidate {
                root: 4,
                position: at_angle(1.0, 15.0),
            },
        ];

        let hits = detect_hits(1, DVec3::ZERO, DVec3::Z, &weapon, &candidates);
        assert_eq!(hits, vec![2, 4]);
    }

    #[test]
    fn test_attack_phases_strike_once() {
        let weapon = default_weapon();
        let mut state = AttackState::default();
        assert!(state.can_attack(0, &weapon).is_ok());

        state.begin(0);
        assert_eq!(state.can_attack(1, &weapon), Err(AttackRejection::MidAttack));

        let mut strikes = 0;
        let mut finished_at = None;
        for now in 1..=30 {
            match state.advance(now, &weapon) {
                PhaseStep::Strike => {
                    strikes += 1;
                    assert_eq!(now, weapon.windup_ticks());
                }
                PhaseStep::Finished => finished_at = Some(now),
                PhaseStep::Nothing => {}
            }
        }
        assert_eq!(strikes, 1);
        assert_eq!(finished_at, Some(weapon.duration_ticks()));
        assert!(!state.is_attacking());
    }

    #[test]
    fn test_cooldown_gates_next_attack() {
        let weapon = default_weapon();
        let mut state = AttackState::default();
        state.begin(100);
        for now in 101..=130 {
            state.advance(now, &weapon);
        }

        assert_eq!(
            state.can_attack(147, &weapon),
            Err(AttackRejection::CoolingDown)
        );
        assert!(state.can_attack(148, &weapon).is_ok());
    }

    #[test]
    fn test_reset_cancels_swing() {
        let weapon = default_weapon();
        let mut state = AttackState::default();
        state.begin(0);
        state.reset();
        assert_eq!(state.advance(20, &weapon), PhaseStep::Nothing);
        assert_eq!(state.last_attack(), Some(0));
    }
}
