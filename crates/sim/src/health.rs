//! Health and lifecycle state machine.
//!
//! States are `Alive` and `Dead`; respawning is a timed sub-phase of `Dead`
//! tracked through `respawn_at` and never visible to other participants.
//!
//! Invariants held after every operation:
//! - `0 <= current <= max`
//! - `alive == (current > 0)`

use serde::{Deserialize, Serialize};

use crate::{EntityId, ParticipantId, Tick};

/// Default maximum health.
pub const DEFAULT_MAX_HEALTH: f64 = 100.0;

/// Default delay between death and respawn.
pub const DEFAULT_RESPAWN_DELAY_SECS: f64 = 3.0;

/// Health tuning for player entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSpec {
    pub max_health: f64,
    pub respawn_delay_secs: f64,
    /// Passive regeneration; disabled when `None`.
    pub regen: Option<RegenSpec>,
}

impl Default for HealthSpec {
    fn default() -> Self {
        Self {
            max_health: DEFAULT_MAX_HEALTH,
            respawn_delay_secs: DEFAULT_RESPAWN_DELAY_SECS,
            regen: None,
        }
    }
}

/// Passive regeneration. Replicas follow partial progress through snapshots;
/// reaching full health is broadcast like any other health change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegenSpec {
    /// Health restored per second.
    pub rate_per_sec: f64,
    /// Quiet period after the last damage before regeneration starts.
    pub delay_secs: f64,
}

impl Default for RegenSpec {
    fn default() -> Self {
        Self {
            rate_per_sec: 5.0,
            delay_secs: 5.0,
        }
    }
}

/// Who dealt a blow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DamageSource {
    pub entity_id: EntityId,
    pub participant: ParticipantId,
}

/// Result of applying damage on the authoritative replica.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Health dropped but the entity survived.
    Applied { current: f64 },
    /// This blow killed the entity. Emitted once per life.
    Killed { killer: Option<DamageSource> },
    /// Entity was already dead; nothing changed.
    AlreadyDead,
    /// Amount was negative or not finite; nothing changed.
    InvalidAmount,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealOutcome {
    Healed { current: f64 },
    AlreadyFull,
    Dead,
    InvalidAmount,
}

/// Transitions observed when a replica adopts an authoritative value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicaUpdate {
    pub changed: bool,
    pub died: bool,
    pub revived: bool,
}

/// Per-entity health state.
#[derive(Debug, Clone, PartialEq)]
pub struct Health {
    current: f64,
    max: f64,
    alive: bool,
    killer: Option<DamageSource>,
    respawn_at: Option<Tick>,
    last_damage_tick: Option<Tick>,
}

impl Health {
    /// Full health at `max`.
    ///
    /// # Panics
    /// If `max` is not a positive finite number.
    pub fn new(max: f64) -> Self {
        assert!(max.is_finite() && max > 0.0, "max health must be positive");
        Self {
            current: max,
            max,
            alive: true,
            killer: None,
            respawn_at: None,
            last_damage_tick: None,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn killer(&self) -> Option<DamageSource> {
        self.killer
    }

    pub fn respawn_at(&self) -> Option<Tick> {
        self.respawn_at
    }

    pub fn last_damage_tick(&self) -> Option<Tick> {
        self.last_damage_tick
    }

    /// Fraction of max health remaining, for HUD consumers.
    pub fn fraction(&self) -> f64 {
        self.current / self.max
    }

    /// `Alive + damage` lowers health, clamped at zero; reaching zero kills.
    /// `Dead + damage` is a no-op.
    pub fn apply_damage(
        &mut self,
        amount: f64,
        source: Option<DamageSource>,
        now: Tick,
        respawn_delay_ticks: Tick,
    ) -> DamageOutcome {
        if !amount.is_finite() || amount < 0.0 {
            return DamageOutcome::InvalidAmount;
        }
        if !self.alive {
            return DamageOutcome::AlreadyDead;
        }

        self.current = (self.current - amount).clamp(0.0, self.max);
        self.last_damage_tick = Some(now);

        if self.current == 0.0 {
            self.alive = false;
            self.killer = source;
            self.respawn_at = Some(now + respawn_delay_ticks);
            DamageOutcome::Killed { killer: source }
        } else {
            DamageOutcome::Applied {
                current: self.current,
            }
        }
    }

    /// `Alive + heal` raises health up to max. No-op when dead or full.
    pub fn heal(&mut self, amount: f64) -> HealOutcome {
        if !amount.is_finite() || amount < 0.0 {
            return HealOutcome::InvalidAmount;
        }
        if !self.alive {
            return HealOutcome::Dead;
        }
        if self.current >= self.max {
            return HealOutcome::AlreadyFull;
        }

        self.current = (self.current + amount).min(self.max);
        HealOutcome::Healed {
            current: self.current,
        }
    }

    pub fn full_heal(&mut self) -> HealOutcome {
        self.heal(self.max)
    }

    /// Change the maximum, clamping current health into the new range.
    /// Returns false (and changes nothing) for a non-positive or non-finite max.
    pub fn set_max(&mut self, max: f64) -> bool {
        if !max.is_finite() || max <= 0.0 {
            return false;
        }
        self.max = max;
        self.current = self.current.min(max);
        true
    }

    /// True once a dead entity's respawn timer has elapsed.
    pub fn respawn_due(&self, now: Tick) -> bool {
        !self.alive && self.respawn_at.is_some_and(|at| now >= at)
    }

    /// `Dead + respawn timer elapsed → Alive` at full health, killer cleared.
    pub fn respawn(&mut self) {
        self.current = self.max;
        self.alive = true;
        self.killer = None;
        self.respawn_at = None;
        self.last_damage_tick = None;
    }

    /// Start the respawn timer for a dead entity that has none, as happens
    /// when ownership of a replica-dead entity is handed over. Returns true
    /// when a timer was scheduled.
    pub fn schedule_respawn(&mut self, now: Tick, respawn_delay_ticks: Tick) -> bool {
        if self.alive || self.respawn_at.is_some() {
            return false;
        }
        self.respawn_at = Some(now + respawn_delay_ticks);
        true
    }

    /// Passive regeneration for one tick. Returns the new value if it changed.
    pub fn regen_step(&mut self, now: Tick, delay_ticks: Tick, amount: f64) -> Option<f64> {
        if !self.alive || self.current >= self.max {
            return None;
        }
        if let Some(last) = self.last_damage_tick
            && now.saturating_sub(last) < delay_ticks
        {
            return None;
        }
        match self.heal(amount) {
            HealOutcome::Healed { current } => Some(current),
            _ => None,
        }
    }

    /// Adopt the owner's broadcast value on a replica.
    ///
    /// Values are sanitised so a malformed broadcast cannot break the
    /// invariants: current is clamped into `[0, max]` and `alive` is forced
    /// false at zero health.
    pub fn overwrite(&mut self, current: f64, max: f64, alive: bool) -> ReplicaUpdate {
        let max = if max.is_finite() && max > 0.0 {
            max
        } else {
            self.max
        };
        let current = if current.is_finite() {
            current.clamp(0.0, max)
        } else {
            self.current.min(max)
        };
        let alive = alive && current > 0.0;
        let current = if alive { current } else { 0.0 };

        let update = ReplicaUpdate {
            changed: current != self.current || max != self.max || alive != self.alive,
            died: self.alive && !alive,
            revived: !self.alive && alive,
        };

        self.current = current;
        self.max = max;
        self.alive = alive;
        if update.revived {
            self.killer = None;
            self.respawn_at = None;
        }
        update
    }

    /// Record the killer reported by a death notification on a replica.
    pub fn record_killer(&mut self, killer: Option<DamageSource>) {
        if !self.alive {
            self.killer = killer;
        }
    }
}
