//! Per-participant world replica.
//!
//! Every participant runs one `World`. It holds a view of every entity in
//! the room but only mutates the canonical state (health arithmetic,
//! transforms, attacks, respawns) of entities the local participant owns.
//! Everything it wants other participants to know is queued as an
//! [`Effect`] and drained by the caller after each call to
//! [`World::advance`].

use std::collections::BTreeMap;

use glam::DVec3;
use tracing::{debug, info};

use crate::authority::{AuthorityError, AuthorityResolver};
use crate::combat::{
    AttackRejection, AttackState, HitCandidate, PhaseStep, Weapon, WeaponSpec, detect_hits,
};
use crate::events::{HealthEvent, Observers, Subscription};
use crate::health::{DamageOutcome, DamageSource, HealOutcome, Health, HealthSpec, ReplicaUpdate};
use crate::spawn::{SpawnConfig, SpawnTable};
use crate::{
    EntityId, Fnv1a64, ParticipantId, ROOM_PARTICIPANT, Tick, Transform, canonicalize_f64,
    seconds_to_ticks,
};

/// Construction parameters shared by every replica in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub tick_rate_hz: u32,
    pub health: HealthSpec,
    pub weapon: WeaponSpec,
    pub spawn: SpawnConfig,
    /// Seed for the respawn table; mixed with the local participant id.
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: crate::DEFAULT_TICK_RATE_HZ,
            health: HealthSpec::default(),
            weapon: WeaponSpec::default(),
            spawn: SpawnConfig::default(),
            seed: 0,
        }
    }
}

/// Intent from the local player, applied at the start of a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Attack {
        entity_id: EntityId,
    },
    Move {
        entity_id: EntityId,
        transform: Transform,
    },
    Heal {
        entity_id: EntityId,
        amount: f64,
    },
    Equip {
        entity_id: EntityId,
        weapon: Option<WeaponSpec>,
    },
    SetBlocking {
        entity_id: EntityId,
        blocking: bool,
    },
}

impl Command {
    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::Attack { entity_id }
            | Self::Move { entity_id, .. }
            | Self::Heal { entity_id, .. }
            | Self::Equip { entity_id, .. }
            | Self::SetBlocking { entity_id, .. } => *entity_id,
        }
    }
}

/// Something the local authority needs other participants to learn.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// A swing started; replicas play feedback. Carries no gameplay payload.
    AttackTriggered { attacker: EntityId },
    /// A hit landed on an entity owned elsewhere; only its owner applies it.
    DamageRequested {
        target: EntityId,
        owner: ParticipantId,
        amount: f64,
        source: DamageSource,
    },
    /// Authoritative health after a change.
    HealthChanged {
        target: EntityId,
        current: f64,
        max: f64,
        alive: bool,
    },
    Died {
        victim: EntityId,
        killer: Option<DamageSource>,
    },
    Respawned {
        entity_id: EntityId,
        transform: Transform,
    },
}

/// Result of [`World::attempt_attack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackOutcome {
    Started,
    Ignored(AttackRejection),
}

/// Why a world operation was refused. Refusals are silent no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    UnknownEntity,
    NotAuthority,
    NotDamageable,
}

/// Replicated health values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSnapshot {
    pub current: f64,
    pub max: f64,
    pub alive: bool,
}

/// Snapshot of a single entity's replicated state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub owner: ParticipantId,
    pub transform: Transform,
    /// `None` for props.
    pub health: Option<HealthSnapshot>,
}

#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    owner: ParticipantId,
    transform: Transform,
    health: Option<Health>,
    weapon: Option<Weapon>,
    attack: AttackState,
    blocking: bool,
    /// Collider offsets from the entity position; the body sits at zero.
    colliders: Vec<DVec3>,
}

impl Entity {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn owner(&self) -> ParticipantId {
        self.owner
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn health(&self) -> Option<&Health> {
        self.health.as_ref()
    }

    pub fn weapon(&self) -> Option<&Weapon> {
        self.weapon.as_ref()
    }

    pub fn attack(&self) -> &AttackState {
        &self.attack
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn is_damageable(&self) -> bool {
        self.health.is_some()
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.id,
            owner: self.owner,
            transform: self.transform,
            health: self.health.as_ref().map(|h| HealthSnapshot {
                current: h.current(),
                max: h.max(),
                alive: h.is_alive(),
            }),
        }
    }
}

/// A participant's replica of the room.
#[derive(Debug)]
pub struct World {
    local: ParticipantId,
    tick: Tick,
    tick_rate_hz: u32,
    health_spec: HealthSpec,
    respawn_delay_ticks: Tick,
    /// (delay ticks, heal per tick) when regeneration is enabled.
    regen: Option<(Tick, f64)>,
    default_weapon: WeaponSpec,
    entities: BTreeMap<EntityId, Entity>,
    authority: AuthorityResolver,
    spawns: SpawnTable,
    observers: Observers,
    effects: Vec<Effect>,
}

impl World {
    /// Create the replica for `local`, starting at `start_tick`.
    ///
    /// # Panics
    /// If `config.tick_rate_hz` is zero.
    pub fn new(local: ParticipantId, config: &WorldConfig, start_tick: Tick) -> Self {
        assert!(config.tick_rate_hz > 0, "tick_rate_hz must be positive");

        let regen = config.health.regen.map(|regen| {
            (
                seconds_to_ticks(regen.delay_secs, config.tick_rate_hz),
                regen.rate_per_sec / f64::from(config.tick_rate_hz),
            )
        });

        Self {
            local,
            tick: start_tick,
            tick_rate_hz: config.tick_rate_hz,
            health_spec: config.health.clone(),
            respawn_delay_ticks: seconds_to_ticks(
                config.health.respawn_delay_secs,
                config.tick_rate_hz,
            ),
            regen,
            default_weapon: config.weapon,
            entities: BTreeMap::new(),
            authority: AuthorityResolver::new(),
            spawns: SpawnTable::new(config.spawn.clone(), config.seed ^ u64::from(local)),
            observers: Observers::new(),
            effects: Vec::new(),
        }
    }

    pub fn local(&self) -> ParticipantId {
        self.local
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.tick_rate_hz
    }

    pub fn authority(&self) -> &AuthorityResolver {
        &self.authority
    }

    pub fn entity(&self, entity_id: EntityId) -> Option<&Entity> {
        self.entities.get(&entity_id)
    }

    /// Entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn health(&self, entity_id: EntityId) -> Option<&Health> {
        self.entity(entity_id).and_then(Entity::health)
    }

    pub fn is_authoritative(&self, entity_id: EntityId) -> bool {
        self.authority.is_authoritative(entity_id, self.local)
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Create a player entity with full health and the default weapon.
    pub fn spawn_player(
        &mut self,
        entity_id: EntityId,
        owner: ParticipantId,
        transform: Transform,
    ) -> Result<(), AuthorityError> {
        let health = Health::new(self.health_spec.max_health);
        self.insert(entity_id, owner, transform, Some(health))
    }

    /// Create a non-damageable prop owned by the room.
    pub fn spawn_prop(
        &mut self,
        entity_id: EntityId,
        position: DVec3,
    ) -> Result<(), AuthorityError> {
        self.insert(
            entity_id,
            ROOM_PARTICIPANT,
            Transform::at(position),
            None,
        )
    }

    /// Materialise an entity announced by the coordinator or carried in a
    /// join baseline.
    pub fn insert_snapshot(&mut self, snapshot: &EntitySnapshot) -> Result<(), AuthorityError> {
        let health = snapshot.health.map(|h| {
            let mut health = Health::new(if h.max > 0.0 && h.max.is_finite() {
                h.max
            } else {
                self.health_spec.max_health
            });
            health.overwrite(h.current, h.max, h.alive);
            health
        });
        self.insert(snapshot.entity_id, snapshot.owner, snapshot.transform, health)
    }

    fn insert(
        &mut self,
        entity_id: EntityId,
        owner: ParticipantId,
        transform: Transform,
        health: Option<Health>,
    ) -> Result<(), AuthorityError> {
        self.authority.assign(entity_id, owner)?;
        let weapon = health
            .as_ref()
            .map(|_| Weapon::new(self.default_weapon, self.tick_rate_hz));
        self.entities.insert(
            entity_id,
            Entity {
                id: entity_id,
                owner,
                transform,
                health,
                weapon,
                attack: AttackState::default(),
                blocking: false,
                colliders: vec![DVec3::ZERO],
            },
        );
        debug!(entity = entity_id, owner, local = self.local, "entity_spawned");
        Ok(())
    }

    /// Remove an entity, its authority record, and its observers.
    pub fn despawn(&mut self, entity_id: EntityId) -> bool {
        let removed = self.entities.remove(&entity_id).is_some();
        if removed {
            self.authority.release(entity_id);
            self.observers.clear_entity(entity_id);
            debug!(entity = entity_id, local = self.local, "entity_despawned");
        }
        removed
    }

    /// Apply a coordinator-announced ownership change. Any swing in flight
    /// is dropped; the new owner starts from an idle attack state.
    pub fn migrate(
        &mut self,
        entity_id: EntityId,
        new_owner: ParticipantId,
    ) -> Result<ParticipantId, AuthorityError> {
        let previous = self.authority.migrate(entity_id, new_owner)?;
        let (now, respawn_delay_ticks) = (self.tick, self.respawn_delay_ticks);
        let inherits = new_owner == self.local;
        if let Some(entity) = self.entities.get_mut(&entity_id) {
            entity.owner = new_owner;
            entity.attack.reset();
            // Replicas never carry a respawn timer; the heir starts a fresh one
            if inherits
                && let Some(health) = entity.health.as_mut()
                && health.schedule_respawn(now, respawn_delay_ticks)
            {
                debug!(
                    entity = entity_id,
                    respawn_at = now + respawn_delay_ticks,
                    "inherited_dead_entity"
                );
            }
        }
        info!(
            entity = entity_id,
            previous, new_owner, "authority_migrated"
        );
        Ok(previous)
    }

    /// Attach a sub-part collider at `offset` from the entity position.
    pub fn attach_collider(&mut self, entity_id: EntityId, offset: DVec3) -> bool {
        match self.entities.get_mut(&entity_id) {
            Some(entity) => {
                entity.colliders.push(offset);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, entity_id: EntityId, callback: F) -> Subscription
    where
        F: FnMut(EntityId, &HealthEvent) + 'static,
    {
        self.observers.subscribe(entity_id, callback)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }

    // ------------------------------------------------------------------
    // Owner operations
    // ------------------------------------------------------------------

    fn owned_mut(&mut self, entity_id: EntityId) -> Result<&mut Entity, Refusal> {
        let local = self.local;
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(Refusal::UnknownEntity)?;
        if entity.owner != local {
            return Err(Refusal::NotAuthority);
        }
        Ok(entity)
    }

    /// Start a swing if the local participant owns `attacker` and the
    /// weapon is ready. Every refusal is a silent no-op.
    pub fn attempt_attack(&mut self, attacker: EntityId) -> AttackOutcome {
        let now = self.tick;
        let outcome = match self.owned_mut(attacker) {
            Err(Refusal::NotAuthority) => AttackOutcome::Ignored(AttackRejection::NotAuthority),
            Err(_) => AttackOutcome::Ignored(AttackRejection::UnknownEntity),
            Ok(entity) => match (entity.weapon, entity.health.as_ref()) {
                (None, _) => AttackOutcome::Ignored(AttackRejection::NoWeapon),
                (Some(_), Some(health)) if !health.is_alive() => {
                    AttackOutcome::Ignored(AttackRejection::Dead)
                }
                (Some(_), _) if entity.blocking => {
                    AttackOutcome::Ignored(AttackRejection::Blocking)
                }
                (Some(weapon), _) => match entity.attack.can_attack(now, &weapon) {
                    Ok(()) => {
                        entity.attack.begin(now);
                        AttackOutcome::Started
                    }
                    Err(rejection) => AttackOutcome::Ignored(rejection),
                },
            },
        };

        match outcome {
            AttackOutcome::Started => {
                debug!(attacker, tick = now, "attack_started");
                self.effects.push(Effect::AttackTriggered { attacker });
            }
            AttackOutcome::Ignored(reason) => {
                debug!(attacker, tick = now, ?reason, "attack_ignored");
            }
        }
        outcome
    }

    /// Update an owned entity's transform. The forward vector is normalised;
    /// a zero forward keeps the previous facing.
    pub fn move_entity(&mut self, entity_id: EntityId, transform: Transform) -> Result<(), Refusal> {
        let entity = self.owned_mut(entity_id)?;
        entity.transform.position = transform.position;
        let forward = transform.forward.normalize_or_zero();
        if forward != DVec3::ZERO {
            entity.transform.forward = forward;
        }
        Ok(())
    }

    pub fn equip(&mut self, entity_id: EntityId, weapon: Option<WeaponSpec>) -> Result<(), Refusal> {
        let tick_rate_hz = self.tick_rate_hz;
        let entity = self.owned_mut(entity_id)?;
        entity.weapon = weapon.map(|spec| Weapon::new(spec, tick_rate_hz));
        entity.attack.reset();
        Ok(())
    }

    pub fn set_blocking(&mut self, entity_id: EntityId, blocking: bool) -> Result<(), Refusal> {
        self.owned_mut(entity_id)?.blocking = blocking;
        Ok(())
    }

    /// Authoritative damage application. Only the target's owner may run it.
    pub fn apply_damage(
        &mut self,
        target: EntityId,
        amount: f64,
        source: Option<DamageSource>,
    ) -> Result<DamageOutcome, Refusal> {
        let now = self.tick;
        let respawn_delay_ticks = self.respawn_delay_ticks;
        let entity = self.owned_mut(target)?;
        let Some(health) = entity.health.as_mut() else {
            debug!(target, "damage_target_not_damageable");
            return Err(Refusal::NotDamageable);
        };

        let outcome = health.apply_damage(amount, source, now, respawn_delay_ticks);
        let (current, max, alive) = (health.current(), health.max(), health.is_alive());

        match outcome {
            DamageOutcome::Applied { .. } => {
                self.publish_health(target, current, max, alive);
            }
            DamageOutcome::Killed { killer } => {
                info!(
                    victim = target,
                    killer = ?killer.map(|k| k.participant),
                    tick = now,
                    "entity_killed"
                );
                self.observers
                    .notify(target, &HealthEvent::Died { killer });
                self.effects.push(Effect::Died {
                    victim: target,
                    killer,
                });
                self.publish_health(target, current, max, alive);
            }
            DamageOutcome::AlreadyDead | DamageOutcome::InvalidAmount => {
                debug!(target, amount, ?outcome, "damage_ignored");
            }
        }
        Ok(outcome)
    }

    /// Authoritative heal. Broadcasts the new value when it changed.
    pub fn heal(&mut self, target: EntityId, amount: f64) -> Result<HealOutcome, Refusal> {
        let entity = self.owned_mut(target)?;
        let health = entity.health.as_mut().ok_or(Refusal::NotDamageable)?;
        let outcome = health.heal(amount);
        if let HealOutcome::Healed { current } = outcome {
            let (max, alive) = (health.max(), health.is_alive());
            self.publish_health(target, current, max, alive);
        }
        Ok(outcome)
    }

    /// Change an owned entity's maximum health.
    pub fn set_max_health(&mut self, target: EntityId, max: f64) -> Result<bool, Refusal> {
        let entity = self.owned_mut(target)?;
        let health = entity.health.as_mut().ok_or(Refusal::NotDamageable)?;
        if !health.set_max(max) {
            return Ok(false);
        }
        let (current, alive) = (health.current(), health.is_alive());
        self.publish_health(target, current, max, alive);
        Ok(true)
    }

    fn publish_health(&mut self, target: EntityId, current: f64, max: f64, alive: bool) {
        self.observers
            .notify(target, &HealthEvent::Changed { current, max });
        self.effects.push(Effect::HealthChanged {
            target,
            current,
            max,
            alive,
        });
    }

    pub fn apply_command(&mut self, command: &Command) {
        let entity_id = command.entity_id();
        let result = match command {
            Command::Attack { entity_id } => {
                self.attempt_attack(*entity_id);
                Ok(())
            }
            Command::Move {
                entity_id,
                transform,
            } => self.move_entity(*entity_id, *transform),
            Command::Heal { entity_id, amount } => self.heal(*entity_id, *amount).map(|_| ()),
            Command::Equip { entity_id, weapon } => self.equip(*entity_id, *weapon),
            Command::SetBlocking {
                entity_id,
                blocking,
            } => self.set_blocking(*entity_id, *blocking),
        };
        if let Err(refusal) = result {
            debug!(entity = entity_id, ?refusal, "command_refused");
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance from tick T to T+1.
    ///
    /// Applies `commands`, then steps every owned entity: attack phases
    /// (hit detection on the strike tick), regeneration, and respawn
    /// timers. Returns the effects produced since the last drain.
    ///
    /// # Panics
    /// If `tick != self.tick()`.
    pub fn advance(&mut self, tick: Tick, commands: &[Command]) -> Vec<Effect> {
        assert_eq!(
            tick, self.tick,
            "advance() tick mismatch: expected {}, got {}",
            self.tick, tick
        );

        for command in commands {
            self.apply_command(command);
        }

        for entity_id in self.authority.owned_by(self.local) {
            self.step_attack(entity_id);
            self.step_regen(entity_id);
            self.step_respawn(entity_id);
        }

        self.tick += 1;
        self.drain_effects()
    }

    /// Take queued effects without advancing (used after inbound messages).
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn step_attack(&mut self, attacker: EntityId) {
        let now = self.tick;
        let Some(entity) = self.entities.get_mut(&attacker) else {
            return;
        };
        let Some(weapon) = entity.weapon else {
            return;
        };
        if entity.attack.advance(now, &weapon) != PhaseStep::Strike {
            return;
        }

        let origin = entity.transform.position;
        let forward = entity.transform.forward;
        let source = DamageSource {
            entity_id: attacker,
            participant: entity.owner,
        };

        let hits = detect_hits(attacker, origin, forward, &weapon, &self.hit_candidates());
        debug!(attacker, tick = now, hits = hits.len(), "attack_strike");

        for target in hits {
            let Some(target_entity) = self.entities.get(&target) else {
                continue;
            };
            if !target_entity.is_damageable() {
                debug!(attacker, target, "hit_target_not_damageable");
                continue;
            }
            if target_entity.owner == self.local {
                let _ = self.apply_damage(target, weapon.damage(), Some(source));
            } else {
                self.effects.push(Effect::DamageRequested {
                    target,
                    owner: target_entity.owner,
                    amount: weapon.damage(),
                    source,
                });
            }
        }
    }

    fn hit_candidates(&self) -> Vec<HitCandidate> {
        self.entities
            .values()
            .flat_map(|entity| {
                entity.colliders.iter().map(move |offset| HitCandidate {
                    root: entity.id,
                    position: entity.transform.position + *offset,
                })
            })
            .collect()
    }

    fn step_regen(&mut self, entity_id: EntityId) {
        let Some((delay_ticks, per_tick)) = self.regen else {
            return;
        };
        let now = self.tick;
        let Some(health) = self
            .entities
            .get_mut(&entity_id)
            .and_then(|e| e.health.as_mut())
        else {
            return;
        };
        let Some(current) = health.regen_step(now, delay_ticks, per_tick) else {
            return;
        };
        let max = health.max();
        // Partial ticks travel in snapshots; reaching full health is broadcast
        if current >= max {
            self.publish_health(entity_id, current, max, true);
        } else {
            self.observers
                .notify(entity_id, &HealthEvent::Changed { current, max });
        }
    }

    fn step_respawn(&mut self, entity_id: EntityId) {
        let now = self.tick;
        let due = self
            .health(entity_id)
            .is_some_and(|health| health.respawn_due(now));
        if !due {
            return;
        }

        let position = self.spawns.pick();
        let Some(entity) = self.entities.get_mut(&entity_id) else {
            return;
        };
        let Some(health) = entity.health.as_mut() else {
            return;
        };
        health.respawn();
        let (current, max) = (health.current(), health.max());
        entity.transform.position = position;
        entity.attack.reset();
        let transform = entity.transform;

        info!(entity = entity_id, tick = now, ?position, "entity_respawned");
        self.observers
            .notify(entity_id, &HealthEvent::Respawned { position });
        self.effects.push(Effect::Respawned {
            entity_id,
            transform,
        });
        self.publish_health(entity_id, current, max, true);
    }

    // ------------------------------------------------------------------
    // Replica updates
    // ------------------------------------------------------------------

    /// Adopt an authoritative health broadcast. Ignored for entities the
    /// local participant owns, since it is the source of that value.
    pub fn apply_health_update(
        &mut self,
        target: EntityId,
        current: f64,
        max: f64,
        alive: bool,
    ) -> ReplicaUpdate {
        if self.is_authoritative(target) {
            return ReplicaUpdate::default();
        }
        let Some(health) = self
            .entities
            .get_mut(&target)
            .and_then(|e| e.health.as_mut())
        else {
            return ReplicaUpdate::default();
        };
        let update = health.overwrite(current, max, alive);
        let (current, max) = (health.current(), health.max());
        self.notify_replica(target, update, current, max, None);
        update
    }

    /// Adopt a death notification. Fires `Died` unless the replica already
    /// saw this death through a health update.
    pub fn apply_death(&mut self, victim: EntityId, killer: Option<DamageSource>) -> bool {
        if self.is_authoritative(victim) {
            return false;
        }
        let Some(health) = self
            .entities
            .get_mut(&victim)
            .and_then(|e| e.health.as_mut())
        else {
            return false;
        };
        let max = health.max();
        let update = health.overwrite(0.0, max, false);
        health.record_killer(killer);
        self.notify_replica(victim, update, 0.0, max, killer);
        update.died
    }

    /// Adopt a respawn broadcast: full health at the new transform.
    pub fn apply_respawn(&mut self, entity_id: EntityId, transform: Transform) -> bool {
        if self.is_authoritative(entity_id) {
            return false;
        }
        let Some(entity) = self.entities.get_mut(&entity_id) else {
            return false;
        };
        entity.transform = transform;
        let Some(health) = entity.health.as_mut() else {
            return false;
        };
        let max = health.max();
        let update = health.overwrite(max, max, true);
        self.observers.notify(
            entity_id,
            &HealthEvent::Respawned {
                position: transform.position,
            },
        );
        if update.changed {
            self.observers
                .notify(entity_id, &HealthEvent::Changed { current: max, max });
        }
        true
    }

    /// Adopt a snapshot for an entity owned elsewhere. Returns false for
    /// owned or unknown entities.
    pub fn apply_snapshot(&mut self, snapshot: &EntitySnapshot) -> bool {
        if self.is_authoritative(snapshot.entity_id) {
            return false;
        }
        let Some(entity) = self.entities.get_mut(&snapshot.entity_id) else {
            return false;
        };
        entity.transform = snapshot.transform;

        let (Some(health), Some(values)) = (entity.health.as_mut(), snapshot.health) else {
            return true;
        };
        let update = health.overwrite(values.current, values.max, values.alive);
        let (current, max) = (health.current(), health.max());
        self.notify_replica(snapshot.entity_id, update, current, max, None);
        true
    }

    fn notify_replica(
        &mut self,
        entity_id: EntityId,
        update: ReplicaUpdate,
        current: f64,
        max: f64,
        killer: Option<DamageSource>,
    ) {
        if update.died {
            self.observers
                .notify(entity_id, &HealthEvent::Died { killer });
        }
        if update.revived {
            let position = self
                .entities
                .get(&entity_id)
                .map(|e| e.transform.position)
                .unwrap_or_default();
            self.observers
                .notify(entity_id, &HealthEvent::Respawned { position });
        }
        if update.changed {
            self.observers
                .notify(entity_id, &HealthEvent::Changed { current, max });
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Snapshots of the entities the local participant owns.
    pub fn owned_snapshots(&self) -> Vec<EntitySnapshot> {
        self.entities
            .values()
            .filter(|e| e.owner == self.local)
            .map(Entity::snapshot)
            .collect()
    }

    /// Snapshots of every entity, sorted by entity id.
    pub fn baseline(&self) -> Vec<EntitySnapshot> {
        self.entities.values().map(Entity::snapshot).collect()
    }

    pub fn entity_snapshot(&self, entity_id: EntityId) -> Option<EntitySnapshot> {
        self.entity(entity_id).map(Entity::snapshot)
    }

    /// Digest of the replicated state (owners, transforms, health).
    ///
    /// Two replicas that converged produce the same digest regardless of
    /// which participant computed it. The tick is deliberately left out.
    pub fn state_digest(&self) -> u64 {
        let mut hasher = Fnv1a64::new();
        for entity in self.entities.values() {
            hasher.update(&entity.id.to_le_bytes());
            hasher.update(&entity.owner.to_le_bytes());
            for value in entity
                .transform
                .position
                .to_array()
                .into_iter()
                .chain(entity.transform.forward.to_array())
            {
                hasher.update(&canonicalize_f64(value).to_le_bytes());
            }
            match &entity.health {
                Some(health) => {
                    hasher.update(&[1]);
                    hasher.update(&canonicalize_f64(health.current()).to_le_bytes());
                    hasher.update(&canonicalize_f64(health.max()).to_le_bytes());
                    hasher.update(&[u8::from(health.is_alive())]);
                }
                None => hasher.update(&[0]),
            }
        }
        hasher.finish()
    }
}
