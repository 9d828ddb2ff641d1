//! Validation at the room edge.
//!
//! Two gates:
//! - Commands submitted by a participant for a tick:
//!   - late: DROP
//!   - too far in the future: DROP
//!   - non-finite payload: DROP
//!   - rate limit exceeded: DROP
//! - Reliable messages received by a peer: the sender must hold authority
//!   over what it reports on, and damage requests must reach the owner.

use dungeon_sim::{Command, EntityId, ParticipantId, ROOM_PARTICIPANT, Tick, World};
use dungeon_wire::Body;

use crate::input_buffer::CommandBuffer;

/// Command validation configuration.
#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    pub max_future_ticks: u64,
    pub rate_limit_per_sec: u32,
    pub tick_rate_hz: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_future_ticks: 120,
            rate_limit_per_sec: 120,
            tick_rate_hz: 60,
        }
    }
}

/// Result of command validation.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Command accepted and buffered.
    Accepted,
    /// Dropped: NaN or Inf in the payload.
    DroppedNonFinite,
    /// Dropped: tick is below the current tick.
    DroppedLate { tick: Tick, current: Tick },
    /// Dropped: tick is too far in the future.
    DroppedTooFuture { tick: Tick, max: Tick },
    /// Dropped: rate limit exceeded.
    DroppedRateLimit,
    /// Dropped: participant is not in the room.
    DroppedUnknownParticipant,
}

impl CommandResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Result of attempting to buffer a command.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferResult {
    Accepted,
    RateLimited,
}

fn is_finite_command(command: &Command) -> bool {
    match command {
        Command::Move { transform, .. } => {
            transform.position.is_finite() && transform.forward.is_finite()
        }
        Command::Heal { amount, .. } => amount.is_finite(),
        Command::Equip {
            weapon: Some(spec), ..
        } => [
            spec.damage,
            spec.range,
            spec.arc_degrees,
            spec.cooldown_secs,
            spec.duration_secs,
        ]
        .iter()
        .all(|v| v.is_finite()),
        Command::Attack { .. } | Command::Equip { weapon: None, .. } | Command::SetBlocking { .. } => {
            true
        }
    }
}

/// Validate and buffer a command.
///
/// Authority over the commanded entity is not checked here; the owner's
/// world ignores commands for entities it does not control.
pub fn validate_command(
    command: &Command,
    tick: Tick,
    current_tick: Tick,
    buffer: &mut CommandBuffer,
    participant: ParticipantId,
) -> CommandResult {
    if !is_finite_command(command) {
        return CommandResult::DroppedNonFinite;
    }

    if tick < current_tick {
        return CommandResult::DroppedLate {
            tick,
            current: current_tick,
        };
    }

    let max_tick = current_tick + buffer.config().max_future_ticks;
    if tick > max_tick {
        return CommandResult::DroppedTooFuture { tick, max: max_tick };
    }

    match buffer.try_buffer(participant, tick, command.clone()) {
        BufferResult::Accepted => CommandResult::Accepted,
        BufferResult::RateLimited => CommandResult::DroppedRateLimit,
    }
}

/// Verdict on an inbound reliable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageValidation {
    Accepted,
    /// Sender does not own the entity it reports on, or a coordinator-only
    /// message came from a participant.
    NotAuthority {
        entity_id: Option<EntityId>,
        sender: ParticipantId,
    },
    /// A damage request reached a participant that does not own the target.
    NotOwner { entity_id: EntityId },
    UnknownEntity { entity_id: EntityId },
    InvalidAmount,
}

impl MessageValidation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Check an inbound message against the receiving replica's authority view.
pub fn validate_message(world: &World, sender: ParticipantId, body: &Body) -> MessageValidation {
    let owned_by_sender = |entity_id: EntityId| match world.authority().owner_of(entity_id) {
        None => MessageValidation::UnknownEntity { entity_id },
        Some(owner) if owner == sender => MessageValidation::Accepted,
        Some(_) => MessageValidation::NotAuthority {
            entity_id: Some(entity_id),
            sender,
        },
    };
    let from_room = || {
        if sender == ROOM_PARTICIPANT {
            MessageValidation::Accepted
        } else {
            MessageValidation::NotAuthority {
                entity_id: None,
                sender,
            }
        }
    };

    match body {
        Body::AttackTriggered(msg) => owned_by_sender(msg.attacker),
        Body::DamageRequest(msg) => {
            if !msg.amount.is_finite() || msg.amount < 0.0 {
                return MessageValidation::InvalidAmount;
            }
            if msg.source.as_ref().is_some_and(|s| s.participant != sender) {
                return MessageValidation::NotAuthority {
                    entity_id: Some(msg.target),
                    sender,
                };
            }
            match world.authority().owner_of(msg.target) {
                None => MessageValidation::UnknownEntity {
                    entity_id: msg.target,
                },
                Some(owner) if owner == world.local() => MessageValidation::Accepted,
                Some(_) => MessageValidation::NotOwner {
                    entity_id: msg.target,
                },
            }
        }
        Body::HealthChanged(msg) => {
            if !msg.current.is_finite() || !msg.max.is_finite() {
                return MessageValidation::InvalidAmount;
            }
            owned_by_sender(msg.target)
        }
        Body::Died(msg) => owned_by_sender(msg.victim),
        Body::Respawned(msg) => owned_by_sender(msg.entity_id),
        Body::EntitySpawned(_)
        | Body::EntityDespawned(_)
        | Body::AuthorityMigrated(_)
        | Body::RoundEnded(_) => from_room(),
    }
}
