//! Participant membership records.

use dungeon_sim::{EntityId, ParticipantId, Tick};

/// A participant's membership in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub participant: ParticipantId,
    /// The player entity this participant controls.
    pub entity_id: EntityId,
    /// Room tick at which the participant joined.
    pub joined_at: Tick,
}

impl Session {
    pub fn new(participant: ParticipantId, entity_id: EntityId, joined_at: Tick) -> Self {
        Self {
            participant,
            entity_id,
            joined_at,
        }
    }
}
