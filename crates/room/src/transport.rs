//! Room lifecycle events reported by the transport.

use dungeon_sim::ParticipantId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport link to the relay is up.
    Connected,
    /// The local participant entered the room.
    JoinedRoom { participant: ParticipantId },
    /// Another participant entered the room.
    PlayerEntered { participant: ParticipantId },
    PlayerLeft { participant: ParticipantId },
    /// The link to a participant failed.
    Disconnected {
        participant: ParticipantId,
        reason: String,
    },
}

impl TransportEvent {
    pub fn participant(&self) -> Option<ParticipantId> {
        match self {
            Self::Connected => None,
            Self::JoinedRoom { participant }
            | Self::PlayerEntered { participant }
            | Self::PlayerLeft { participant }
            | Self::Disconnected { participant, .. } => Some(*participant),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::JoinedRoom { .. } => "joined_room",
            Self::PlayerEntered { .. } => "player_entered",
            Self::PlayerLeft { .. } => "player_left",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}
