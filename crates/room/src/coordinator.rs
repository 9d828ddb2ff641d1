//! Session coordinator.
//!
//! Owns membership, spawn assignment, the room's authority table, the round
//! timer and kill scores. It is the only writer of ownership: entity ids are
//! allocated and assigned here and every replica mirrors the result.

use std::collections::BTreeMap;

use dungeon_sim::{
    AuthorityError, AuthorityResolver, DamageSource, EntityId, OrphanPolicy, OrphanResolution,
    ParticipantId, ROOM_PARTICIPANT, SpawnTable, Tick,
};
use glam::DVec3;
use thiserror::Error;
use tracing::info;

use crate::config::RoomConfig;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEndReason {
    TimeExpired,
    ScoreReached { winner: ParticipantId },
}

impl RoundEndReason {
    /// Get the winner, if the round ended on score.
    pub fn winner(&self) -> Option<ParticipantId> {
        match self {
            Self::TimeExpired => None,
            Self::ScoreReached { winner } => Some(*winner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room is closed")]
    RoomClosed,
    #[error("room is full ({max} players)")]
    RoomFull { max: usize },
    #[error("participant {0} already joined")]
    AlreadyJoined(ParticipantId),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// What the coordinator hands a joining participant.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnGrant {
    pub participant: ParticipantId,
    pub entity_id: EntityId,
    pub spawn_position: DVec3,
    pub tick_rate_hz: u32,
    pub host: ParticipantId,
}

/// Result of a participant leaving.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub session: Session,
    pub resolutions: Vec<OrphanResolution>,
    /// Host after the departure; `None` when the room is now empty.
    pub host: Option<ParticipantId>,
    pub host_changed: bool,
}

#[derive(Debug)]
pub struct SessionCoordinator {
    max_players: usize,
    tick_rate_hz: u32,
    round_duration_ticks: Tick,
    win_score: u32,
    orphan_policy: OrphanPolicy,
    /// In join order; the first entry is the host.
    sessions: Vec<Session>,
    authority: AuthorityResolver,
    spawns: SpawnTable,
    next_entity_id: EntityId,
    open: bool,
    remaining_ticks: Tick,
    round_end: Option<RoundEndReason>,
    round_number: u32,
    scores: BTreeMap<ParticipantId, u32>,
}

impl SessionCoordinator {
    /// Create a new coordinator for an empty room.
    pub fn new(config: &RoomConfig) -> Self {
        Self {
            max_players: config.max_players,
            tick_rate_hz: config.tick_rate_hz,
            round_duration_ticks: config.round_duration_ticks(),
            win_score: config.win_score,
            orphan_policy: config.orphan_policy,
            sessions: Vec::new(),
            authority: AuthorityResolver::new(),
            spawns: SpawnTable::new(config.spawn.clone(), config.seed),
            next_entity_id: 1,
            open: true,
            remaining_ticks: config.round_duration_ticks(),
            round_end: None,
            round_number: 1,
            scores: BTreeMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Admit a participant: allocate its entity, pick a spawn point, and
    /// register ownership.
    pub fn join(&mut self, participant: ParticipantId, now: Tick) -> Result<SpawnGrant, JoinError> {
        if self.is_member(participant) {
            return Err(JoinError::AlreadyJoined(participant));
        }
        if !self.open || self.round_end.is_some() {
            return Err(JoinError::RoomClosed);
        }
        if self.is_full() {
            return Err(JoinError::RoomFull {
                max: self.max_players,
            });
        }

        let entity_id = self.allocate_entity_id();
        self.authority.assign(entity_id, participant)?;
        let spawn_position = self.spawns.pick();

        self.sessions
            .push(Session::new(participant, entity_id, now));
        self.scores.insert(participant, 0);

        let host = self.host().unwrap_or(participant);
        info!(
            participant,
            entity = entity_id,
            ?spawn_position,
            host,
            players = self.sessions.len(),
            "participant_joined"
        );

        Ok(SpawnGrant {
            participant,
            entity_id,
            spawn_position,
            tick_rate_hz: self.tick_rate_hz,
            host,
        })
    }

    /// Remove a participant and resolve its entities per the orphan policy.
    /// Returns `None` for non-members.
    pub fn leave(&mut self, participant: ParticipantId) -> Option<Departure> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.participant == participant)?;
        let previous_host = self.host();
        let session = self.sessions.remove(index);
        self.scores.remove(&participant);

        let host = self.host();
        let resolutions = self
            .authority
            .resolve_departure(participant, self.orphan_policy, host);
        for resolution in &resolutions {
            match *resolution {
                OrphanResolution::Despawn(entity_id) => {
                    self.authority.release(entity_id);
                }
                OrphanResolution::MigrateTo {
                    entity_id,
                    new_owner,
                } => {
                    // Resolutions only name registered entities
                    let _ = self.authority.migrate(entity_id, new_owner);
                }
            }
        }

        let host_changed = host != previous_host;
        info!(
            participant,
            ?host,
            host_changed,
            orphans = resolutions.len(),
            players = self.sessions.len(),
            "participant_left"
        );

        Some(Departure {
            session,
            resolutions,
            host,
            host_changed,
        })
    }

    /// Allocate a prop owned by the room.
    pub fn allocate_prop(&mut self) -> Result<EntityId, AuthorityError> {
        let entity_id = self.allocate_entity_id();
        self.authority.assign(entity_id, ROOM_PARTICIPANT)?;
        Ok(entity_id)
    }

    fn allocate_entity_id(&mut self) -> EntityId {
        let entity_id = self.next_entity_id;
        self.next_entity_id += 1;
        entity_id
    }

    /// Sessions in join order.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Get a participant's session.
    pub fn session(&self, participant: ParticipantId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.participant == participant)
    }

    /// Participants in join order.
    pub fn participants(&self) -> Vec<ParticipantId> {
        self.sessions.iter().map(|s| s.participant).collect()
    }

    /// Check if a participant is in the room.
    pub fn is_member(&self, participant: ParticipantId) -> bool {
        self.session(participant).is_some()
    }

    /// Earliest-joined remaining participant.
    pub fn host(&self) -> Option<ParticipantId> {
        self.sessions.first().map(|s| s.participant)
    }

    /// Get the number of participants.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no participant remains.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Check if the room has reached `max_players`.
    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_players
    }

    /// True when a join would be admitted (round running, room not full).
    pub fn accepts_joins(&self) -> bool {
        self.open && self.round_end.is_none() && !self.is_full()
    }

    /// Get the room's authority table.
    pub fn authority(&self) -> &AuthorityResolver {
        &self.authority
    }

    // ------------------------------------------------------------------
    // Round
    // ------------------------------------------------------------------

    /// Count a death toward the killer's score. Returns the round end if
    /// this kill reached the win score.
    pub fn record_death(
        &mut self,
        victim: EntityId,
        killer: Option<DamageSource>,
    ) -> Option<RoundEndReason> {
        if self.round_end.is_some() {
            return None;
        }
        let killer = killer?;
        if self.authority.owner_of(victim) == Some(killer.participant) {
            return None;
        }
        let score = self.scores.get_mut(&killer.participant)?;
        *score += 1;
        let score = *score;
        info!(
            victim,
            killer = killer.participant,
            score,
            "kill_recorded"
        );

        if self.win_score > 0 && score >= self.win_score {
            let reason = RoundEndReason::ScoreReached {
                winner: killer.participant,
            };
            self.end_round(reason);
            return Some(reason);
        }
        None
    }

    /// Count the round timer down by one tick. Returns the round end when
    /// the timer expires; a stopped timer never fires again.
    pub fn advance_round(&mut self) -> Option<RoundEndReason> {
        if self.round_end.is_some() {
            return None;
        }
        self.remaining_ticks = self.remaining_ticks.saturating_sub(1);
        if self.remaining_ticks == 0 {
            let reason = RoundEndReason::TimeExpired;
            self.end_round(reason);
            return Some(reason);
        }
        None
    }

    fn end_round(&mut self, reason: RoundEndReason) {
        self.round_end = Some(reason);
        self.open = false;
        info!(
            round = self.round_number,
            ?reason,
            scores = ?self.scores,
            "round_ended"
        );
    }

    /// Start a fresh round: full timer, zeroed scores, room reopened.
    pub fn restart_round(&mut self) {
        self.round_number += 1;
        self.remaining_ticks = self.round_duration_ticks;
        self.round_end = None;
        self.open = true;
        for score in self.scores.values_mut() {
            *score = 0;
        }
        info!(round = self.round_number, "round_started");
    }

    /// Get why the current round ended, if it has.
    pub fn round_end(&self) -> Option<RoundEndReason> {
        self.round_end
    }

    /// Get the current round number, starting at 1.
    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    /// Get the ticks left before the round times out.
    pub fn remaining_ticks(&self) -> Tick {
        self.remaining_ticks
    }

    /// Get a participant's score this round.
    pub fn score(&self, participant: ParticipantId) -> Option<u32> {
        self.scores.get(&participant).copied()
    }

    /// Get every score this round.
    pub fn scores(&self) -> &BTreeMap<ParticipantId, u32> {
        &self.scores
    }
}
