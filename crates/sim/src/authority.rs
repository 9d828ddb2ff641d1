//! Authority resolution.
//!
//! Every entity has exactly one owning participant, assigned when the entity
//! is created. Ownership is never renegotiated; it changes only when the
//! owner leaves and the session coordinator announces a migration, or the
//! entity goes away with its owner.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntityId, ParticipantId};

/// What happens to the entities of a participant that leaves the room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrphanPolicy {
    /// Entities are removed together with their owner.
    #[default]
    Despawn,
    /// Entities are handed to the current session host.
    MigrateToHost,
}

/// Outcome for one entity left behind by a departing participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanResolution {
    Despawn(EntityId),
    MigrateTo {
        entity_id: EntityId,
        new_owner: ParticipantId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("entity {entity_id} is already owned by participant {owner}")]
    AlreadyOwned {
        entity_id: EntityId,
        owner: ParticipantId,
    },
    #[error("entity {entity_id} has no registered owner")]
    NotRegistered { entity_id: EntityId },
}

/// Single-owner authority table.
///
/// Each replica keeps an identical copy; the coordinator is the only writer
/// of assignments and migrations, so no two participants can both believe
/// they own an entity.
#[derive(Debug, Clone, Default)]
pub struct AuthorityResolver {
    owners: BTreeMap<EntityId, ParticipantId>,
}

impl AuthorityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the owner of a freshly created entity.
    pub fn assign(
        &mut self,
        entity_id: EntityId,
        owner: ParticipantId,
    ) -> Result<(), AuthorityError> {
        if let Some(&existing) = self.owners.get(&entity_id) {
            return Err(AuthorityError::AlreadyOwned {
                entity_id,
                owner: existing,
            });
        }
        self.owners.insert(entity_id, owner);
        Ok(())
    }

    /// Forget an entity. Returns the previous owner, if any.
    pub fn release(&mut self, entity_id: EntityId) -> Option<ParticipantId> {
        self.owners.remove(&entity_id)
    }

    pub fn owner_of(&self, entity_id: EntityId) -> Option<ParticipantId> {
        self.owners.get(&entity_id).copied()
    }

    pub fn is_authoritative(&self, entity_id: EntityId, participant: ParticipantId) -> bool {
        self.owner_of(entity_id) == Some(participant)
    }

    /// Entities owned by `participant`, in ascending id order.
    pub fn owned_by(&self, participant: ParticipantId) -> Vec<EntityId> {
        self.owners
            .iter()
            .filter(|&(_, &owner)| owner == participant)
            .map(|(&entity_id, _)| entity_id)
            .collect()
    }

    /// Decide what happens to the entities of a departing participant.
    ///
    /// This only computes the resolutions; callers apply them with
    /// [`AuthorityResolver::migrate`] or [`AuthorityResolver::release`].
    /// Migration degrades to despawn when there is no host, or when the host
    /// is the participant that is leaving.
    pub fn resolve_departure(
        &self,
        participant: ParticipantId,
        policy: OrphanPolicy,
        host: Option<ParticipantId>,
    ) -> Vec<OrphanResolution> {
        let heir = host.filter(|&h| h != participant);
        self.owned_by(participant)
            .into_iter()
            .map(|entity_id| match (policy, heir) {
                (OrphanPolicy::MigrateToHost, Some(new_owner)) => OrphanResolution::MigrateTo {
                    entity_id,
                    new_owner,
                },
                _ => OrphanResolution::Despawn(entity_id),
            })
            .collect()
    }

    /// Move ownership of an existing entity. Only valid for coordinator-announced
    /// migrations after the previous owner left.
    pub fn migrate(
        &mut self,
        entity_id: EntityId,
        new_owner: ParticipantId,
    ) -> Result<ParticipantId, AuthorityError> {
        let slot = self
            .owners
            .get_mut(&entity_id)
            .ok_or(AuthorityError::NotRegistered { entity_id })?;
        Ok(std::mem::replace(slot, new_owner))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_owner_assignment() {
        let mut authority = AuthorityResolver::new();
        authority.assign(1, 7).unwrap();

        assert!(authority.is_authoritative(1, 7));
        assert!(!authority.is_authoritative(1, 8));
        assert!(!authority.is_authoritative(2, 7));
    }

    #[test]
    fn test_reassignment_is_rejected() {
        let mut authority = AuthorityResolver::new();
        authority.assign(1, 7).unwrap();

        let err = authority.assign(1, 8).unwrap_err();
        assert_eq!(
            err,
            AuthorityError::AlreadyOwned {
                entity_id: 1,
                owner: 7
            }
        );
        // Original owner untouched
        assert_eq!(authority.owner_of(1), Some(7));
    }

    #[test]
    fn test_owned_by_is_sorted() {
        let mut authority = AuthorityResolver::new();
        authority.assign(5, 1).unwrap();
        authority.assign(2, 1).unwrap();
        authority.assign(3, 2).unwrap();

        assert_eq!(authority.owned_by(1), vec![2, 5]);
        assert_eq!(authority.owned_by(2), vec![3]);
        assert!(authority.owned_by(9).is_empty());
    }

    #[test]
    fn test_departure_despawn_policy() {
        let mut authority = AuthorityResolver::new();
        authority.assign(1, 1).unwrap();
        authority.assign(2, 2).unwrap();

        let resolutions = authority.resolve_departure(1, OrphanPolicy::Despawn, Some(2));
        assert_eq!(resolutions, vec![OrphanResolution::Despawn(1)]);
    }

    #[test]
    fn test_departure_migrates_to_host() {
        let mut authority = AuthorityResolver::new();
        authority.assign(1, 1).unwrap();
        authority.assign(4, 1).unwrap();

        let resolutions = authority.resolve_departure(1, OrphanPolicy::MigrateToHost, Some(2));
        assert_eq!(
            resolutions,
            vec![
                OrphanResolution::MigrateTo {
                    entity_id: 1,
                    new_owner: 2
                },
                OrphanResolution::MigrateTo {
                    entity_id: 4,
                    new_owner: 2
                },
            ]
        );

        assert_eq!(authority.migrate(1, 2), Ok(1));
        assert!(authority.is_authoritative(1, 2));
        assert!(!authority.is_authoritative(1, 1));
    }

    #[test]
    fn test_departing_host_cannot_inherit() {
        let mut authority = AuthorityResolver::new();
        authority.assign(1, 3).unwrap();

        let resolutions = authority.resolve_departure(3, OrphanPolicy::MigrateToHost, Some(3));
        assert_eq!(resolutions, vec![OrphanResolution::Despawn(1)]);

        let resolutions = authority.resolve_departure(3, OrphanPolicy::MigrateToHost, None);
        assert_eq!(resolutions, vec![OrphanResolution::Despawn(1)]);
    }

    #[test]
    fn test_migrate_unknown_entity() {
        let mut authority = AuthorityResolver::new();
        assert_eq!(
            authority.migrate(9, 1),
            Err(AuthorityError::NotRegistered { entity_id: 9 })
        );
    }
}
