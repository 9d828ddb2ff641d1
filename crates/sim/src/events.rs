//! Health observers.
//!
//! Callbacks are registered per entity and run synchronously, in
//! registration order, inside the tick that caused the change.

use std::fmt;

use glam::DVec3;

use crate::EntityId;
use crate::health::DamageSource;

/// Something observable happened to an entity's health.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthEvent {
    Changed { current: f64, max: f64 },
    Died { killer: Option<DamageSource> },
    Respawned { position: DVec3 },
}

/// Handle returned by [`Observers::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes the subscription impossible to remove"]
pub struct Subscription(u64);

type Callback = Box<dyn FnMut(EntityId, &HealthEvent)>;

struct Entry {
    id: Subscription,
    entity_id: EntityId,
    callback: Callback,
}

#[derive(Default)]
pub struct Observers {
    next_id: u64,
    entries: Vec<Entry>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscriptions", &self.entries.len())
            .finish()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, entity_id: EntityId, callback: F) -> Subscription
    where
        F: FnMut(EntityId, &HealthEvent) + 'static,
    {
        let id = Subscription(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            entity_id,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns false if the handle was already removed.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != subscription);
        self.entries.len() != before
    }

    /// Drop every subscription on a despawned entity.
    pub fn clear_entity(&mut self, entity_id: EntityId) {
        self.entries.retain(|entry| entry.entity_id != entity_id);
    }

    pub fn notify(&mut self, entity_id: EntityId, event: &HealthEvent) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|entry| entry.entity_id == entity_id)
        {
            (entry.callback)(entity_id, event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
