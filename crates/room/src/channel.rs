//! State channel: reliable-ordered messages plus latest-wins snapshot slots.
//!
//! Reliable messages are encoded as [`ReliableEnvelope`] frames with one
//! sequence counter per (sender, recipient) pair. A recipient that is not
//! connected when a message is sent never receives it.
//!
//! Snapshot slots hold one entry per entity; a snapshot only replaces a
//! slot when its tick is strictly newer.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use dungeon_sim::{EntityId, ParticipantId, Tick};
use dungeon_wire::{Body, EntitySnapshotProto, ReliableEnvelope, Seq, SnapshotProto, encode_envelope};
use tracing::debug;

/// Who a reliable message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    /// Every connected participant, the sender included.
    All,
    /// Every connected participant except the sender.
    Others,
    Only(ParticipantId),
}

/// Outcome of one send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub queued: usize,
    pub dropped: usize,
}

/// Latest known state of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSlot {
    pub tick: Tick,
    pub sender: ParticipantId,
    pub entity: EntitySnapshotProto,
}

#[derive(Debug, Default)]
pub struct StateChannel {
    connected: BTreeSet<ParticipantId>,
    next_seq: HashMap<(ParticipantId, ParticipantId), Seq>,
    inbound: BTreeMap<ParticipantId, VecDeque<Vec<u8>>>,
    slots: BTreeMap<EntityId, SnapshotSlot>,
}

impl StateChannel {
    /// Create a new channel with no participants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a participant so it can send and receive.
    pub fn connect(&mut self, participant: ParticipantId) {
        self.connected.insert(participant);
        self.inbound.entry(participant).or_default();
    }

    /// Disconnect a participant, discarding its undelivered frames.
    /// Returns how many frames were discarded.
    pub fn disconnect(&mut self, participant: ParticipantId) -> usize {
        self.connected.remove(&participant);
        self.next_seq
            .retain(|&(sender, recipient), _| sender != participant && recipient != participant);
        self.inbound
            .remove(&participant)
            .map_or(0, |queue| queue.len())
    }

    /// Check if a participant is connected.
    pub fn is_connected(&self, participant: ParticipantId) -> bool {
        self.connected.contains(&participant)
    }

    /// Connected participants in id order.
    pub fn connected(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.connected.iter().copied()
    }

    /// Queue a reliable message for every resolved recipient.
    pub fn send(&mut self, sender: ParticipantId, recipients: Recipients, body: Body) -> SendReport {
        let targets: Vec<ParticipantId> = match recipients {
            Recipients::All => self.connected.iter().copied().collect(),
            Recipients::Others => self
                .connected
                .iter()
                .copied()
                .filter(|&p| p != sender)
                .collect(),
            Recipients::Only(p) => vec![p],
        };

        let mut report = SendReport::default();
        for recipient in targets {
            if !self.connected.contains(&recipient) {
                debug!(sender, recipient, kind = body.kind(), "reliable_dropped_disconnected");
                report.dropped += 1;
                continue;
            }
            let counter = self.next_seq.entry((sender, recipient)).or_insert(0);
            let envelope = ReliableEnvelope {
                sender,
                seq: *counter,
                body: Some(body.clone()),
            };
            *counter += 1;
            self.inbound
                .entry(recipient)
                .or_default()
                .push_back(encode_envelope(&envelope));
            report.queued += 1;
        }
        report
    }

    /// Push a raw frame into a recipient's queue, as a transport would.
    pub fn push_frame(&mut self, recipient: ParticipantId, frame: Vec<u8>) -> bool {
        if !self.connected.contains(&recipient) {
            return false;
        }
        self.inbound.entry(recipient).or_default().push_back(frame);
        true
    }

    /// Take every frame waiting for `recipient`.
    pub fn take_inbound(&mut self, recipient: ParticipantId) -> Vec<Vec<u8>> {
        self.inbound
            .get_mut(&recipient)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Get the total number of undelivered frames.
    pub fn pending_frames(&self) -> usize {
        self.inbound.values().map(VecDeque::len).sum()
    }

    /// Store a snapshot. Returns the number of slots it replaced or filled.
    pub fn publish_snapshot(&mut self, snapshot: SnapshotProto) -> usize {
        let mut updated = 0;
        for entity in snapshot.entities {
            let newer = self
                .slots
                .get(&entity.entity_id)
                .is_none_or(|slot| snapshot.tick > slot.tick);
            if newer {
                self.slots.insert(
                    entity.entity_id,
                    SnapshotSlot {
                        tick: snapshot.tick,
                        sender: snapshot.sender,
                        entity,
                    },
                );
                updated += 1;
            }
        }
        updated
    }

    /// Get the latest snapshot slot for an entity.
    pub fn slot(&self, entity_id: EntityId) -> Option<&SnapshotSlot> {
        self.slots.get(&entity_id)
    }

    /// Slots in entity id order.
    pub fn slots(&self) -> impl Iterator<Item = &SnapshotSlot> {
        self.slots.values()
    }

    /// Drop an entity's snapshot slot. Returns false if there was none.
    pub fn remove_slot(&mut self, entity_id: EntityId) -> bool {
        self.slots.remove(&entity_id).is_some()
    }
}
