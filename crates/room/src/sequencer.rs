//! In-order reassembly of reliable frames.
//!
//! Frames are keyed by (sender, seq). Each sender's frames are released
//! strictly in sequence order, each exactly once. Frames more than
//! `max_pending` ahead of the next expected sequence are dropped.

use std::collections::{BTreeMap, HashMap, VecDeque};

use dungeon_sim::ParticipantId;
use dungeon_wire::{ReliableEnvelope, Seq};

/// Result of pushing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// Accepted; `released` frames became ready (possibly zero).
    Accepted { released: usize },
    /// Already delivered or already buffered.
    Duplicate,
    /// Outside the pending window.
    TooFarAhead { seq: Seq, next: Seq },
}

#[derive(Debug, Default)]
struct SenderState {
    next: Seq,
    pending: BTreeMap<Seq, ReliableEnvelope>,
}

#[derive(Debug)]
pub struct ReliableSequencer {
    max_pending: usize,
    senders: HashMap<ParticipantId, SenderState>,
    ready: VecDeque<ReliableEnvelope>,
}

impl ReliableSequencer {
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending,
            senders: HashMap::new(),
            ready: VecDeque::new(),
        }
    }

    pub fn push(&mut self, envelope: ReliableEnvelope) -> PushResult {
        let state = self.senders.entry(envelope.sender).or_default();
        let seq = envelope.seq;

        if seq < state.next || state.pending.contains_key(&seq) {
            return PushResult::Duplicate;
        }
        if seq - state.next >= self.max_pending as Seq {
            return PushResult::TooFarAhead {
                seq,
                next: state.next,
            };
        }

        state.pending.insert(seq, envelope);

        let mut released = 0;
        while let Some(ready) = state.pending.remove(&state.next) {
            self.ready.push_back(ready);
            state.next += 1;
            released += 1;
        }
        PushResult::Accepted { released }
    }

    /// Frames ready for dispatch, in release order.
    pub fn drain_ready(&mut self) -> Vec<ReliableEnvelope> {
        self.ready.drain(..).collect()
    }

    /// Next sequence number expected from `sender`.
    pub fn next_expected(&self, sender: ParticipantId) -> Seq {
        self.senders.get(&sender).map_or(0, |s| s.next)
    }

    pub fn pending_len(&self, sender: ParticipantId) -> usize {
        self.senders.get(&sender).map_or(0, |s| s.pending.len())
    }

    /// Drop all state for a departed sender.
    pub fn forget(&mut self, sender: ParticipantId) {
        self.senders.remove(&sender);
        self.ready.retain(|envelope| envelope.sender != sender);
    }
}
