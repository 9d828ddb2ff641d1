//! Command buffering for the room edge.
//!
//! - Buffer keyed by (participant, tick), commands kept in arrival order
//! - Rate limiting: per-tick limit = ceil(rate_limit_per_sec / tick_rate_hz)

use std::collections::HashMap;

use dungeon_sim::{Command, ParticipantId, Tick};

use crate::validation::{BufferResult, ValidationConfig};

pub struct CommandBuffer {
    config: ValidationConfig,
    buffer: HashMap<(ParticipantId, Tick), Vec<Command>>,
    per_tick_limit: usize,
}

impl CommandBuffer {
    /// Create a new buffer with the per-tick limit derived from `config`.
    pub fn new(config: ValidationConfig) -> Self {
        let per_tick_limit = config
            .rate_limit_per_sec
            .div_ceil(config.tick_rate_hz.max(1)) as usize;

        Self {
            config,
            buffer: HashMap::new(),
            per_tick_limit,
        }
    }

    /// Get the validation config.
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Buffer a command for (participant, tick) unless the per-tick limit
    /// is already reached.
    pub fn try_buffer(
        &mut self,
        participant: ParticipantId,
        tick: Tick,
        command: Command,
    ) -> BufferResult {
        let entry = self.buffer.entry((participant, tick)).or_default();
        if entry.len() >= self.per_tick_limit {
            return BufferResult::RateLimited;
        }
        entry.push(command);
        BufferResult::Accepted
    }

    /// Take the commands for a (participant, tick), in arrival order.
    pub fn take(&mut self, participant: ParticipantId, tick: Tick) -> Vec<Command> {
        self.buffer
            .remove(&(participant, tick))
            .unwrap_or_default()
    }

    /// Evict all buffered entries for ticks before the given tick.
    pub fn evict_before(&mut self, tick: Tick) {
        self.buffer.retain(|&(_, t), _| t >= tick);
    }

    /// Drop everything a departed participant queued.
    pub fn forget(&mut self, participant: ParticipantId) {
        self.buffer.retain(|&(p, _), _| p != participant);
    }

    #[cfg(test)]
    pub fn has_entry(&self, participant: ParticipantId, tick: Tick) -> bool {
        self.buffer.contains_key(&(participant, tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attack(entity_id: u64) -> Command {
        Command::Attack { entity_id }
    }

    #[test]
    fn test_commands_kept_in_arrival_order() {
        let mut buffer = CommandBuffer::new(ValidationConfig::default());
        buffer.try_buffer(1, 5, attack(1));
        buffer.try_buffer(
            1,
            5,
            Command::SetBlocking {
                entity_id: 1,
                blocking: true,
            },
        );

        let taken = buffer.take(1, 5);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0], attack(1));
        assert!(!buffer.has_entry(1, 5));
    }

    #[test]
    fn test_rate_limiting() {
        let config = ValidationConfig {
            max_future_ticks: 120,
            rate_limit_per_sec: 120,
            tick_rate_hz: 60,
        };
        let mut buffer = CommandBuffer::new(config);

        // per_tick_limit = ceil(120/60) = 2
        let results: Vec<_> = (0..5).map(|_| buffer.try_buffer(1, 5, attack(1))).collect();
        let accepted = results
            .iter()
            .filter(|r| **r == BufferResult::Accepted)
            .count();
        assert_eq!(accepted, 2);
        assert_eq!(buffer.take(1, 5).len(), 2);
    }

    #[test]
    fn test_participants_are_isolated() {
        let mut buffer = CommandBuffer::new(ValidationConfig::default());
        buffer.try_buffer(1, 5, attack(1));
        buffer.try_buffer(2, 5, attack(2));
        assert_eq!(buffer.take(2, 5), vec![attack(2)]);
        assert!(buffer.has_entry(1, 5));
    }

    #[test]
    fn test_eviction() {
        let mut buffer = CommandBuffer::new(ValidationConfig::default());
        buffer.try_buffer(1, 5, attack(1));
        buffer.try_buffer(1, 10, attack(1));
        buffer.try_buffer(1, 15, attack(1));

        buffer.evict_before(10);

        assert!(!buffer.has_entry(1, 5));
        assert!(buffer.has_entry(1, 10));
        assert!(buffer.has_entry(1, 15));
    }

    #[test]
    fn test_forget_participant() {
        let mut buffer = CommandBuffer::new(ValidationConfig::default());
        buffer.try_buffer(1, 5, attack(1));
        buffer.try_buffer(2, 5, attack(2));
        buffer.forget(1);
        assert!(!buffer.has_entry(1, 5));
        assert!(buffer.has_entry(2, 5));
    }

    #[test]
    fn test_future_command_not_taken_early() {
        let mut buffer = CommandBuffer::new(ValidationConfig::default());
        buffer.try_buffer(1, 5, attack(1));
        assert!(buffer.take(1, 0).is_empty());
        assert_eq!(buffer.take(1, 5).len(), 1);
    }
}
