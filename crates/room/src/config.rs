//! Room configuration.
//!
//! Loaded from RON. Every field has a default carrying the shipped tuning,
//! so a config file only needs the values it overrides.

use std::path::{Path, PathBuf};

use dungeon_sim::{HealthSpec, OrphanPolicy, SpawnConfig, Tick, WeaponSpec, WorldConfig, seconds_to_ticks};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::ValidationConfig;

/// Maximum participants per room.
pub const DEFAULT_MAX_PLAYERS: usize = 4;

/// Round length.
pub const DEFAULT_ROUND_DURATION_SECS: f64 = 600.0;

/// Kills needed to win a round.
pub const DEFAULT_WIN_SCORE: u32 = 10;

/// Clients with a different version string are refused by the lobby.
pub const DEFAULT_GAME_VERSION: &str = "0.1";

/// Snapshot cadence (10 Hz at the default tick rate).
pub const DEFAULT_SNAPSHOT_INTERVAL_TICKS: u64 = 6;

/// Reliable frames buffered per sender ahead of the next expected sequence.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),

    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Command buffering limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandLimits {
    /// How far ahead of the current tick a command may target.
    pub max_future_ticks: u64,
    pub rate_limit_per_sec: u32,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            max_future_ticks: 120,
            rate_limit_per_sec: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub game_version: String,
    pub max_players: usize,
    pub tick_rate_hz: u32,
    pub round_duration_secs: f64,
    /// Kills that end the round. Zero disables score-based round end.
    pub win_score: u32,
    pub snapshot_interval_ticks: u64,
    pub max_pending_frames: usize,
    /// Seeds the coordinator's spawn table and every participant's
    /// respawn table.
    pub seed: u64,
    pub orphan_policy: OrphanPolicy,
    pub health: HealthSpec,
    pub weapon: WeaponSpec,
    pub spawn: SpawnConfig,
    pub commands: CommandLimits,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            game_version: DEFAULT_GAME_VERSION.to_string(),
            max_players: DEFAULT_MAX_PLAYERS,
            tick_rate_hz: dungeon_sim::DEFAULT_TICK_RATE_HZ,
            round_duration_secs: DEFAULT_ROUND_DURATION_SECS,
            win_score: DEFAULT_WIN_SCORE,
            snapshot_interval_ticks: DEFAULT_SNAPSHOT_INTERVAL_TICKS,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            seed: 0,
            orphan_policy: OrphanPolicy::default(),
            health: HealthSpec::default(),
            weapon: WeaponSpec::default(),
            spawn: SpawnConfig::default(),
            commands: CommandLimits::default(),
        }
    }
}

impl RoomConfig {
    /// Parse and validate a RON document.
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&source)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }
        fn non_negative(value: f64) -> bool {
            value.is_finite() && value >= 0.0
        }
        fn positive(value: f64) -> bool {
            value.is_finite() && value > 0.0
        }

        if self.game_version.trim().is_empty() {
            return Err(invalid("game_version", "must not be empty"));
        }
        if self.max_players == 0 {
            return Err(invalid("max_players", "must be at least 1"));
        }
        if self.tick_rate_hz == 0 {
            return Err(invalid("tick_rate_hz", "must be positive"));
        }
        if !positive(self.round_duration_secs) {
            return Err(invalid("round_duration_secs", "must be a positive number"));
        }
        if self.snapshot_interval_ticks == 0 {
            return Err(invalid("snapshot_interval_ticks", "must be positive"));
        }
        if self.max_pending_frames == 0 {
            return Err(invalid("max_pending_frames", "must be positive"));
        }
        if self.commands.rate_limit_per_sec == 0 {
            return Err(invalid("commands.rate_limit_per_sec", "must be positive"));
        }

        if !positive(self.health.max_health) {
            return Err(invalid("health.max_health", "must be a positive number"));
        }
        if !non_negative(self.health.respawn_delay_secs) {
            return Err(invalid("health.respawn_delay_secs", "must be >= 0"));
        }
        if let Some(regen) = self.health.regen
            && !(non_negative(regen.rate_per_sec) && non_negative(regen.delay_secs))
        {
            return Err(invalid("health.regen", "rate and delay must be >= 0"));
        }

        if !non_negative(self.weapon.damage) {
            return Err(invalid("weapon.damage", "must be >= 0"));
        }
        if !positive(self.weapon.range) {
            return Err(invalid("weapon.range", "must be a positive number"));
        }
        if !positive(self.weapon.arc_degrees) || self.weapon.arc_degrees > 360.0 {
            return Err(invalid("weapon.arc_degrees", "must be in (0, 360]"));
        }
        if !non_negative(self.weapon.cooldown_secs) || !non_negative(self.weapon.duration_secs) {
            return Err(invalid("weapon", "cooldown and duration must be >= 0"));
        }

        if !non_negative(self.spawn.fallback_half_extent) || !self.spawn.fallback_height.is_finite() {
            return Err(invalid("spawn", "fallback region must be finite"));
        }
        if self.spawn.points.iter().any(|p| !p.is_finite()) {
            return Err(invalid("spawn.points", "must be finite"));
        }
        Ok(())
    }

    /// Parameters for each participant's world replica.
    pub fn world_config(&self) -> WorldConfig {
        WorldConfig {
            tick_rate_hz: self.tick_rate_hz,
            health: self.health.clone(),
            weapon: self.weapon,
            spawn: self.spawn.clone(),
            seed: self.seed,
        }
    }

    pub fn round_duration_ticks(&self) -> Tick {
        seconds_to_ticks(self.round_duration_secs, self.tick_rate_hz)
    }

    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            max_future_ticks: self.commands.max_future_ticks,
            rate_limit_per_sec: self.commands.rate_limit_per_sec,
            tick_rate_hz: self.tick_rate_hz,
        }
    }
}
