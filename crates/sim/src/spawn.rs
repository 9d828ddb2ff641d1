//! Spawn point selection.

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Where new and respawning players may appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Configured spawn points. When empty, the fallback region is used.
    pub points: Vec<DVec3>,
    /// Fallback region spans `[-half_extent, half_extent]` on x and z.
    pub fallback_half_extent: f64,
    /// Fallback spawn height.
    pub fallback_height: f64,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            fallback_half_extent: 10.0,
            fallback_height: 2.0,
        }
    }
}

impl SpawnConfig {
    /// True if `position` is one this configuration can produce.
    pub fn contains(&self, position: DVec3) -> bool {
        if self.points.is_empty() {
            let extent = self.fallback_half_extent;
            position.x.abs() <= extent
                && position.z.abs() <= extent
                && position.y == self.fallback_height
        } else {
            self.points.contains(&position)
        }
    }
}

/// Seeded picker over a [`SpawnConfig`].
#[derive(Debug, Clone)]
pub struct SpawnTable {
    config: SpawnConfig,
    rng: StdRng,
}

impl SpawnTable {
    pub fn new(config: SpawnConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &SpawnConfig {
        &self.config
    }

    /// Pick uniformly among configured points, or uniformly inside the
    /// fallback region when none are configured.
    pub fn pick(&mut self) -> DVec3 {
        if self.config.points.is_empty() {
            let extent = self.config.fallback_half_extent.abs();
            if extent == 0.0 {
                return DVec3::new(0.0, self.config.fallback_height, 0.0);
            }
            DVec3::new(
                self.rng.gen_range(-extent..=extent),
                self.config.fallback_height,
                self.rng.gen_range(-extent..=extent),
            )
        } else {
            let index = self.rng.gen_range(0..self.config.points.len());
            self.config.points[index]
        }
    }
}
