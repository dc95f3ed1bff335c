//! Water flow configuration.
//!
//! Rule thresholds live in [`constants`] and are fixed at compile time: they
//! shape how water looks, and changing one is a tuning decision. Scheduling
//! and budget values live in [`WaterFlowConfig`], a runtime resource that can
//! be loaded from a RON file or picked from a [`WaterFlowPreset`].

use bevy_ecs::resource::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compile-time flow rule constants.
pub mod constants {
    use crate::world::WaterLevel;

    /// A waterfall landing never drops below this level.
    pub const WATERFALL_LANDING_MIN_LEVEL: WaterLevel = 6;

    /// Water above must be deeper than this to feed the cell below it.
    pub const FEEDING_ABOVE_MIN_LEVEL: WaterLevel = 2;

    /// Floor for a cell fed from above (`max(above - 1, this)`).
    pub const FED_FROM_ABOVE_MIN_LEVEL: WaterLevel = 4;

    /// Level of any flowing cell directly next to a source.
    pub const SOURCE_ADJACENT_LEVEL: WaterLevel = 6;

    /// A neighbour at least this deep carries its strength over.
    pub const STRONG_NEIGHBOR_MIN_LEVEL: WaterLevel = 5;

    /// Floor for a cell carried by a strong neighbour.
    pub const STRONG_NEIGHBOR_FLOOR: WaterLevel = 4;

    /// Lowest level a still-justified cell settles at. Shallower trickles are
    /// avoided: a cell either flows meaningfully or evaporates.
    pub const DECAY_FLOOR_LEVEL: WaterLevel = 3;

    /// Flowing cells spread horizontally only from this level up.
    pub const SPREAD_MIN_LEVEL: WaterLevel = 3;

    /// Floors for horizontal spreading (`max(floor, level - 1)`).
    pub const SPREAD_SOURCE_FLOOR: WaterLevel = 4;
    pub const SPREAD_FLOWING_FLOOR: WaterLevel = 2;

    /// Flowing cells search for ledges only from this level up.
    pub const STEP_DOWN_MIN_LEVEL: WaterLevel = 4;

    /// Manhattan radius of the ledge search.
    pub const STEP_DOWN_RADIUS: i32 = 3;

    /// Floors for a step toward a ledge (`max(floor, level - 1)`).
    pub const STEP_DOWN_SOURCE_FLOOR: WaterLevel = 5;
    pub const STEP_DOWN_FLOWING_FLOOR: WaterLevel = 3;

    /// Flowing cells at or above this level propose flows every step, even
    /// when they are not part of the batch.
    pub const ALWAYS_ACTIVE_MIN_LEVEL: WaterLevel = 3;

    /// Deepest a waterfall scan looks before treating the fall as open.
    pub const WATERFALL_SCAN_DEPTH: i32 = 64;

    /// An air gap above solid ground must be at least this tall to count as
    /// a waterfall. Shorter drops are handled as an immediate drop.
    pub const MIN_WATERFALL_HEIGHT: i32 = 2;

    /// Water never flows below this height.
    pub const WORLD_FLOOR_Y: i32 = -64;
}

/// Runtime configuration for the water flow scheduler.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterFlowConfig {
    /// Whether the simulation ticks at all.
    pub enabled: bool,

    /// Step interval (seconds) for small populations. Slower steps read
    /// better when only a few cells are moving.
    pub slow_interval: f32,
    /// Step interval for medium populations.
    pub base_interval: f32,
    /// Step interval for large populations.
    pub fast_interval: f32,

    /// Populations up to this size use `slow_interval`.
    pub small_population: usize,
    /// Populations above this size use `fast_interval`.
    pub large_population: usize,

    /// Batch size bounds; the batch is the population clamped into this range.
    pub min_batch_size: usize,
    pub max_batch_size: usize,

    /// Fraction of deferred flows retried per step is `1 / pending_divisor`.
    pub pending_divisor: usize,
    /// Hard cap on deferred flows retried per step.
    pub max_pending_per_step: usize,
    /// Deferred flows beyond this are dropped; the cells re-propose them.
    pub max_pending_flows: usize,
    /// Flows committed per step before the rest is deferred.
    pub max_commits_per_step: usize,

    /// Horizontal and vertical radius scanned around the player at startup.
    pub discovery_radius: i32,
    pub discovery_vertical_radius: i32,
}

impl Default for WaterFlowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_interval: 0.30,
            base_interval: 0.20,
            fast_interval: 0.15,
            small_population: 10,
            large_population: 50,
            min_batch_size: 30,
            max_batch_size: 100,
            pending_divisor: 3,
            max_pending_per_step: 64,
            max_pending_flows: 1024,
            max_commits_per_step: 256,
            discovery_radius: 50,
            discovery_vertical_radius: 16,
        }
    }
}

/// Named configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WaterFlowPreset {
    #[default]
    Default,
    /// Shorter intervals and bigger batches, for fast machines or tests.
    Responsive,
    /// Longer intervals and smaller batches, for busy servers.
    Relaxed,
}

impl WaterFlowPreset {
    pub fn to_config(self) -> WaterFlowConfig {
        let base = WaterFlowConfig::default();
        match self {
            WaterFlowPreset::Default => base,
            WaterFlowPreset::Responsive => WaterFlowConfig {
                slow_interval: 0.15,
                base_interval: 0.10,
                fast_interval: 0.05,
                max_batch_size: 200,
                max_pending_per_step: 128,
                ..base
            },
            WaterFlowPreset::Relaxed => WaterFlowConfig {
                slow_interval: 0.50,
                base_interval: 0.35,
                fast_interval: 0.25,
                min_batch_size: 16,
                max_batch_size: 50,
                max_commits_per_step: 128,
                ..base
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WaterFlowPreset::Default => "default",
            WaterFlowPreset::Responsive => "responsive",
            WaterFlowPreset::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for WaterFlowPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WaterFlowPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(WaterFlowPreset::Default),
            "responsive" => Ok(WaterFlowPreset::Responsive),
            "relaxed" => Ok(WaterFlowPreset::Relaxed),
            other => Err(format!(
                "unknown water flow preset '{other}' (expected default, responsive or relaxed)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals_are_ordered() {
        let config = WaterFlowConfig::default();
        assert!(config.slow_interval > config.base_interval);
        assert!(config.base_interval > config.fast_interval);
        assert!(config.min_batch_size <= config.max_batch_size);
    }

    #[test]
    fn test_presets_keep_batch_bounds_ordered() {
        for preset in [
            WaterFlowPreset::Default,
            WaterFlowPreset::Responsive,
            WaterFlowPreset::Relaxed,
        ] {
            let config = preset.to_config();
            assert!(config.min_batch_size <= config.max_batch_size, "{preset}");
            assert!(config.fast_interval > 0.0, "{preset}");
        }
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("Responsive".parse(), Ok(WaterFlowPreset::Responsive));
        assert_eq!("relaxed".parse(), Ok(WaterFlowPreset::Relaxed));
        assert!("turbo".parse::<WaterFlowPreset>().is_err());
    }
}
