//! Level-based water storage.
//!
//! Water is stored sparsely, one [`WaterCell`] per voxel that holds water.
//! A cell carries an integer level (1..=7) rather than a volume: the flow
//! simulation is a discrete automaton, and levels only ever move in whole
//! steps.
//!
//! ## Invariants kept by the store
//! - A stored level is always within `MIN_WATER_LEVEL..=MAX_WATER_LEVEL`
//!   (level 0 is represented by absence)
//! - Source cells are always full and at distance 0
//! - Only positions within `PACKED_COORD_LIMIT` on every axis are stored
//!
//! The store does not know about the voxel world. Keeping a cell present
//! exactly where the world holds a water block is the simulation's job.

use bevy::math::IVec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{pack_position, unpack_position};

/// A water level. 0 means "no water" and is never stored.
pub type WaterLevel = u8;

/// Full block / source strength.
pub const MAX_WATER_LEVEL: WaterLevel = 7;

/// Shallowest stored puddle.
pub const MIN_WATER_LEVEL: WaterLevel = 1;

/// Longest horizontal run flowing water may take from whatever justifies it.
/// Bounds both the connectivity search and level decay.
pub const MAX_FLOW_DISTANCE: u32 = 7;

/// Lowest height a water surface is drawn at, so puddles stay visible.
pub const MIN_VISUAL_HEIGHT: f32 = 0.125;

/// State of one voxel of water.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterCell {
    pub level: WaterLevel,
    pub is_source: bool,
    /// Horizontal hops since the last source or vertical drop.
    pub distance_from_source: u32,
    /// Set when the cell was filled by a vertical fall.
    pub is_waterfall_landing: bool,
}

impl WaterCell {
    /// A full, permanent source cell.
    pub fn source() -> Self {
        Self {
            level: MAX_WATER_LEVEL,
            is_source: true,
            distance_from_source: 0,
            is_waterfall_landing: false,
        }
    }

    /// A flowing cell. The level is clamped into the storable range.
    pub fn flowing(level: WaterLevel, distance_from_source: u32) -> Self {
        Self {
            level: clamp_level(level),
            is_source: false,
            distance_from_source: distance_from_source.min(MAX_FLOW_DISTANCE),
            is_waterfall_landing: false,
        }
    }

    /// A flowing cell created by a vertical fall.
    pub fn landing(level: WaterLevel) -> Self {
        Self {
            is_waterfall_landing: true,
            ..Self::flowing(level, 0)
        }
    }

    /// Height of the rendered water surface as a fraction of the block.
    #[inline]
    pub fn visual_height(&self) -> f32 {
        (self.level as f32 / MAX_WATER_LEVEL as f32).max(MIN_VISUAL_HEIGHT)
    }

    /// Returns the cell with every store invariant re-applied.
    fn normalized(mut self) -> Self {
        if self.is_source {
            self.level = MAX_WATER_LEVEL;
            self.distance_from_source = 0;
        } else {
            self.level = clamp_level(self.level);
            self.distance_from_source = self.distance_from_source.min(MAX_FLOW_DISTANCE);
        }
        self
    }
}

#[inline]
pub fn clamp_level(level: WaterLevel) -> WaterLevel {
    level.clamp(MIN_WATER_LEVEL, MAX_WATER_LEVEL)
}

/// Sparse position -> [`WaterCell`] map keyed by packed 64-bit positions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaterBlockStore {
    cells: HashMap<u64, WaterCell>,
}

impl WaterBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the cell at `pos`, if any.
    #[inline]
    pub fn get(&self, pos: &IVec3) -> Option<WaterCell> {
        let key = pack_position(pos)?;
        self.cells.get(&key).copied()
    }

    /// Inserts or replaces the cell at `pos`. Out-of-range levels are
    /// clamped and source cells are forced to full strength.
    ///
    /// Returns false, storing nothing, when `pos` cannot be packed.
    pub fn upsert(&mut self, pos: IVec3, cell: WaterCell) -> bool {
        let Some(key) = pack_position(&pos) else {
            return false;
        };
        self.cells.insert(key, cell.normalized());
        true
    }

    pub fn remove(&mut self, pos: &IVec3) -> Option<WaterCell> {
        let key = pack_position(pos)?;
        self.cells.remove(&key)
    }

    #[inline]
    pub fn contains(&self, pos: &IVec3) -> bool {
        pack_position(pos).is_some_and(|key| self.cells.contains_key(&key))
    }

    /// Level at `pos`, 0 when dry.
    pub fn level_at(&self, pos: &IVec3) -> WaterLevel {
        self.get(pos).map(|c| c.level).unwrap_or(0)
    }

    /// Iterates positions in no particular order.
    pub fn positions(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.cells.keys().map(|key| unpack_position(*key))
    }

    /// Positions ordered by packed key. Stable between calls as long as the
    /// store is unchanged, which keeps batch building deterministic.
    pub fn sorted_positions(&self) -> Vec<IVec3> {
        let mut keys: Vec<u64> = self.cells.keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter().map(unpack_position).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IVec3, &WaterCell)> {
        self.cells
            .iter()
            .map(|(key, cell)| (unpack_position(*key), cell))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
