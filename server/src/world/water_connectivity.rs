//! Connectivity checks for flowing water.
//!
//! Flowing water only exists while something justifies it. This module
//! answers two questions about a cell, both read-only against the store:
//! - is it still connected to a source ([`ConnectivityChecker::has_reachable_source`])
//! - what level and distance it should settle at
//!   ([`ConnectivityChecker::level_for`], [`ConnectivityChecker::distance_for`])
//!
//! ## Search rules
//! The search walks only through water cells. Horizontal steps add one to a
//! running distance and are only taken while that distance is below
//! `MAX_FLOW_DISTANCE`. Stepping *up* resets the distance to zero, because
//! water that can fall from above justifies full-strength flow below it.
//! Downward steps are never taken: looking down never explains why water is
//! here.

use bevy::prelude::*;
use shared::water::constants::{
    DECAY_FLOOR_LEVEL, FEEDING_ABOVE_MIN_LEVEL, FED_FROM_ABOVE_MIN_LEVEL, SOURCE_ADJACENT_LEVEL,
    STRONG_NEIGHBOR_FLOOR, STRONG_NEIGHBOR_MIN_LEVEL, WATERFALL_LANDING_MIN_LEVEL,
};
use shared::world::{
    clamp_level, WaterBlockStore, WaterCell, WaterLevel, LATERAL_NEIGHBORS, MAX_FLOW_DISTANCE,
    MAX_WATER_LEVEL, UP,
};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::water_sources::SourceRegistry;

/// Level a cell settles at when fed by water of `above_level` directly above.
#[inline]
pub fn fed_from_above_level(above_level: WaterLevel) -> WaterLevel {
    above_level
        .saturating_sub(1)
        .max(FED_FROM_ABOVE_MIN_LEVEL)
        .min(MAX_WATER_LEVEL)
}

pub struct ConnectivityChecker<'a> {
    store: &'a WaterBlockStore,
    sources: &'a SourceRegistry,
}

impl<'a> ConnectivityChecker<'a> {
    pub fn new(store: &'a WaterBlockStore, sources: &'a SourceRegistry) -> Self {
        Self { store, sources }
    }

    /// Whether `pos` is connected to a registered source.
    pub fn has_reachable_source(&self, pos: IVec3) -> bool {
        self.nearest_source_distance(pos).is_some()
    }

    /// Horizontal distance (since the last upward step) at which the search
    /// first reaches a source, or `None` when no source is reachable.
    ///
    /// Labels only ever grow by one or reset to zero, so expanding the
    /// smallest label first means the first source popped is the closest one.
    pub fn nearest_source_distance(&self, pos: IVec3) -> Option<u32> {
        let mut best: HashMap<IVec3, u32> = HashMap::new();
        let mut frontier = BinaryHeap::new();
        best.insert(pos, 0);
        frontier.push(Reverse((0u32, OrderedPos(pos))));

        while let Some(Reverse((distance, OrderedPos(current)))) = frontier.pop() {
            if best.get(&current).is_some_and(|d| *d < distance) {
                continue;
            }
            if self.sources.contains(&current) {
                return Some(distance);
            }

            let mut visit = |next: IVec3, next_distance: u32| {
                if !self.store.contains(&next) {
                    return;
                }
                if best.get(&next).is_some_and(|d| *d <= next_distance) {
                    return;
                }
                best.insert(next, next_distance);
                frontier.push(Reverse((next_distance, OrderedPos(next))));
            };

            visit(current + UP, 0);
            if distance < MAX_FLOW_DISTANCE {
                for offset in LATERAL_NEIGHBORS {
                    visit(current + offset, distance + 1);
                }
            }
        }

        None
    }

    /// Level the cell at `pos` should have, or `None` if it holds no water.
    pub fn level_for(&self, pos: IVec3) -> Option<WaterLevel> {
        let cell = self.store.get(&pos)?;
        Some(self.level_for_cell(pos, &cell))
    }

    /// Level for `cell` as if it sat at `pos`.
    pub fn level_for_cell(&self, pos: IVec3, cell: &WaterCell) -> WaterLevel {
        if cell.is_source {
            return MAX_WATER_LEVEL;
        }

        if cell.is_waterfall_landing {
            return cell.level.max(WATERFALL_LANDING_MIN_LEVEL);
        }

        let above = pos + UP;
        if let Some(above_cell) = self.store.get(&above) {
            if above_cell.level > FEEDING_ABOVE_MIN_LEVEL {
                return fed_from_above_level(above_cell.level);
            }
        }

        let touches_source = LATERAL_NEIGHBORS
            .iter()
            .map(|offset| pos + *offset)
            .chain(std::iter::once(above))
            .any(|neighbor| self.sources.contains(&neighbor));
        if touches_source {
            return SOURCE_ADJACENT_LEVEL;
        }

        let strongest = LATERAL_NEIGHBORS
            .iter()
            .map(|offset| pos + *offset)
            .chain(std::iter::once(above))
            .filter_map(|neighbor| self.store.get(&neighbor))
            .map(|c| c.level)
            .max()
            .unwrap_or(0);
        if strongest >= STRONG_NEIGHBOR_MIN_LEVEL {
            return (strongest - 1).max(STRONG_NEIGHBOR_FLOOR);
        }

        let decayed = MAX_WATER_LEVEL as i64 - cell.distance_from_source as i64;
        clamp_level((decayed.max(0) as WaterLevel).max(DECAY_FLOOR_LEVEL))
    }

    /// Distance from source for the cell at `pos`, or `None` if it holds no
    /// water.
    pub fn distance_for(&self, pos: IVec3) -> Option<u32> {
        let cell = self.store.get(&pos)?;
        Some(self.distance_for_cell(pos, &cell))
    }

    /// Distance for `cell` as if it sat at `pos`.
    pub fn distance_for_cell(&self, pos: IVec3, cell: &WaterCell) -> u32 {
        if cell.is_source || cell.is_waterfall_landing {
            return 0;
        }

        if self
            .store
            .get(&(pos + UP))
            .is_some_and(|above| above.level > FEEDING_ABOVE_MIN_LEVEL)
        {
            return 1;
        }

        let nearest_neighbor = LATERAL_NEIGHBORS
            .iter()
            .filter_map(|offset| self.store.get(&(pos + *offset)))
            .map(|c| c.distance_from_source)
            .min();

        match nearest_neighbor {
            Some(distance) => (distance + 1).min(MAX_FLOW_DISTANCE),
            None => self
                .nearest_source_distance(pos)
                .unwrap_or(MAX_FLOW_DISTANCE)
                .min(MAX_FLOW_DISTANCE),
        }
    }
}

/// `IVec3` with a total order, so positions can ride along in the search heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderedPos(IVec3);

impl Ord for OrderedPos {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.to_array().cmp(&other.0.to_array())
    }
}

impl PartialOrd for OrderedPos {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
