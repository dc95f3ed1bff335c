//! Registry of permanent water sources.
//!
//! Sources are the only way water enters the simulation. Everything else is
//! flowing water that has to justify its existence by being connected to a
//! source.

use bevy::prelude::*;
use shared::world::{is_packable, BlockKind, WaterBlockStore, WaterCell, WorldMap};
use std::collections::HashSet;

use super::water_scheduler::WaterSimulationQueue;

#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    sources: HashSet<IVec3>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source at `pos`, writing a water block and a full source
    /// cell (overwriting any flowing cell there) and queueing it.
    ///
    /// Returns false when the world holds a solid block at `pos`, or when
    /// `pos` lies outside the range the store can key.
    pub fn add(
        &mut self,
        world: &mut impl WorldMap,
        store: &mut WaterBlockStore,
        queue: &mut WaterSimulationQueue,
        pos: IVec3,
    ) -> bool {
        if !is_packable(&pos) {
            log::warn!(
                "[WATER SOURCES] Refusing to place a source outside the simulated range at {:?}",
                pos
            );
            return false;
        }
        if world.get_block(&pos).is_solid() {
            log::warn!(
                "[WATER SOURCES] Refusing to place a source inside a solid block at {:?}",
                pos
            );
            return false;
        }

        world.set_block(&pos, BlockKind::Water);
        store.upsert(pos, WaterCell::source());
        queue.queue(pos);

        if self.sources.insert(pos) {
            log::debug!("[WATER SOURCES] Source added at {:?}", pos);
        }
        true
    }

    /// Drops source status at `pos`.
    ///
    /// The cell stays in place as flowing water and is re-evaluated on the
    /// next step. Every existing water cell is queued as well, since removing
    /// a source can orphan water arbitrarily far away.
    pub fn remove(
        &mut self,
        store: &mut WaterBlockStore,
        queue: &mut WaterSimulationQueue,
        pos: IVec3,
    ) -> bool {
        if !self.sources.remove(&pos) {
            return false;
        }

        if let Some(cell) = store.get(&pos) {
            store.upsert(
                pos,
                WaterCell {
                    is_source: false,
                    ..cell
                },
            );
        }
        queue.queue_many(store.sorted_positions());

        log::debug!(
            "[WATER SOURCES] Source removed at {:?}, re-checking {} cells",
            pos,
            store.len()
        );
        true
    }

    /// Forgets a source whose block disappeared out-of-band. The caller owns
    /// the store cleanup.
    pub fn forget(&mut self, pos: &IVec3) -> bool {
        self.sources.remove(pos)
    }

    #[inline]
    pub fn contains(&self, pos: &IVec3) -> bool {
        self.sources.contains(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IVec3> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
