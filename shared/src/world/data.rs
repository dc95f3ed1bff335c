use bevy::math::{IVec3, Vec3};
use bevy_ecs::resource::Resource;
use bevy_log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::BlockKind;

/// Gateway through which the water simulation reads and writes the voxel
/// world. Block storage itself (chunks, meshing, persistence) lives behind
/// this trait.
pub trait WorldMap {
    fn get_block(&self, position: &IVec3) -> BlockKind;

    fn set_block(&mut self, position: &IVec3, block: BlockKind);

    /// Position of the local player, once one has joined.
    fn player_position(&self) -> Option<Vec3> {
        None
    }
}

/// Sparse in-memory block map used by the headless server and by tests.
/// Missing entries are air.
#[derive(Resource, Default, Clone, Serialize, Deserialize, Debug)]
pub struct ServerWorldMap {
    pub name: String,
    blocks: HashMap<IVec3, BlockKind>,
    pub player_position: Option<Vec3>,
}

impl ServerWorldMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Fills the inclusive box `min..=max` with `block`.
    pub fn fill_box(&mut self, min: IVec3, max: IVec3, block: BlockKind) {
        let lo = min.min(max);
        let hi = min.max(max);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    self.set_block(&IVec3::new(x, y, z), block);
                }
            }
        }
        debug!(
            "[{}] Filled {:?}..={:?} with {}",
            self.name,
            lo,
            hi,
            block.name()
        );
    }

    /// Number of non-air blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn count_of(&self, kind: BlockKind) -> usize {
        self.blocks.values().filter(|b| **b == kind).count()
    }

    pub fn positions_of(&self, kind: BlockKind) -> impl Iterator<Item = IVec3> + '_ {
        self.blocks
            .iter()
            .filter(move |(_, b)| **b == kind)
            .map(|(pos, _)| *pos)
    }
}

impl WorldMap for ServerWorldMap {
    fn get_block(&self, position: &IVec3) -> BlockKind {
        self.blocks.get(position).copied().unwrap_or_default()
    }

    fn set_block(&mut self, position: &IVec3, block: BlockKind) {
        if block.is_air() {
            self.blocks.remove(position);
        } else {
            self.blocks.insert(*position, block);
        }
    }

    fn player_position(&self) -> Option<Vec3> {
        self.player_position
    }
}
