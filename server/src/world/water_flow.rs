//! Flow proposals for a single water cell.
//!
//! Each active cell proposes where its water should go next. Rules are tried
//! in a fixed priority order and the first one that fires wins:
//!
//! 1. **Waterfall**: a tall air gap (or open air, or water) below the cell
//! 2. **Immediate drop**: a one-block step down, or water directly below
//! 3. **Step-down seek**: the nearest ledge within a small radius
//! 4. **Horizontal spread**: every lateral neighbour that can take it
//!
//! ## Design Principles
//! - Proposals are read-only: the generator never touches the world or store
//! - Gravity rules suppress lateral spread, so falling water stays a column
//! - Every proposal is re-validated by the resolver before it commits

use bevy::prelude::*;
use shared::water::constants::{
    MIN_WATERFALL_HEIGHT, SPREAD_FLOWING_FLOOR, SPREAD_MIN_LEVEL, SPREAD_SOURCE_FLOOR,
    STEP_DOWN_FLOWING_FLOOR, STEP_DOWN_MIN_LEVEL, STEP_DOWN_RADIUS, STEP_DOWN_SOURCE_FLOOR,
    WATERFALL_SCAN_DEPTH, WORLD_FLOOR_Y,
};
use shared::world::{
    is_packable, BlockKind, WaterBlockStore, WaterCell, WaterLevel, WorldMap, DOWN,
    LATERAL_NEIGHBORS, MAX_FLOW_DISTANCE, UP,
};

use super::water_connectivity::fed_from_above_level;

/// A proposed move of water from one cell into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFlow {
    pub from: IVec3,
    pub to: IVec3,
    /// Level the target adopts if the flow commits.
    pub level: WaterLevel,
    pub is_waterfall: bool,
}

impl PendingFlow {
    #[inline]
    pub fn is_downward(&self) -> bool {
        self.to.y < self.from.y
    }
}

/// Which rule fired for a cell, and what it proposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowProposal {
    Waterfall(PendingFlow),
    /// Fired but may propose nothing (the water below is already deep enough).
    Drop(Option<PendingFlow>),
    StepDown(PendingFlow),
    Spread(Vec<PendingFlow>),
    Idle,
}

impl FlowProposal {
    pub fn into_flows(self) -> Vec<PendingFlow> {
        match self {
            FlowProposal::Waterfall(flow) | FlowProposal::StepDown(flow) => vec![flow],
            FlowProposal::Drop(flow) => flow.into_iter().collect(),
            FlowProposal::Spread(flows) => flows,
            FlowProposal::Idle => Vec::new(),
        }
    }
}

/// Whether `target` can take water at `level` right now.
///
/// Air always can (a stale store cell left under air is overwritten). Water
/// can when it is flowing and strictly shallower. Solid blocks and anything
/// under the world floor or outside the storable range never can.
pub fn can_receive<W: WorldMap + ?Sized>(
    world: &W,
    store: &WaterBlockStore,
    target: IVec3,
    level: WaterLevel,
) -> bool {
    if target.y < WORLD_FLOOR_Y || !is_packable(&target) {
        return false;
    }
    match world.get_block(&target) {
        BlockKind::Air => true,
        BlockKind::Water => store
            .get(&target)
            .is_some_and(|cell| !cell.is_source && cell.level < level),
        BlockKind::Solid => false,
    }
}

pub struct FlowCandidateGenerator<'a, W: WorldMap> {
    world: &'a W,
    store: &'a WaterBlockStore,
}

impl<'a, W: WorldMap> FlowCandidateGenerator<'a, W> {
    pub fn new(world: &'a W, store: &'a WaterBlockStore) -> Self {
        Self { world, store }
    }

    /// Runs the rules in priority order for the cell at `pos`.
    pub fn propose(&self, pos: IVec3, cell: &WaterCell) -> FlowProposal {
        if let Some(flow) = self.waterfall_seek(pos, cell) {
            return FlowProposal::Waterfall(flow);
        }
        if let Some(drop) = self.immediate_drop(pos, cell) {
            return FlowProposal::Drop(drop);
        }
        if let Some(flow) = self.step_down_seek(pos, cell) {
            return FlowProposal::StepDown(flow);
        }
        let spread = self.horizontal_spread(pos, cell);
        if spread.is_empty() {
            FlowProposal::Idle
        } else {
            FlowProposal::Spread(spread)
        }
    }

    /// Scans straight down from an air cell below `pos`.
    ///
    /// The fall counts as a waterfall when the scan reaches water, runs out of
    /// depth, or ends on solid ground at least `MIN_WATERFALL_HEIGHT` cells
    /// down. The proposed flow fills the cell directly below, so the column
    /// grows one block per commit.
    pub fn waterfall_seek(&self, pos: IVec3, cell: &WaterCell) -> Option<PendingFlow> {
        let below = pos + DOWN;
        if below.y < WORLD_FLOOR_Y || !self.world.get_block(&below).is_air() {
            return None;
        }

        let mut air_gap = 0;
        let mut is_waterfall = true;
        for depth in 1..=WATERFALL_SCAN_DEPTH {
            let scan_pos = pos - IVec3::Y * depth;
            let block = if scan_pos.y < WORLD_FLOOR_Y {
                BlockKind::Solid
            } else {
                self.world.get_block(&scan_pos)
            };
            match block {
                BlockKind::Air => air_gap += 1,
                BlockKind::Water => break,
                BlockKind::Solid => {
                    is_waterfall = air_gap >= MIN_WATERFALL_HEIGHT;
                    break;
                }
            }
        }

        is_waterfall.then_some(PendingFlow {
            from: pos,
            to: below,
            level: cell.level,
            is_waterfall: true,
        })
    }

    /// Handles the cell directly below.
    ///
    /// Water below is raised to [`fed_from_above_level`] (never above this
    /// cell's own level), the value revalidation assigns a fed cell anyway.
    ///
    /// Returns `None` when the rule does not apply, `Some(None)` when it fires
    /// without anything to do (deep water below), and `Some(Some(flow))`
    /// otherwise.
    pub fn immediate_drop(&self, pos: IVec3, cell: &WaterCell) -> Option<Option<PendingFlow>> {
        let below = pos + DOWN;
        if below.y < WORLD_FLOOR_Y {
            return None;
        }

        match self.world.get_block(&below) {
            BlockKind::Air => Some(Some(PendingFlow {
                from: pos,
                to: below,
                level: cell.level,
                is_waterfall: false,
            })),
            BlockKind::Water => {
                let below_cell = self.store.get(&below)?;
                let fed = fed_from_above_level(cell.level).min(cell.level);
                if below_cell.is_source || below_cell.level >= fed {
                    return Some(None);
                }
                Some(Some(PendingFlow {
                    from: pos,
                    to: below,
                    level: fed,
                    is_waterfall: false,
                }))
            }
            BlockKind::Solid => None,
        }
    }

    /// Looks for the nearest ledge within `STEP_DOWN_RADIUS` and proposes one
    /// lateral step toward it.
    ///
    /// A ledge is a receivable cell one block down with solid ground under it
    /// and open space above it.
    pub fn step_down_seek(&self, pos: IVec3, cell: &WaterCell) -> Option<PendingFlow> {
        if !cell.is_source && cell.level < STEP_DOWN_MIN_LEVEL {
            return None;
        }

        let floor = if cell.is_source {
            STEP_DOWN_SOURCE_FLOOR
        } else {
            STEP_DOWN_FLOWING_FLOOR
        };
        let level = cell.level.saturating_sub(1).max(floor);

        for offset in ledge_offsets() {
            let ledge = pos + IVec3::new(offset.x, -1, offset.y);
            if !self.is_ledge(ledge, level) {
                continue;
            }

            for step in step_toward(offset) {
                let target = pos + step;
                if can_receive(self.world, self.store, target, level) {
                    return Some(PendingFlow {
                        from: pos,
                        to: target,
                        level,
                        is_waterfall: false,
                    });
                }
            }
        }
        None
    }

    fn is_ledge(&self, ledge: IVec3, level: WaterLevel) -> bool {
        can_receive(self.world, self.store, ledge, level)
            && self.world.get_block(&(ledge + DOWN)).is_solid()
            && self.world.get_block(&(ledge + UP)).is_passable()
    }

    /// Proposes a flow into every lateral neighbour that can take it.
    pub fn horizontal_spread(&self, pos: IVec3, cell: &WaterCell) -> Vec<PendingFlow> {
        if !cell.is_source
            && (cell.level < SPREAD_MIN_LEVEL || cell.distance_from_source >= MAX_FLOW_DISTANCE)
        {
            return Vec::new();
        }

        let floor = if cell.is_source {
            SPREAD_SOURCE_FLOOR
        } else {
            SPREAD_FLOWING_FLOOR
        };
        let level = cell.level.saturating_sub(1).max(floor);

        LATERAL_NEIGHBORS
            .iter()
            .map(|offset| pos + *offset)
            .filter(|target| can_receive(self.world, self.store, *target, level))
            .map(|target| PendingFlow {
                from: pos,
                to: target,
                level,
                is_waterfall: false,
            })
            .collect()
    }
}

/// Horizontal (x, z) offsets within `STEP_DOWN_RADIUS`, nearest first, in a
/// fixed order.
fn ledge_offsets() -> impl Iterator<Item = IVec2> {
    (1..=STEP_DOWN_RADIUS).flat_map(|radius| {
        (-radius..=radius).flat_map(move |dx| {
            let dz = radius - dx.abs();
            let mirrored = (dz != 0).then_some(IVec2::new(dx, -dz));
            std::iter::once(IVec2::new(dx, dz)).chain(mirrored)
        })
    })
}

/// Single-axis steps toward a horizontal offset: the dominant axis first
/// (x on ties), then the other one if it moves at all.
fn step_toward(offset: IVec2) -> impl Iterator<Item = IVec3> {
    let along_x = (offset.x != 0).then_some(IVec3::new(offset.x.signum(), 0, 0));
    let along_z = (offset.y != 0).then_some(IVec3::new(0, 0, offset.y.signum()));
    let (first, second) = if offset.x.abs() >= offset.y.abs() {
        (along_x, along_z)
    } else {
        (along_z, along_x)
    };
    first.into_iter().chain(second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::world::ServerWorldMap;

    fn floor(world: &mut ServerWorldMap, y: i32, radius: i32) {
        world.fill_box(
            IVec3::new(-radius, y, -radius),
            IVec3::new(radius, y, radius),
            BlockKind::Solid,
        );
    }

    fn water(world: &mut ServerWorldMap, store: &mut WaterBlockStore, pos: IVec3, cell: WaterCell) {
        world.set_block(&pos, BlockKind::Water);
        store.upsert(pos, cell);
    }

    #[test]
    fn test_can_receive() {
        let mut world = ServerWorldMap::new("test");
        let mut store = WaterBlockStore::new();
        let shallow = IVec3::new(1, 10, 0);
        let source = IVec3::new(2, 10, 0);
        let wall = IVec3::new(3, 10, 0);
        water(&mut world, &mut store, shallow, WaterCell::flowing(3, 2));
        water(&mut world, &mut store, source, WaterCell::source());
        world.set_block(&wall, BlockKind::Solid);

        assert!(can_receive(&world, &store, IVec3::new(0, 10, 0), 1));
        assert!(can_receive(&world, &store, shallow, 4));
        assert!(!can_receive(&world, &store, shallow, 3));
        assert!(!can_receive(&world, &store, source, 7));
        assert!(!can_receive(&world, &store, wall, 7));
        let below_floor = IVec3::new(0, WORLD_FLOOR_Y - 1, 0);
        assert!(!can_receive(&world, &store, below_floor, 7));
        let unkeyed = IVec3::new(1 << 21, 10, 0);
        assert!(!can_receive(&world, &store, unkeyed, 7));
    }

    #[test]
    fn test_waterfall_over_tall_gap() {
        let mut world = ServerWorldMap::new("test");
        let store = WaterBlockStore::new();
        floor(&mut world, 9, 2);
        let pos = IVec3::new(0, 15, 0);

        let generator = FlowCandidateGenerator::new(&world, &store);
        let proposal = generator.propose(pos, &WaterCell::source());
        assert_eq!(
            proposal,
            FlowProposal::Waterfall(PendingFlow {
                from: pos,
                to: IVec3::new(0, 14, 0),
                level: 7,
                is_waterfall: true,
            })
        );
    }

    #[test]
    fn test_waterfall_onto_water() {
        let mut world = ServerWorldMap::new("test");
        let mut store = WaterBlockStore::new();
        floor(&mut world, 11, 2);
        let pool = IVec3::new(0, 12, 0);
        water(&mut world, &mut store, pool, WaterCell::flowing(4, 2));
        let pos = IVec3::new(0, 15, 0);

        let generator = FlowCandidateGenerator::new(&world, &store);
        assert_eq!(
            generator.propose(pos, &WaterCell::source()),
            FlowProposal::Waterfall(PendingFlow {
                from: pos,
                to: IVec3::new(0, 14, 0),
                level: 7,
                is_waterfall: true,
            })
        );

        // Landing on water counts even when the air gap is a single block
        let raised = pool + IVec3::Y;
        water(&mut world, &mut store, raised, WaterCell::flowing(3, 3));
        let generator = FlowCandidateGenerator::new(&world, &store);
        let flow = generator.waterfall_seek(pos, &WaterCell::flowing(5, 1)).unwrap();
        assert!(flow.is_waterfall);
        assert_eq!(flow.to, IVec3::new(0, 14, 0));
        assert_eq!(flow.level, 5);
    }

    #[test]
    fn test_bottomless_fall_is_a_waterfall() {
        let world = ServerWorldMap::new("test");
        let store = WaterBlockStore::new();
        let generator = FlowCandidateGenerator::new(&world, &store);
        let flow = generator.waterfall_seek(IVec3::new(0, 10, 0), &WaterCell::flowing(4, 3));
        assert!(flow.is_some_and(|f| f.is_waterfall && f.level == 4));
    }

    #[test]
    fn test_single_step_is_an_immediate_drop() {
        let mut world = ServerWorldMap::new("test");
        let store = WaterBlockStore::new();
        floor(&mut world, 9, 2);
        let pos = IVec3::new(0, 11, 0);

        let generator = FlowCandidateGenerator::new(&world, &store);
        assert_eq!(generator.waterfall_seek(pos, &WaterCell::source()), None);
        assert_eq!(
            generator.propose(pos, &WaterCell::flowing(5, 2)),
            FlowProposal::Drop(Some(PendingFlow {
                from: pos,
                to: IVec3::new(0, 10, 0),
                level: 5,
                is_waterfall: false,
            }))
        );
    }

    #[test]
    fn test_drop_into_water_raises_or_suppresses() {
        let mut world = ServerWorldMap::new("test");
        let mut store = WaterBlockStore::new();
        floor(&mut world, 9, 3);
        let top = IVec3::new(0, 11, 0);
        let below = IVec3::new(0, 10, 0);
        water(&mut world, &mut store, below, WaterCell::flowing(3, 4));

        let generator = FlowCandidateGenerator::new(&world, &store);
        // Fed level is max(7 - 1, 4) = 6
        assert_eq!(
            generator.propose(top, &WaterCell::source()).into_flows(),
            vec![PendingFlow {
                from: top,
                to: below,
                level: 6,
                is_waterfall: false,
            }]
        );

        store.upsert(below, WaterCell::flowing(6, 1));
        let generator = FlowCandidateGenerator::new(&world, &store);
        // Fires with nothing to do, and lateral spread stays suppressed
        let proposal = generator.propose(top, &WaterCell::source());
        assert_eq!(proposal, FlowProposal::Drop(None));
    }

    #[test]
    fn test_horizontal_spread_levels() {
        let mut world = ServerWorldMap::new("test");
        let mut store = WaterBlockStore::new();
        floor(&mut world, 9, 3);
        let pos = IVec3::new(0, 10, 0);
        world.set_block(&IVec3::new(0, 10, 1), BlockKind::Solid);
        let deep = IVec3::new(-1, 10, 0);
        water(&mut world, &mut store, deep, WaterCell::flowing(6, 1));

        let generator = FlowCandidateGenerator::new(&world, &store);
        let flows = generator.horizontal_spread(pos, &WaterCell::source());
        let targets: Vec<IVec3> = flows.iter().map(|f| f.to).collect();
        assert_eq!(targets, vec![IVec3::new(1, 10, 0), IVec3::new(0, 10, -1)]);
        assert!(flows.iter().all(|f| f.level == 6));

        // Flowing cells spread at level - 1, floored at 2
        let flows = generator.horizontal_spread(pos, &WaterCell::flowing(3, 4));
        assert!(flows.iter().all(|f| f.level == 2));

        // Too shallow or too far to spread
        let shallow = WaterCell::flowing(2, 1);
        assert!(generator.horizontal_spread(pos, &shallow).is_empty());
        assert!(generator
            .horizontal_spread(pos, &WaterCell::flowing(3, MAX_FLOW_DISTANCE))
            .is_empty());
    }

    #[test]
    fn test_step_down_toward_ledge() {
        let mut world = ServerWorldMap::new("test");
        let store = WaterBlockStore::new();
        // High floor up to x = 2, a ledge one block lower from x = 3
        world.fill_box(IVec3::new(-3, 9, -3), IVec3::new(2, 9, 3), BlockKind::Solid);
        world.fill_box(IVec3::new(3, 8, -3), IVec3::new(6, 8, 3), BlockKind::Solid);
        let pos = IVec3::new(0, 10, 0);

        let generator = FlowCandidateGenerator::new(&world, &store);
        assert_eq!(
            generator.propose(pos, &WaterCell::flowing(5, 2)),
            FlowProposal::StepDown(PendingFlow {
                from: pos,
                to: IVec3::new(1, 10, 0),
                level: 4,
                is_waterfall: false,
            })
        );

        let flow = generator.step_down_seek(pos, &WaterCell::source());
        assert_eq!(flow.map(|f| f.level), Some(6));

        // Shallow cells do not look for ledges
        let shallow = WaterCell::flowing(3, 4);
        assert_eq!(generator.step_down_seek(pos, &shallow), None);
    }

    #[test]
    fn test_ledge_offsets_are_nearest_first() {
        let offsets: Vec<IVec2> = ledge_offsets().collect();
        assert_eq!(offsets.len(), 4 + 8 + 12);
        assert!(offsets
            .windows(2)
            .all(|w| w[0].abs().element_sum() <= w[1].abs().element_sum()));
    }

    #[test]
    fn test_step_toward_prefers_dominant_axis() {
        let steps: Vec<IVec3> = step_toward(IVec2::new(-1, 2)).collect();
        assert_eq!(steps, vec![IVec3::new(0, 0, 1), IVec3::new(-1, 0, 0)]);

        let steps: Vec<IVec3> = step_toward(IVec2::new(2, -2)).collect();
        assert_eq!(steps, vec![IVec3::new(1, 0, 0), IVec3::new(0, 0, -1)]);

        let steps: Vec<IVec3> = step_toward(IVec2::new(3, 0)).collect();
        assert_eq!(steps, vec![IVec3::new(1, 0, 0)]);
    }
}
