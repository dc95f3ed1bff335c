//! Seeded demo world: a stack of terraces stepping down from the centre, with
//! a few springs on the top terrace and a pit at the edge. It exercises
//! waterfalls, ledges and spreading without any scene file.

use bevy::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use shared::world::{BlockKind, ServerWorldMap, WorldMap};

/// Half-width of the generated area.
pub const DEMO_HALF_EXTENT: i32 = 24;

/// Height of the top terrace surface.
const TOP_SURFACE_Y: i32 = 20;

/// Number of terraces, top one included.
const TERRACE_COUNT: i32 = 4;

fn terrace_half_width(index: i32) -> i32 {
    4 + index * 5
}

pub fn generate_demo_world(name: &str, seed: u64) -> ServerWorldMap {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = ServerWorldMap::new(name);

    // Bedrock catches everything that falls off the terraces
    world.fill_box(
        IVec3::new(-DEMO_HALF_EXTENT, 0, -DEMO_HALF_EXTENT),
        IVec3::new(DEMO_HALF_EXTENT, 0, DEMO_HALF_EXTENT),
        BlockKind::Solid,
    );

    // Terraces from the widest (lowest) to the narrowest (highest); each one
    // is a slab whose drop to the next is between one and three blocks.
    let mut surface_y = TOP_SURFACE_Y;
    let mut surfaces = Vec::with_capacity(TERRACE_COUNT as usize);
    for _ in 0..TERRACE_COUNT {
        surfaces.push(surface_y);
        surface_y -= rng.gen_range(1..=3);
    }
    for index in (0..TERRACE_COUNT).rev() {
        let half = terrace_half_width(index).min(DEMO_HALF_EXTENT);
        let y = surfaces[index as usize];
        world.fill_box(
            IVec3::new(-half, y, -half),
            IVec3::new(half, y, half),
            BlockKind::Solid,
        );
    }

    // A pit in the lowest terrace, open all the way down to bedrock
    let pit_half = terrace_half_width(TERRACE_COUNT - 1) - 2;
    let pit = IVec3::new(pit_half, surfaces[(TERRACE_COUNT - 1) as usize], 0);
    world.fill_box(
        pit - IVec3::new(1, 0, 1),
        pit + IVec3::new(1, 0, 1),
        BlockKind::Air,
    );

    // Springs sit one block above the top terrace
    let top_half = terrace_half_width(0);
    let spring_count = rng.gen_range(1..=3);
    for _ in 0..spring_count {
        let x = rng.gen_range(-top_half..=top_half);
        let z = rng.gen_range(-top_half..=top_half);
        world.set_block(&IVec3::new(x, TOP_SURFACE_Y + 1, z), BlockKind::Water);
    }

    world.player_position = Some(Vec3::new(0.5, TOP_SURFACE_Y as f32 + 2.0, 0.5));

    log::info!(
        "Generated demo world '{}' (seed {}): {} blocks, {} springs",
        name,
        seed,
        world.block_count(),
        world.count_of(BlockKind::Water)
    );
    world
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate_demo_world("a", 42);
        let b = generate_demo_world("b", 42);
        let mut a_water: Vec<IVec3> = a.positions_of(BlockKind::Water).collect();
        let mut b_water: Vec<IVec3> = b.positions_of(BlockKind::Water).collect();
        a_water.sort_by_key(|p| p.to_array());
        b_water.sort_by_key(|p| p.to_array());
        assert_eq!(a_water, b_water);
        assert_eq!(a.block_count(), b.block_count());
    }

    #[test]
    fn test_springs_rest_on_the_top_terrace() {
        for seed in 0..8 {
            let world = generate_demo_world("demo", seed);
            let springs: Vec<IVec3> = world.positions_of(BlockKind::Water).collect();
            assert!((1..=3).contains(&springs.len()), "seed {seed}");
            for spring in springs {
                assert_eq!(spring.y, TOP_SURFACE_Y + 1);
                assert!(world.get_block(&(spring - IVec3::Y)).is_solid());
            }
            assert!(world.player_position().is_some());
        }
    }

    #[test]
    fn test_pit_reaches_bedrock() {
        let world = generate_demo_world("demo", 7);
        let pit_x = terrace_half_width(TERRACE_COUNT - 1) - 2;
        for y in 1..=TOP_SURFACE_Y {
            let block = world.get_block(&IVec3::new(pit_x, y, 0));
            assert!(!block.is_solid(), "y = {y}");
        }
        assert!(world.get_block(&IVec3::new(pit_x, 0, 0)).is_solid());
    }
}
