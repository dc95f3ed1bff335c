use bevy::math::{IVec3, Vec3};

pub const SIX_OFFSETS: [IVec3; 6] = [
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(0, 0, -1),
];

/// The four horizontal neighbours, in a fixed order so that flow proposals
/// are generated deterministically.
pub const LATERAL_NEIGHBORS: [IVec3; 4] = [
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(0, 0, -1),
];

pub const UP: IVec3 = IVec3::new(0, 1, 0);
pub const DOWN: IVec3 = IVec3::new(0, -1, 0);

/// Bits used per axis in a packed position key.
const AXIS_BITS: u32 = 21;
const AXIS_MASK: u64 = (1 << AXIS_BITS) - 1;

/// Largest coordinate magnitude that survives packing.
pub const PACKED_COORD_LIMIT: i32 = 1 << (AXIS_BITS - 1);

/// Whether every coordinate of `position` lies in `-2^20..2^20`.
#[inline]
pub fn is_packable(position: &IVec3) -> bool {
    let range = -PACKED_COORD_LIMIT..PACKED_COORD_LIMIT;
    range.contains(&position.x) && range.contains(&position.y) && range.contains(&position.z)
}

/// Packs a block position into a single `u64` key (21 bits per axis, two's
/// complement). Returns `None` outside the packable range, where two
/// positions would share a key.
#[inline]
pub fn pack_position(position: &IVec3) -> Option<u64> {
    if !is_packable(position) {
        return None;
    }
    Some(
        (position.x as u64 & AXIS_MASK)
            | ((position.y as u64 & AXIS_MASK) << AXIS_BITS)
            | ((position.z as u64 & AXIS_MASK) << (2 * AXIS_BITS)),
    )
}

/// Inverse of [`pack_position`].
#[inline]
pub fn unpack_position(key: u64) -> IVec3 {
    // Shift each field to the top of the word, then sign-extend back down.
    let x = ((key << (64 - AXIS_BITS)) as i64) >> (64 - AXIS_BITS);
    let y = ((key << (64 - 2 * AXIS_BITS)) as i64) >> (64 - AXIS_BITS);
    let z = ((key << (64 - 3 * AXIS_BITS)) as i64) >> (64 - AXIS_BITS);
    IVec3::new(x as i32, y as i32, z as i32)
}

/// Block containing a world-space point.
pub fn world_to_block_pos(position: Vec3) -> IVec3 {
    position.floor().as_ivec3()
}
