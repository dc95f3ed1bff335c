use serde::{Deserialize, Serialize};

/// What occupies a single voxel, as far as liquids are concerned.
///
/// The flow simulation only needs to tell open space, liquid and anything
/// that stops liquid apart; every opaque or collidable block maps to `Solid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockKind {
    #[default]
    Air,
    Water,
    Solid,
}

impl BlockKind {
    #[inline]
    pub fn is_air(self) -> bool {
        self == BlockKind::Air
    }

    #[inline]
    pub fn is_water(self) -> bool {
        self == BlockKind::Water
    }

    #[inline]
    pub fn is_solid(self) -> bool {
        self == BlockKind::Solid
    }

    /// Liquid can pass through (or already occupies) this block.
    #[inline]
    pub fn is_passable(self) -> bool {
        !self.is_solid()
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Air => "air",
            BlockKind::Water => "water",
            BlockKind::Solid => "solid",
        }
    }
}
