//! World coordinates: continuous [`Point`]s and integer [`BlockPos`]itions.

use serde::{Deserialize, Serialize};

/// A position in the world with sub-block precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// East-west axis.
    pub x: f64,
    /// Vertical axis.
    pub y: f64,
    /// North-south axis.
    pub z: f64,
}

impl Point {
    /// Create a point from its coordinates.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The block this point lies in.
    pub fn block(self) -> BlockPos {
        BlockPos::new(floor_to_i32(self.x), floor_to_i32(self.y), floor_to_i32(self.z))
    }

    /// Squared distance in the horizontal (x/z) plane.
    pub fn horizontal_distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx.mul_add(dx, dz * dz)
    }

    /// Return a copy moved by the given offsets.
    pub fn offset(self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl core::fmt::Display for Point {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    /// East-west axis.
    pub x: i32,
    /// Vertical axis.
    pub y: i32,
    /// North-south axis.
    pub z: i32,
}

impl BlockPos {
    /// Create a block position from its coordinates.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The lowest corner of the block as a [`Point`].
    pub fn corner(self) -> Point {
        Point::new(f64::from(self.x), f64::from(self.y), f64::from(self.z))
    }

    /// The centre of the block's floor, where a player would stand.
    pub fn center(self) -> Point {
        self.corner().offset(0.5, 0.0, 0.5)
    }
}

/// Floor a coordinate into block space, saturating at the `i32` range.
#[allow(clippy::cast_possible_truncation)]
fn floor_to_i32(value: f64) -> i32 {
    let floored = value.floor();
    if floored >= f64::from(i32::MAX) {
        i32::MAX
    } else if floored <= f64::from(i32::MIN) {
        i32::MIN
    } else {
        floored as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_floor_down() {
        let p = Point::new(-0.5, 64.9, 3.0);
        assert_eq!(p.block(), BlockPos::new(-1, 64, 3));
    }

    #[test]
    fn block_center_lies_inside_block() {
        let block = BlockPos::new(4, 10, -7);
        assert_eq!(block.center().block(), block);
    }

    #[test]
    fn horizontal_distance_ignores_height() {
        let a = Point::new(0.0, 0.0, 0.0);
        let b = Point::new(3.0, 100.0, 4.0);
        assert!((a.horizontal_distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn huge_values_saturate() {
        let p = Point::new(1e12, -1e12, 0.0);
        assert_eq!(p.block(), BlockPos::new(i32::MAX, i32::MIN, 0));
    }
}
