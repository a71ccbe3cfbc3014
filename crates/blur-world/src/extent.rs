//! Volumetric regions used for capture zones, spawns, checkpoints and
//! holding areas.
//!
//! An [`Extent`] answers four questions: does it contain a point, give me a
//! random point inside it, which blocks does it cover, and how big is it.
//! Cuboids and single blocks use block granularity (a point is inside when
//! the block it stands in is inside); cylinders are continuous.

use std::collections::BTreeSet;
use std::f64::consts::TAU;

use blur_types::{BlockPos, Point};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// A region of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Extent {
    /// Axis-aligned box between two block corners, both inclusive.
    Cuboid {
        /// First corner.
        min: BlockPos,
        /// Opposite corner.
        max: BlockPos,
    },
    /// Upright cylinder standing on `base`.
    Cylinder {
        /// Centre of the bottom face.
        base: Point,
        /// Horizontal radius.
        radius: f64,
        /// Height above `base`.
        height: f64,
    },
    /// A single block.
    Block {
        /// The block.
        pos: BlockPos,
    },
    /// Any of several extents.
    Union {
        /// Member extents.
        extents: Vec<Extent>,
    },
}

impl Extent {
    /// A cuboid spanning two corners given in any order.
    pub fn cuboid(a: BlockPos, b: BlockPos) -> Self {
        Self::Cuboid {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Check that the geometry is usable.
    pub fn validate(&self) -> Result<(), WorldError> {
        match self {
            Self::Cuboid { .. } | Self::Block { .. } => Ok(()),
            Self::Cylinder { radius, height, .. } => {
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(WorldError::InvalidExtent {
                        reason: format!("cylinder radius must be positive, got {radius}"),
                    });
                }
                if !height.is_finite() || *height < 0.0 {
                    return Err(WorldError::InvalidExtent {
                        reason: format!("cylinder height must not be negative, got {height}"),
                    });
                }
                Ok(())
            }
            Self::Union { extents } => {
                if extents.is_empty() {
                    return Err(WorldError::InvalidExtent {
                        reason: "union must contain at least one extent".to_owned(),
                    });
                }
                extents.iter().try_for_each(Self::validate)
            }
        }
    }

    /// Whether `point` lies inside this extent.
    pub fn contains(&self, point: Point) -> bool {
        match self {
            Self::Cuboid { min, max } => {
                let (lo, hi) = normalized(*min, *max);
                let b = point.block();
                (lo.x..=hi.x).contains(&b.x)
                    && (lo.y..=hi.y).contains(&b.y)
                    && (lo.z..=hi.z).contains(&b.z)
            }
            Self::Cylinder { base, radius, height } => {
                point.y >= base.y
                    && point.y <= base.y + height
                    && point.horizontal_distance_squared(*base) <= radius * radius
            }
            Self::Block { pos } => point.block() == *pos,
            Self::Union { extents } => extents.iter().any(|e| e.contains(point)),
        }
    }

    /// A uniformly chosen point inside the extent. Unions pick a random
    /// member first. Returns `None` only for an empty union.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Point> {
        match self {
            Self::Cuboid { min, max } => {
                let (lo, hi) = normalized(*min, *max);
                let span = |a: i32, b: i32| f64::from(b) - f64::from(a) + 1.0;
                Some(lo.corner().offset(
                    span(lo.x, hi.x) * rng.random::<f64>(),
                    span(lo.y, hi.y) * rng.random::<f64>(),
                    span(lo.z, hi.z) * rng.random::<f64>(),
                ))
            }
            Self::Cylinder { base, radius, height } => {
                let angle = TAU * rng.random::<f64>();
                let distance = radius * rng.random::<f64>().sqrt();
                Some(base.offset(
                    distance * angle.cos(),
                    height * rng.random::<f64>(),
                    distance * angle.sin(),
                ))
            }
            Self::Block { pos } => Some(pos.center()),
            Self::Union { extents } => extents.choose(rng)?.random_point(rng),
        }
    }

    /// Every block covered by the extent. Cylinder blocks are included when
    /// their centre lies inside.
    pub fn blocks(&self) -> BTreeSet<BlockPos> {
        match self {
            Self::Cuboid { min, max } => {
                let (lo, hi) = normalized(*min, *max);
                block_range(lo, hi).collect()
            }
            Self::Cylinder { base, radius, height } => {
                let lo = base.offset(-radius, 0.0, -radius).block();
                let hi = base.offset(*radius, *height, *radius).block();
                block_range(lo, hi)
                    .filter(|b| self.contains(b.corner().offset(0.5, 0.5, 0.5)))
                    .collect()
            }
            Self::Block { pos } => BTreeSet::from([*pos]),
            Self::Union { extents } => extents.iter().flat_map(Self::blocks).collect(),
        }
    }

    /// Volume in cubic blocks. For unions this is the sum of the members,
    /// so overlapping members are counted twice.
    #[allow(clippy::cast_precision_loss)]
    pub fn volume(&self) -> f64 {
        match self {
            Self::Cuboid { min, max } => {
                let (lo, hi) = normalized(*min, *max);
                let side = |a: i32, b: i32| i64::from(b).saturating_sub(i64::from(a)).saturating_add(1) as f64;
                side(lo.x, hi.x) * side(lo.y, hi.y) * side(lo.z, hi.z)
            }
            Self::Cylinder { radius, height, .. } => std::f64::consts::PI * radius * radius * height,
            Self::Block { .. } => 1.0,
            Self::Union { extents } => extents.iter().map(Self::volume).sum(),
        }
    }
}

fn normalized(a: BlockPos, b: BlockPos) -> (BlockPos, BlockPos) {
    (
        BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
        BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
    )
}

fn block_range(lo: BlockPos, hi: BlockPos) -> impl Iterator<Item = BlockPos> {
    (lo.x..=hi.x).flat_map(move |x| {
        (lo.y..=hi.y).flat_map(move |y| (lo.z..=hi.z).map(move |z| BlockPos::new(x, y, z)))
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn arena() -> Extent {
        Extent::cuboid(BlockPos::new(10, 60, 10), BlockPos::new(0, 64, 0))
    }

    #[test]
    fn cuboid_contains_is_block_inclusive() {
        let extent = arena();
        assert!(extent.contains(Point::new(0.0, 60.0, 0.0)));
        assert!(extent.contains(Point::new(10.99, 64.5, 10.99)));
        assert!(!extent.contains(Point::new(11.0, 62.0, 5.0)));
        assert!(!extent.contains(Point::new(-0.01, 62.0, 5.0)));
    }

    #[test]
    fn cuboid_volume_and_blocks_agree() {
        let extent = Extent::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(1, 2, 3));
        assert_eq!(extent.blocks().len(), 24);
        assert!((extent.volume() - 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cylinder_contains_checks_radius_and_height() {
        let extent = Extent::Cylinder {
            base: Point::new(0.0, 64.0, 0.0),
            radius: 3.0,
            height: 2.0,
        };
        assert!(extent.contains(Point::new(2.0, 65.0, 2.0)));
        assert!(!extent.contains(Point::new(3.0, 65.0, 3.0)));
        assert!(!extent.contains(Point::new(0.0, 66.5, 0.0)));
        assert!(!extent.contains(Point::new(0.0, 63.9, 0.0)));
    }

    #[test]
    fn block_extent_covers_one_block() {
        let extent = Extent::Block {
            pos: BlockPos::new(5, 70, -5),
        };
        assert!(extent.contains(Point::new(5.3, 70.9, -4.1)));
        assert!(!extent.contains(Point::new(5.3, 71.0, -4.1)));
        assert_eq!(extent.blocks().len(), 1);
    }

    #[test]
    fn union_contains_any_member_and_dedups_blocks() {
        let extent = Extent::Union {
            extents: vec![
                Extent::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(1, 0, 0)),
                Extent::cuboid(BlockPos::new(1, 0, 0), BlockPos::new(2, 0, 0)),
            ],
        };
        assert!(extent.contains(Point::new(2.5, 0.5, 0.5)));
        assert_eq!(extent.blocks().len(), 3);
        assert!((extent.volume() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_union_is_invalid_and_has_no_point() {
        let extent = Extent::Union { extents: Vec::new() };
        assert!(extent.validate().is_err());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(extent.random_point(&mut rng).is_none());
    }

    #[test]
    fn negative_radius_is_invalid() {
        let extent = Extent::Cylinder {
            base: Point::default(),
            radius: -1.0,
            height: 1.0,
        };
        assert!(matches!(extent.validate(), Err(WorldError::InvalidExtent { .. })));
    }

    #[test]
    fn extent_parses_from_tagged_yaml() {
        let yaml = "type: cylinder\nbase: { x: 0.5, y: 64.0, z: 0.5 }\nradius: 4\nheight: 3\n";
        let extent: Option<Extent> = serde_yml::from_str(yaml).ok();
        assert!(matches!(extent, Some(Extent::Cylinder { .. })));
    }

    proptest! {
        #[test]
        fn random_points_fall_inside(
            seed in any::<u64>(),
            ax in -50i32..50, ay in 0i32..100, az in -50i32..50,
            bx in -50i32..50, by in 0i32..100, bz in -50i32..50,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let cuboid = Extent::cuboid(BlockPos::new(ax, ay, az), BlockPos::new(bx, by, bz));
            let point = cuboid.random_point(&mut rng);
            prop_assert!(point.is_some_and(|p| cuboid.contains(p)));

            let cylinder = Extent::Cylinder {
                base: Point::new(f64::from(ax), f64::from(ay), f64::from(az)),
                radius: 1.0 + f64::from(bx.unsigned_abs()),
                height: f64::from(by),
            };
            let point = cylinder.random_point(&mut rng);
            prop_assert!(point.is_some_and(|p| cylinder.contains(p)));
        }
    }
}
