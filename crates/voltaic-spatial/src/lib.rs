//! Spatial grid module for node positions, face adjacency, and component
//! discovery.
//!
//! Provides a 3D integer grid where each occupied cell may hold one energy
//! node. Two cells are adjacent when they share a face (six neighbours, no
//! diagonals). [`ConnectivityGraph`] tracks occupancy and finds connected
//! components with an iterative breadth-first search.

use serde::{Deserialize, Serialize};

pub mod connectivity;
pub use connectivity::{ConnectivityGraph, component_containing_in, components_of, neighbors_in};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A position on the 3D grid.
///
/// Ordering is lexicographic on `(x, y, z)`, which gives every ordered
/// collection of positions a stable iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Position shifted by the given deltas, or `None` if a coordinate
    /// would leave the `i32` range.
    pub fn checked_offset(&self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    /// The face-adjacent position in `dir`. `None` at the edge of the grid.
    pub fn relative(&self, dir: Direction) -> Option<Self> {
        let (dx, dy, dz) = dir.offset();
        self.checked_offset(dx, dy, dz)
    }

    /// Face-adjacent positions in [`Direction::all`] order. Six everywhere
    /// except on the outermost layer of the grid.
    pub fn adjacent(&self) -> impl Iterator<Item = BlockPos> + use<> {
        let pos = *self;
        Direction::all().into_iter().filter_map(move |dir| pos.relative(dir))
    }

    /// Manhattan distance to another position. Saturates at `u32::MAX`.
    pub fn manhattan_distance(&self, other: &BlockPos) -> u32 {
        self.x
            .abs_diff(other.x)
            .saturating_add(self.y.abs_diff(other.y))
            .saturating_add(self.z.abs_diff(other.z))
    }

    /// Whether `other` shares a face with this position.
    pub fn is_adjacent(&self, other: &BlockPos) -> bool {
        self.manhattan_distance(other) == 1
    }

    /// The region (column of cells) this position belongs to.
    pub fn region(&self) -> RegionPos {
        RegionPos::containing(*self)
    }
}

impl From<(i32, i32, i32)> for BlockPos {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// The six face directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Direction {
    /// All six face directions.
    pub fn all() -> [Direction; 6] {
        [
            Direction::Down,
            Direction::Up,
            Direction::North,
            Direction::South,
            Direction::West,
            Direction::East,
        ]
    }

    /// Offset for this direction. `y` grows upward, north is `-z`.
    pub fn offset(&self) -> (i32, i32, i32) {
        match self {
            Direction::Down => (0, -1, 0),
            Direction::Up => (0, 1, 0),
            Direction::North => (0, 0, -1),
            Direction::South => (0, 0, 1),
            Direction::West => (-1, 0, 0),
            Direction::East => (1, 0, 0),
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
        }
    }
}

/// A full-height column of `REGION_SIZE x REGION_SIZE` cells.
///
/// The host loads and unloads space in regions; activity hints are
/// expressed per region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    /// Width of a region along x and z.
    pub const REGION_SIZE: i32 = 16;

    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The region containing `pos`. Floors toward negative infinity.
    pub fn containing(pos: BlockPos) -> Self {
        Self::new(
            pos.x.div_euclid(Self::REGION_SIZE),
            pos.z.div_euclid(Self::REGION_SIZE),
        )
    }

    /// Inclusive range of block x coordinates covered by this region,
    /// clamped to the grid.
    pub fn x_bounds(&self) -> (i32, i32) {
        let min = i64::from(self.x) * i64::from(Self::REGION_SIZE);
        let max = min + i64::from(Self::REGION_SIZE) - 1;
        let clamp = |v: i64| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        (clamp(min), clamp(max))
    }

    /// Whether `pos` lies inside this region.
    pub fn contains(&self, pos: BlockPos) -> bool {
        RegionPos::containing(pos) == *self
    }
}

/// Errors from occupancy operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpatialError {
    #[error("position {0} is occupied")]
    Occupied(BlockPos),
    #[error("position {0} is not occupied")]
    NotOccupied(BlockPos),
}
