//! Grid geometry for balancer layouts.
//!
//! Provides grid positions, the eight-way facing direction used by layout
//! entities, quarter-turn rotation math, and a spatial index that maps grid
//! cells to the entities occupying them. Unlike a placement grid, the index
//! tolerates several occupants per cell so that overlapping layouts can be
//! reported as configuration errors instead of being refused on insert.

use serde::{Deserialize, Serialize};
use slotmap::{Key, SecondaryMap};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A position on the 2D grid. `y` grows downward, so north is `(0, -1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// This position shifted by `(dx, dy)`.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// The position `distance` cells away along `direction`.
    pub fn step(&self, direction: Direction, distance: i32) -> Self {
        let (dx, dy) = direction.vector();
        self.offset(dx * distance, dy * distance)
    }
}

/// Facing direction in 45 degree steps, numbered clockwise from north.
///
/// Layout entities only ever face the four cardinal values; the diagonals
/// exist so that raw direction indices round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// All eight directions in index order.
    pub fn all() -> [Direction; 8] {
        [
            Direction::North,
            Direction::NorthEast,
            Direction::East,
            Direction::SouthEast,
            Direction::South,
            Direction::SouthWest,
            Direction::West,
            Direction::NorthWest,
        ]
    }

    /// The four cardinal directions.
    pub fn cardinals() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Direction for a raw index in `0..8`.
    pub fn from_index(index: u8) -> Option<Direction> {
        Direction::all().get(usize::from(index)).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Rotate clockwise by `steps` eighth-turns (negative for counter-clockwise).
    pub fn rotate(self, steps: i32) -> Direction {
        let index = (i32::from(self.index()) + steps).rem_euclid(8);
        Direction::all()[index as usize]
    }

    pub fn opposite(self) -> Direction {
        self.rotate(4)
    }

    pub fn is_cardinal(self) -> bool {
        self.index() % 2 == 0
    }

    /// Unit offset of one step in this direction.
    pub fn vector(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }
}

/// Quarter-turn rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation.
    #[default]
    None,
    /// 90 degrees clockwise.
    Cw90,
    /// 180 degrees.
    Cw180,
    /// 270 degrees clockwise (90 degrees counter-clockwise).
    Cw270,
}

impl Rotation {
    /// All four rotation values.
    pub fn all() -> [Rotation; 4] {
        [
            Rotation::None,
            Rotation::Cw90,
            Rotation::Cw180,
            Rotation::Cw270,
        ]
    }

    /// The rotation that turns north into `direction`. Diagonals round
    /// counter-clockwise to the previous cardinal.
    pub fn from_direction(direction: Direction) -> Self {
        Rotation::all()[usize::from(direction.index() / 2)]
    }

    /// Rotate 90 degrees clockwise.
    pub fn rotate_cw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw90,
            Rotation::Cw90 => Rotation::Cw180,
            Rotation::Cw180 => Rotation::Cw270,
            Rotation::Cw270 => Rotation::None,
        }
    }

    /// Rotate 90 degrees counter-clockwise.
    pub fn rotate_ccw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw270,
            Rotation::Cw90 => Rotation::None,
            Rotation::Cw180 => Rotation::Cw90,
            Rotation::Cw270 => Rotation::Cw180,
        }
    }

    /// The rotation that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Rotation::None => Rotation::None,
            Rotation::Cw90 => Rotation::Cw270,
            Rotation::Cw180 => Rotation::Cw180,
            Rotation::Cw270 => Rotation::Cw90,
        }
    }

    /// Rotate a grid vector. Clockwise on screen, where `y` points down.
    pub fn apply(self, (dx, dy): (i32, i32)) -> (i32, i32) {
        match self {
            Rotation::None => (dx, dy),
            Rotation::Cw90 => (-dy, dx),
            Rotation::Cw180 => (-dx, -dy),
            Rotation::Cw270 => (dy, -dx),
        }
    }
}

/// Errors from spatial operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpatialError {
    #[error("entity is already placed on the grid")]
    AlreadyPlaced,
    #[error("entity footprint has no cells")]
    EmptyFootprint,
}

// ---------------------------------------------------------------------------
// Cell lookup
// ---------------------------------------------------------------------------

/// Answers "what occupies this grid cell".
pub trait CellLookup<K> {
    /// Every key occupying `position`, in placement order.
    fn occupants(&self, position: GridPosition) -> &[K];
}

// ---------------------------------------------------------------------------
// SpatialIndex
// ---------------------------------------------------------------------------

/// A spatial index mapping grid cells to the keys occupying them.
///
/// Maintains a bidirectional mapping:
/// - `tiles`: position -> occupants (more than one when entities overlap)
/// - `cells`: key -> the cells it covers
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex<K: Key> {
    tiles: BTreeMap<GridPosition, Vec<K>>,
    cells: SecondaryMap<K, Vec<GridPosition>>,
}

impl<K: Key> SpatialIndex<K> {
    pub fn new() -> Self {
        Self {
            tiles: BTreeMap::new(),
            cells: SecondaryMap::new(),
        }
    }

    // -- Placement --

    /// Register `key` as covering `footprint`. Overlap with other keys is
    /// recorded, not refused.
    pub fn place(&mut self, key: K, footprint: &[GridPosition]) -> Result<(), SpatialError> {
        if self.cells.contains_key(key) {
            return Err(SpatialError::AlreadyPlaced);
        }
        if footprint.is_empty() {
            return Err(SpatialError::EmptyFootprint);
        }

        let mut covered = Vec::with_capacity(footprint.len());
        for &cell in footprint {
            if covered.contains(&cell) {
                continue;
            }
            covered.push(cell);
            self.tiles.entry(cell).or_default().push(key);
        }
        self.cells.insert(key, covered);
        Ok(())
    }

    // -- Point queries --

    /// Every key occupying a cell.
    pub fn occupants(&self, pos: GridPosition) -> &[K] {
        self.tiles.get(&pos).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cells holding more than one key, in grid order.
    pub fn overlapping_cells(&self) -> Vec<GridPosition> {
        self.tiles
            .iter()
            .filter(|(_, occupants)| occupants.len() > 1)
            .map(|(&pos, _)| pos)
            .collect()
    }
}

impl<K: Key> CellLookup<K> for SpatialIndex<K> {
    fn occupants(&self, position: GridPosition) -> &[K] {
        SpatialIndex::occupants(self, position)
    }
}
