//! Layout entities and the layout arena.
//!
//! A [`Layout`] owns every placed [`Segment`] in a slotmap, remembers the
//! order in which they were added, and keeps a [`SpatialIndex`] of the cells
//! they cover. Nothing about connections or simulation is stored here.

use crate::connection::Side;
use crate::error::LayoutError;
use crate::id::SegmentId;
use crate::rational::{Rational, whole};
use balancer_spatial::{CellLookup, Direction, GridPosition, Rotation, SpatialIndex};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

// ---------------------------------------------------------------------------
// Speed classes
// ---------------------------------------------------------------------------

/// Belt tier. Determines capacity per cycle and underground reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedClass {
    Basic,
    Fast,
    Express,
}

impl SpeedClass {
    pub fn all() -> [SpeedClass; 3] {
        [SpeedClass::Basic, SpeedClass::Fast, SpeedClass::Express]
    }

    /// Units of flow one belt of this class carries per cycle.
    pub fn capacity(self) -> u32 {
        match self {
            SpeedClass::Basic => 1,
            SpeedClass::Fast => 2,
            SpeedClass::Express => 3,
        }
    }

    /// Furthest cell an underground input can reach its output at.
    pub fn max_distance(self) -> i32 {
        match self {
            SpeedClass::Basic => 5,
            SpeedClass::Fast => 7,
            SpeedClass::Express => 9,
        }
    }

    /// Name prefix used by entity names (`""`, `"fast-"`, `"express-"`).
    fn prefix(self) -> &'static str {
        match self {
            SpeedClass::Basic => "",
            SpeedClass::Fast => "fast-",
            SpeedClass::Express => "express-",
        }
    }

    /// Entity name of the plain belt of this class.
    pub fn belt_name(self) -> &'static str {
        match self {
            SpeedClass::Basic => "transport-belt",
            SpeedClass::Fast => "fast-transport-belt",
            SpeedClass::Express => "express-transport-belt",
        }
    }
}

// ---------------------------------------------------------------------------
// Segment kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndergroundType {
    Input,
    Output,
}

impl UndergroundType {
    pub fn other(self) -> Self {
        match self {
            UndergroundType::Input => UndergroundType::Output,
            UndergroundType::Output => UndergroundType::Input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    Belt,
    Splitter,
    Underground(UndergroundType),
}

impl SegmentKind {
    pub fn is_splitter(self) -> bool {
        matches!(self, SegmentKind::Splitter)
    }

    pub fn underground_type(self) -> Option<UndergroundType> {
        match self {
            SegmentKind::Underground(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Entity family named by an entity name, before the underground type is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityFamily {
    Belt,
    Underground,
    Splitter,
}

/// Resolve an entity name such as `"fast-splitter"`.
pub fn parse_entity_name(name: &str) -> Result<(EntityFamily, SpeedClass), LayoutError> {
    for speed in SpeedClass::all() {
        let Some(rest) = name.strip_prefix(speed.prefix()) else {
            continue;
        };
        let family = match rest {
            "transport-belt" => EntityFamily::Belt,
            "underground-belt" => EntityFamily::Underground,
            "splitter" => EntityFamily::Splitter,
            _ => continue,
        };
        return Ok((family, speed));
    }
    Err(LayoutError::UnknownEntity(name.to_string()))
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A placed, directed layout entity.
///
/// Splitters cover two cells: `position` is the left one relative to the
/// facing, the right one is a single step clockwise of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub speed: SpeedClass,
    pub position: GridPosition,
    pub direction: Direction,
}

impl Segment {
    pub fn new(
        kind: SegmentKind,
        speed: SpeedClass,
        position: GridPosition,
        direction: Direction,
    ) -> Self {
        Self {
            kind,
            speed,
            position,
            direction,
        }
    }

    pub fn belt(speed: SpeedClass, position: GridPosition, direction: Direction) -> Self {
        Self::new(SegmentKind::Belt, speed, position, direction)
    }

    pub fn splitter(speed: SpeedClass, position: GridPosition, direction: Direction) -> Self {
        Self::new(SegmentKind::Splitter, speed, position, direction)
    }

    pub fn underground(
        speed: SpeedClass,
        position: GridPosition,
        direction: Direction,
        ty: UndergroundType,
    ) -> Self {
        Self::new(SegmentKind::Underground(ty), speed, position, direction)
    }

    pub fn is_splitter(&self) -> bool {
        self.kind.is_splitter()
    }

    /// The second cell of a splitter.
    fn right_cell(&self) -> GridPosition {
        self.position.step(self.direction.rotate(2), 1)
    }

    /// Cells covered by this segment, left first.
    pub fn cells(&self) -> Vec<GridPosition> {
        if self.is_splitter() {
            vec![self.position, self.right_cell()]
        } else {
            vec![self.position]
        }
    }

    /// The cell belonging to an endpoint side.
    pub fn cell(&self, side: Side) -> GridPosition {
        match side {
            Side::Right if self.is_splitter() => self.right_cell(),
            _ => self.position,
        }
    }

    /// The cell directly ahead of `cell` along the facing.
    pub fn ahead_of(&self, cell: GridPosition) -> GridPosition {
        cell.step(self.direction, 1)
    }

    /// Which endpoint side a covered cell belongs to.
    ///
    /// For splitters the cell's offset from the splitter center is taken in
    /// doubled coordinates and rotated into the splitter's north-facing frame;
    /// a negative x is the left half.
    pub fn side_of(&self, cell: GridPosition) -> Side {
        if !self.is_splitter() {
            return Side::Center;
        }
        let right = self.right_cell();
        let offset = (
            2 * cell.x - (self.position.x + right.x),
            2 * cell.y - (self.position.y + right.y),
        );
        let (x, _) = Rotation::from_direction(self.direction)
            .inverse()
            .apply(offset);
        if x < 0 { Side::Left } else { Side::Right }
    }

    /// Flow capacity per cycle.
    pub fn capacity(&self) -> Rational {
        whole(self.speed.capacity())
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Every placed segment, in insertion order, plus a cell index.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    segments: SlotMap<SegmentId, Segment>,
    order: Vec<SegmentId>,
    index: SpatialIndex<SegmentId>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a segment. Overlap with existing segments is allowed here and
    /// reported later by the resolver.
    pub fn add(&mut self, segment: Segment) -> Result<SegmentId, LayoutError> {
        if !segment.direction.is_cardinal() {
            return Err(LayoutError::NonCardinalDirection(segment.direction));
        }
        let cells = segment.cells();
        let id = self.segments.insert(segment);
        if let Err(e) = self.index.place(id, &cells) {
            self.segments.remove(id);
            return Err(e.into());
        }
        self.order.push(id);
        Ok(id)
    }

    /// Belt factory, also used when padding a layout.
    pub fn add_belt(
        &mut self,
        position: GridPosition,
        direction: Direction,
        speed: SpeedClass,
    ) -> Result<SegmentId, LayoutError> {
        self.add(Segment::belt(speed, position, direction))
    }

    /// Place an entity by its name.
    pub fn add_entity(
        &mut self,
        name: &str,
        position: GridPosition,
        direction: Direction,
        underground_type: Option<UndergroundType>,
    ) -> Result<SegmentId, LayoutError> {
        let (family, speed) = parse_entity_name(name)?;
        let kind = match family {
            EntityFamily::Belt => SegmentKind::Belt,
            EntityFamily::Splitter => SegmentKind::Splitter,
            EntityFamily::Underground => SegmentKind::Underground(
                underground_type
                    .ok_or_else(|| LayoutError::MissingUndergroundType(name.to_string()))?,
            ),
        };
        self.add(Segment::new(kind, speed, position, direction))
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    /// Segments in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &Segment)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.segments.get(id).map(|segment| (id, segment)))
    }

    pub fn ids(&self) -> &[SegmentId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn index(&self) -> &SpatialIndex<SegmentId> {
        &self.index
    }
}

impl CellLookup<SegmentId> for Layout {
    fn occupants(&self, position: GridPosition) -> &[SegmentId] {
        self.index.occupants(position)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_resolve() {
        assert_eq!(
            parse_entity_name("transport-belt").unwrap(),
            (EntityFamily::Belt, SpeedClass::Basic)
        );
        assert_eq!(
            parse_entity_name("fast-underground-belt").unwrap(),
            (EntityFamily::Underground, SpeedClass::Fast)
        );
        assert_eq!(
            parse_entity_name("express-splitter").unwrap(),
            (EntityFamily::Splitter, SpeedClass::Express)
        );
        assert_eq!(
            parse_entity_name("inserter"),
            Err(LayoutError::UnknownEntity("inserter".into()))
        );
        assert!(parse_entity_name("fast-inserter").is_err());
    }

    #[test]
    fn speed_constants() {
        assert_eq!(SpeedClass::Basic.capacity(), 1);
        assert_eq!(SpeedClass::Express.capacity(), 3);
        assert_eq!(SpeedClass::Fast.max_distance(), 7);
        assert_eq!(SpeedClass::Express.belt_name(), "express-transport-belt");
    }

    #[test]
    fn splitter_cells_follow_facing() {
        let origin = GridPosition::new(0, 0);
        let north = Segment::splitter(SpeedClass::Basic, origin, Direction::North);
        assert_eq!(north.cells(), vec![origin, GridPosition::new(1, 0)]);

        let east = Segment::splitter(SpeedClass::Basic, origin, Direction::East);
        assert_eq!(east.cells(), vec![origin, GridPosition::new(0, 1)]);

        let south = Segment::splitter(SpeedClass::Basic, origin, Direction::South);
        assert_eq!(south.cell(Side::Right), GridPosition::new(-1, 0));
    }

    #[test]
    fn splitter_side_test_in_every_facing() {
        for dir in Direction::cardinals() {
            let splitter = Segment::splitter(SpeedClass::Fast, GridPosition::new(3, -2), dir);
            assert_eq!(splitter.side_of(splitter.cell(Side::Left)), Side::Left);
            assert_eq!(splitter.side_of(splitter.cell(Side::Right)), Side::Right);
        }
        let belt = Segment::belt(SpeedClass::Basic, GridPosition::new(0, 0), Direction::West);
        assert_eq!(belt.side_of(GridPosition::new(0, 0)), Side::Center);
    }

    #[test]
    fn layout_keeps_insertion_order() {
        let mut layout = Layout::new();
        let a = layout
            .add_belt(GridPosition::new(0, 1), Direction::North, SpeedClass::Basic)
            .unwrap();
        let b = layout
            .add_entity("splitter", GridPosition::new(0, 0), Direction::North, None)
            .unwrap();

        let ids: Vec<_> = layout.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(layout.occupants(GridPosition::new(1, 0)), &[b]);
        assert_eq!(layout.len(), 2);
    }

    #[test]
    fn layout_rejects_bad_entities() {
        let mut layout = Layout::new();
        assert_eq!(
            layout.add_belt(GridPosition::new(0, 0), Direction::NorthEast, SpeedClass::Basic),
            Err(LayoutError::NonCardinalDirection(Direction::NorthEast))
        );
        assert_eq!(
            layout.add_entity("underground-belt", GridPosition::new(0, 0), Direction::North, None),
            Err(LayoutError::MissingUndergroundType("underground-belt".into()))
        );
        assert!(layout.is_empty());
    }

    #[test]
    fn overlapping_placement_is_kept() {
        let mut layout = Layout::new();
        let pos = GridPosition::new(2, 2);
        layout.add_belt(pos, Direction::North, SpeedClass::Basic).unwrap();
        layout.add_belt(pos, Direction::East, SpeedClass::Basic).unwrap();
        assert_eq!(layout.index().overlapping_cells(), vec![pos]);
    }
}
