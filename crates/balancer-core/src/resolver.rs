//! Connectivity resolution.
//!
//! Works out which segment feeds which from grid geometry alone. Every
//! segment is checked independently and all configuration errors are
//! collected before anything is returned, so a broken layout reports every
//! problem at once.

use crate::balancer::Lane;
use crate::connection::{ConnectionTable, Endpoint, Side};
use crate::error::{IllegalConfiguration, IllegalConfigurations};
use crate::id::SegmentId;
use crate::segment::{Layout, Segment, SegmentKind, UndergroundType};
use balancer_spatial::{CellLookup, GridPosition, Rotation};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// How a feed enters a sideload point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// From behind, or out of an underground tunnel.
    Straight,
    /// From one side, onto that lane.
    Side(Lane),
}

/// The feeds merging at one sideload point, at most one per way in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideloadFeeds {
    pub straight: Option<Endpoint>,
    pub left: Option<Endpoint>,
    pub right: Option<Endpoint>,
}

impl SideloadFeeds {
    pub fn side(&self, lane: Lane) -> Option<Endpoint> {
        match lane {
            Lane::Left => self.left,
            Lane::Right => self.right,
        }
    }
}

/// The validated connection graph of a layout.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    connections: ConnectionTable,
    sideloads: Vec<SegmentId>,
    feeds: BTreeMap<SegmentId, SideloadFeeds>,
    inputs: Vec<SegmentId>,
    outputs: Vec<SegmentId>,
}

impl Resolution {
    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Whether any belt or underground merges more than one feed.
    pub fn has_sideloads(&self) -> bool {
        !self.sideloads.is_empty()
    }

    pub fn is_sideload(&self, segment: SegmentId) -> bool {
        self.sideloads.contains(&segment)
    }

    /// Sideload points in layout order.
    pub fn sideloads(&self) -> &[SegmentId] {
        &self.sideloads
    }

    /// The classified feeds of a sideload point.
    pub fn feeds(&self, point: SegmentId) -> Option<&SideloadFeeds> {
        self.feeds.get(&point)
    }

    /// Segments nothing feeds, in layout order.
    pub fn inputs(&self) -> &[SegmentId] {
        &self.inputs
    }

    /// Segments that feed nothing, in layout order.
    pub fn outputs(&self) -> &[SegmentId] {
        &self.outputs
    }
}

/// Resolve a layout using its own cell index.
pub fn resolve(layout: &Layout) -> Result<Resolution, IllegalConfigurations> {
    resolve_with(layout, layout)
}

/// Resolve a layout against an explicit cell lookup.
#[instrument(skip_all, fields(segments = layout.len()))]
pub fn resolve_with<L: CellLookup<SegmentId>>(
    layout: &Layout,
    lookup: &L,
) -> Result<Resolution, IllegalConfigurations> {
    let mut resolver = Resolver {
        layout,
        lookup,
        connections: ConnectionTable::new(),
    };
    let mut errors = IllegalConfigurations::new();

    for (_, segment) in layout.iter() {
        for cell in segment.cells() {
            let occupants = lookup.occupants(cell);
            if occupants.len() > 1 {
                errors.push(IllegalConfiguration::overlapping(cell, occupants));
            }
        }
    }

    for (id, segment) in layout.iter() {
        if let Err(e) = resolver.connect_segment(id, segment) {
            errors.push(e);
        }
    }

    if !errors.is_empty() {
        debug!(errors = errors.len(), "layout rejected");
        return Err(errors);
    }

    let connections = resolver.connections;
    let mut resolution = Resolution {
        sideloads: Vec::new(),
        feeds: BTreeMap::new(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        connections,
    };
    for (id, segment) in layout.iter() {
        let table = &resolution.connections;
        if !segment.is_splitter() && table.inbound_count(Endpoint::center(id)) > 1 {
            resolution.sideloads.push(id);
        }
        if table.has_no_inputs(id, segment.kind) {
            resolution.inputs.push(id);
        }
        if table.has_no_outputs(id, segment.kind) {
            resolution.outputs.push(id);
        }
    }

    for &point in &resolution.sideloads {
        match sideload_feeds(layout, &resolution.connections, point) {
            Ok(feeds) => {
                resolution.feeds.insert(point, feeds);
            }
            Err(e) => errors.push(e),
        }
    }
    for &input in &resolution.inputs {
        if let Err(e) = check_input_chain(layout, &resolution, input) {
            errors.push(e);
        }
    }
    if !errors.is_empty() {
        debug!(errors = errors.len(), "feeds or input chains rejected");
        return Err(errors);
    }

    debug!(
        connections = resolution.connections.len(),
        sideloads = resolution.sideloads.len(),
        inputs = resolution.inputs.len(),
        outputs = resolution.outputs.len(),
        "layout resolved"
    );
    Ok(resolution)
}

// ---------------------------------------------------------------------------
// Per-segment rules
// ---------------------------------------------------------------------------

struct Resolver<'a, L> {
    layout: &'a Layout,
    lookup: &'a L,
    connections: ConnectionTable,
}

impl<L: CellLookup<SegmentId>> Resolver<'_, L> {
    fn connect_segment(
        &mut self,
        id: SegmentId,
        segment: &Segment,
    ) -> Result<(), IllegalConfiguration> {
        match segment.kind {
            SegmentKind::Belt => self.connect_ahead(id, segment, segment.position, Side::Center),
            SegmentKind::Splitter => {
                for side in [Side::Left, Side::Right] {
                    self.connect_ahead(id, segment, segment.cell(side), side)?;
                }
                Ok(())
            }
            SegmentKind::Underground(ty) => self.connect_underground(id, segment, ty),
        }
    }

    /// The single occupant of `cell`, or an overlap error.
    fn sole_occupant(&self, cell: GridPosition) -> Result<Option<SegmentId>, IllegalConfiguration> {
        match self.lookup.occupants(cell) {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            many => Err(IllegalConfiguration::overlapping(cell, many)),
        }
    }

    /// Feed whatever sits directly ahead of `cell`.
    fn connect_ahead(
        &mut self,
        id: SegmentId,
        segment: &Segment,
        cell: GridPosition,
        side: Side,
    ) -> Result<(), IllegalConfiguration> {
        let target = segment.ahead_of(cell);
        let Some(other_id) = self.sole_occupant(target)? else {
            return Ok(());
        };
        let Some(other) = self.layout.get(other_id) else {
            return Ok(());
        };

        if other.direction == segment.direction.opposite() {
            return Err(IllegalConfiguration::facing_each_other(id, other_id));
        }
        if other.direction != segment.direction && other.is_splitter() {
            return Err(IllegalConfiguration::SideloadOntoSplitter {
                segment: id,
                splitter: other_id,
            });
        }
        self.link(
            Endpoint::new(id, side),
            Endpoint::new(other_id, other.side_of(target)),
        )
    }

    fn connect_underground(
        &mut self,
        id: SegmentId,
        segment: &Segment,
        ty: UndergroundType,
    ) -> Result<(), IllegalConfiguration> {
        let partner = self.find_partner(id, segment, ty)?;
        match (ty, partner) {
            (UndergroundType::Input, None) => {
                return Err(IllegalConfiguration::LoneUndergroundInput { segment: id });
            }
            (UndergroundType::Input, Some(output)) => {
                self.link(Endpoint::center(id), Endpoint::center(output))?;
            }
            (UndergroundType::Output, Some(input)) => {
                self.link(Endpoint::center(input), Endpoint::center(id))?;
            }
            (UndergroundType::Output, None) => {}
        }

        if ty == UndergroundType::Output {
            self.connect_ahead(id, segment, segment.position, Side::Center)?;
        }
        Ok(())
    }

    /// Search for the tunnel partner: forward for inputs, backward for outputs.
    fn find_partner(
        &self,
        id: SegmentId,
        segment: &Segment,
        ty: UndergroundType,
    ) -> Result<Option<SegmentId>, IllegalConfiguration> {
        let search = match ty {
            UndergroundType::Input => segment.direction,
            UndergroundType::Output => segment.direction.opposite(),
        };

        for distance in 1..=segment.speed.max_distance() {
            let cell = segment.position.step(search, distance);
            let Some(other_id) = self.sole_occupant(cell)? else {
                continue;
            };
            let Some(other) = self.layout.get(other_id) else {
                continue;
            };
            let Some(other_ty) = other.kind.underground_type() else {
                continue;
            };
            if other.speed != segment.speed {
                continue;
            }

            let same = other.direction == segment.direction;
            let opposite = other.direction == segment.direction.opposite();
            match (ty, other_ty) {
                (UndergroundType::Input, UndergroundType::Input) if same => {
                    return Err(IllegalConfiguration::underground_inputs_in_row(id, other_id));
                }
                (UndergroundType::Input, _) if opposite => {
                    return Err(IllegalConfiguration::connected_underground_inputs(id, other_id));
                }
                (UndergroundType::Output, UndergroundType::Output) if opposite => {
                    return Err(IllegalConfiguration::connected_underground_outputs(id, other_id));
                }
                _ if same && other_ty == ty.other() => return Ok(Some(other_id)),
                _ => {}
            }
        }
        Ok(None)
    }

    fn link(&mut self, from: Endpoint, to: Endpoint) -> Result<(), IllegalConfiguration> {
        self.connections
            .connect(from, to)
            .map(|_| ())
            .map_err(|conflict| IllegalConfiguration::ConflictingConnection {
                segment: from.segment,
                existing: conflict.existing.segment,
                requested: to.segment,
            })
    }
}

// ---------------------------------------------------------------------------
// Sideload points
// ---------------------------------------------------------------------------

/// Classify how `feeder` enters `point`: from behind, out of a tunnel, or
/// from either side.
pub fn classify_feed(layout: &Layout, point: SegmentId, feeder: Endpoint) -> Option<Feed> {
    let target = layout.get(point)?;
    let source = layout.get(feeder.segment)?;
    if source.kind == SegmentKind::Underground(UndergroundType::Input) {
        return Some(Feed::Straight);
    }

    let cell = source.cell(feeder.side);
    let offset = (cell.x - target.position.x, cell.y - target.position.y);
    match Rotation::from_direction(target.direction).inverse().apply(offset) {
        (0, 1) => Some(Feed::Straight),
        (-1, 0) => Some(Feed::Side(Lane::Left)),
        (1, 0) => Some(Feed::Side(Lane::Right)),
        _ => None,
    }
}

/// Sort the feeds of a sideload point into their ways in. Two feeds sharing
/// one way in cannot both be placed.
fn sideload_feeds(
    layout: &Layout,
    connections: &ConnectionTable,
    point: SegmentId,
) -> Result<SideloadFeeds, IllegalConfiguration> {
    let mut feeds = SideloadFeeds::default();
    let mut feeders = Vec::new();
    let mut clash = false;
    for feeder in connections.backward(Endpoint::center(point)) {
        feeders.push(feeder.segment);
        let slot = match classify_feed(layout, point, feeder) {
            Some(Feed::Straight) => &mut feeds.straight,
            Some(Feed::Side(Lane::Left)) => &mut feeds.left,
            Some(Feed::Side(Lane::Right)) => &mut feeds.right,
            None => {
                clash = true;
                continue;
            }
        };
        if slot.replace(feeder).is_some() {
            clash = true;
        }
    }

    if clash {
        return Err(IllegalConfiguration::conflicting_feeds(point, &feeders));
    }
    Ok(feeds)
}

// ---------------------------------------------------------------------------
// Input chains
// ---------------------------------------------------------------------------

/// Follow an external input forward until it reaches a splitter or a
/// sideload point. A chain that stops before either is rejected.
fn check_input_chain(
    layout: &Layout,
    resolution: &Resolution,
    input: SegmentId,
) -> Result<(), IllegalConfiguration> {
    let mut visited = BTreeSet::new();
    let mut current = input;
    loop {
        let Some(segment) = layout.get(current) else {
            return Ok(());
        };
        if segment.is_splitter() || !visited.insert(current) {
            return Ok(());
        }
        let Some(next) = resolution.connections.forward(Endpoint::center(current)) else {
            return Err(IllegalConfiguration::NoForwardPartner { segment: current });
        };
        if resolution.is_sideload(next.segment) {
            return Ok(());
        }
        current = next.segment;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SpeedClass;
    use balancer_spatial::Direction;

    fn pos(x: i32, y: i32) -> GridPosition {
        GridPosition::new(x, y)
    }

    fn belt(layout: &mut Layout, x: i32, y: i32, dir: Direction) -> SegmentId {
        layout.add_belt(pos(x, y), dir, SpeedClass::Basic).unwrap()
    }

    fn underground(
        layout: &mut Layout,
        x: i32,
        y: i32,
        dir: Direction,
        ty: UndergroundType,
    ) -> SegmentId {
        layout
            .add(Segment::underground(SpeedClass::Basic, pos(x, y), dir, ty))
            .unwrap()
    }

    fn splitter(layout: &mut Layout, x: i32, y: i32, dir: Direction) -> SegmentId {
        layout
            .add(Segment::splitter(SpeedClass::Basic, pos(x, y), dir))
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Belts and splitters
    // -----------------------------------------------------------------------

    #[test]
    fn belt_feeds_splitter_side() {
        let mut layout = Layout::new();
        let s = splitter(&mut layout, 0, 0, Direction::North);
        let left = belt(&mut layout, 0, 1, Direction::North);
        let right = belt(&mut layout, 1, 1, Direction::North);
        let out = belt(&mut layout, 1, -1, Direction::North);

        let resolution = resolve(&layout).unwrap();
        let table = resolution.connections();
        assert_eq!(
            table.forward(Endpoint::center(left)),
            Some(Endpoint::new(s, Side::Left))
        );
        assert_eq!(
            table.forward(Endpoint::center(right)),
            Some(Endpoint::new(s, Side::Right))
        );
        assert_eq!(
            table.forward(Endpoint::new(s, Side::Right)),
            Some(Endpoint::center(out))
        );
        assert_eq!(table.forward(Endpoint::new(s, Side::Left)), None);
        assert_eq!(resolution.inputs(), &[left, right]);
        assert_eq!(resolution.outputs(), &[out]);
        assert!(!resolution.has_sideloads());
    }

    #[test]
    fn head_on_belts_report_one_error() {
        let mut layout = Layout::new();
        let a = belt(&mut layout, 0, 0, Direction::North);
        let b = belt(&mut layout, 0, -1, Direction::South);

        let errors = resolve(&layout).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.contains(&IllegalConfiguration::facing_each_other(a, b)));
    }

    #[test]
    fn overlap_is_reported_once() {
        let mut layout = Layout::new();
        let a = belt(&mut layout, 0, 0, Direction::North);
        let b = belt(&mut layout, 0, 0, Direction::North);
        let _feeder = belt(&mut layout, 0, 1, Direction::North);

        let errors = resolve(&layout).unwrap_err();
        assert_eq!(
            errors.into_vec(),
            vec![IllegalConfiguration::overlapping(pos(0, 0), &[a, b])]
        );
    }

    #[test]
    fn sideload_onto_splitter_rejected() {
        let mut layout = Layout::new();
        let s = splitter(&mut layout, 0, 0, Direction::North);
        let side = belt(&mut layout, -1, 0, Direction::East);

        let errors = resolve(&layout).unwrap_err();
        assert!(errors.contains(&IllegalConfiguration::SideloadOntoSplitter {
            segment: side,
            splitter: s,
        }));
    }

    #[test]
    fn sideload_detected() {
        let mut layout = Layout::new();
        let behind = belt(&mut layout, 0, 2, Direction::North);
        let merge = belt(&mut layout, 0, 1, Direction::North);
        belt(&mut layout, 0, 0, Direction::North);
        let side = belt(&mut layout, -1, 1, Direction::East);

        let resolution = resolve(&layout).unwrap();
        assert_eq!(resolution.sideloads(), &[merge]);
        assert_eq!(resolution.inputs().len(), 2);
        assert_eq!(
            resolution.feeds(merge),
            Some(&SideloadFeeds {
                straight: Some(Endpoint::center(behind)),
                left: Some(Endpoint::center(side)),
                right: None,
            })
        );
    }

    #[test]
    fn t_junction_feeds_both_lanes() {
        let mut layout = Layout::new();
        let west = belt(&mut layout, -1, 0, Direction::East);
        let east = belt(&mut layout, 1, 0, Direction::West);
        let point = belt(&mut layout, 0, 0, Direction::North);

        let resolution = resolve(&layout).unwrap();
        let feeds = resolution.feeds(point).unwrap();
        assert_eq!(feeds.straight, None);
        assert_eq!(feeds.side(Lane::Left), Some(Endpoint::center(west)));
        assert_eq!(feeds.side(Lane::Right), Some(Endpoint::center(east)));
        assert_eq!(resolution.outputs(), &[point]);
    }

    #[test]
    fn feeds_classified_in_the_target_frame() {
        let mut layout = Layout::new();
        let point = belt(&mut layout, 0, 0, Direction::East);
        let north = belt(&mut layout, 0, -1, Direction::South);
        let behind = belt(&mut layout, -1, 0, Direction::East);

        assert_eq!(
            classify_feed(&layout, point, Endpoint::center(north)),
            Some(Feed::Side(Lane::Left))
        );
        assert_eq!(
            classify_feed(&layout, point, Endpoint::center(behind)),
            Some(Feed::Straight)
        );
    }

    // -----------------------------------------------------------------------
    // Undergrounds
    // -----------------------------------------------------------------------

    #[test]
    fn underground_pair_at_max_distance() {
        let mut layout = Layout::new();
        let input = underground(&mut layout, 0, 0, Direction::North, UndergroundType::Input);
        let output = underground(&mut layout, 0, -5, Direction::North, UndergroundType::Output);
        let s = splitter(&mut layout, 0, -6, Direction::North);

        let resolution = resolve(&layout).unwrap();
        let table = resolution.connections();
        assert_eq!(
            table.forward(Endpoint::center(input)),
            Some(Endpoint::center(output))
        );
        assert_eq!(
            table.forward(Endpoint::center(output)),
            Some(Endpoint::new(s, Side::Left))
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn underground_one_past_max_distance_is_lone() {
        let mut layout = Layout::new();
        let input = underground(&mut layout, 0, 0, Direction::North, UndergroundType::Input);
        underground(&mut layout, 0, -6, Direction::North, UndergroundType::Output);

        let errors = resolve(&layout).unwrap_err();
        assert_eq!(
            errors.into_vec(),
            vec![IllegalConfiguration::LoneUndergroundInput { segment: input }]
        );
    }

    #[test]
    fn underground_skips_other_speeds() {
        let mut layout = Layout::new();
        let input = underground(&mut layout, 0, 0, Direction::North, UndergroundType::Input);
        layout
            .add(Segment::underground(
                SpeedClass::Fast,
                pos(0, -1),
                Direction::East,
                UndergroundType::Output,
            ))
            .unwrap();
        let output = underground(&mut layout, 0, -2, Direction::North, UndergroundType::Output);

        let resolver = Resolver {
            layout: &layout,
            lookup: &layout,
            connections: ConnectionTable::new(),
        };
        let segment = layout.get(input).unwrap();
        assert_eq!(
            resolver.find_partner(input, segment, UndergroundType::Input),
            Ok(Some(output))
        );
    }

    #[test]
    fn underground_output_fed_from_behind_rejected() {
        let mut layout = Layout::new();
        belt(&mut layout, 0, 1, Direction::North);
        let input = underground(&mut layout, 0, 0, Direction::North, UndergroundType::Input);
        let behind = belt(&mut layout, 0, -2, Direction::North);
        let output = underground(&mut layout, 0, -3, Direction::North, UndergroundType::Output);
        splitter(&mut layout, 0, -4, Direction::North);
        belt(&mut layout, 0, -5, Direction::North);
        belt(&mut layout, 1, -5, Direction::North);

        let errors = resolve(&layout).unwrap_err();
        assert_eq!(
            errors.into_vec(),
            vec![IllegalConfiguration::conflicting_feeds(output, &[input, behind])]
        );
    }

    #[test]
    fn underground_inputs_in_a_row() {
        let mut layout = Layout::new();
        let a = underground(&mut layout, 0, 0, Direction::North, UndergroundType::Input);
        let b = underground(&mut layout, 0, -2, Direction::North, UndergroundType::Input);
        underground(&mut layout, 0, -4, Direction::North, UndergroundType::Output);

        let errors = resolve(&layout).unwrap_err();
        assert!(errors.contains(&IllegalConfiguration::underground_inputs_in_row(a, b)));
    }

    #[test]
    fn underground_outputs_facing_apart() {
        let mut layout = Layout::new();
        let a = underground(&mut layout, 0, 0, Direction::North, UndergroundType::Output);
        let b = underground(&mut layout, 0, 2, Direction::South, UndergroundType::Output);

        let errors = resolve(&layout).unwrap_err();
        assert!(errors.contains(&IllegalConfiguration::connected_underground_outputs(a, b)));
    }

    // -----------------------------------------------------------------------
    // Input chains
    // -----------------------------------------------------------------------

    #[test]
    fn dead_end_chain_rejected() {
        let mut layout = Layout::new();
        belt(&mut layout, 0, 1, Direction::North);
        let last = belt(&mut layout, 0, 0, Direction::North);

        let errors = resolve(&layout).unwrap_err();
        assert_eq!(
            errors.into_vec(),
            vec![IllegalConfiguration::NoForwardPartner { segment: last }]
        );
    }
}
