//! Flow graph construction from a resolved layout.
//!
//! Chains of belts and undergrounds collapse into single flow belts whose
//! capacity is the slowest segment along the chain. Layout splitters become
//! [`Splitter`] nodes, created the first time a chain reaches them.
//!
//! When the layout has sideloads every chain is built twice, once per lane,
//! at half capacity. A sideload point becomes a small cluster of synthetic
//! splitters: a join that merges both lanes of the side feed into one lane,
//! and a merge that lets the straight feed go first.
//!
//! Construction uses a FIFO worklist. Walking a chain never mutates the
//! graph, so reaching a splitter or sideload point only schedules more work.

use crate::balancer::{Balancer, Lane, Port};
use crate::connection::{Endpoint, Side};
use crate::error::BalancerError;
use crate::flow::{Priority, Splitter};
use crate::id::{BeltId, SegmentId, SplitterId};
use crate::padding::pad_connections;
use crate::rational::{Rational, ratio, whole};
use crate::resolver::{Resolution, resolve};
use crate::segment::{Layout, SpeedClass};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, instrument, warn};

// ---------------------------------------------------------------------------
// Tracks and chains
// ---------------------------------------------------------------------------

/// What part of a physical belt a flow belt models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Track {
    Whole,
    Lane(Lane),
}

impl Track {
    fn capacity(self, speed: SpeedClass) -> Rational {
        match self {
            Track::Whole => whole(speed.capacity()),
            Track::Lane(_) => ratio(i64::from(speed.capacity()), 2),
        }
    }
}

/// Where a chain stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainEnd {
    /// Into a splitter input side.
    Splitter(Endpoint),
    /// Into a sideload point, fed from `feeder`.
    Sideload { point: SegmentId, feeder: Endpoint },
    /// Nowhere: the last segment is an external output.
    Output(SegmentId),
}

#[derive(Debug, Clone, Copy)]
struct Chain {
    end: ChainEnd,
    speed: SpeedClass,
}

/// Where a chain arriving at a sideload point is plugged in.
#[derive(Debug, Clone, Copy)]
enum Sink {
    Input(SplitterId, Lane),
    Link(BeltId),
}

enum Job {
    /// Build the chain leaving one output side of a splitter.
    SplitterOutput {
        segment: SegmentId,
        side: Side,
        track: Track,
        node: SplitterId,
    },
    /// Plug an already created belt into the end of its chain.
    Attach {
        belt: BeltId,
        end: ChainEnd,
        track: Track,
    },
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct GraphBuilder<'a> {
    layout: &'a Layout,
    resolution: &'a Resolution,
    balancer: Balancer,
    nodes: BTreeMap<(SegmentId, Track), SplitterId>,
    merged: BTreeSet<SegmentId>,
    sinks: BTreeMap<(SegmentId, Endpoint, Lane), Sink>,
    /// Chains that reached a sideload point with no sink for them.
    stranded: usize,
    outputs: Vec<(SegmentId, Vec<BeltId>)>,
    output_index: BTreeMap<SegmentId, usize>,
    queue: VecDeque<Job>,
}

/// Build the flow graph of a resolved layout.
#[instrument(skip_all, fields(segments = layout.len(), sideloads = resolution.sideloads().len()))]
pub fn build(layout: &Layout, resolution: &Resolution) -> Result<Balancer, BalancerError> {
    let tracks: &[Track] = if resolution.has_sideloads() {
        &[Track::Lane(Lane::Left), Track::Lane(Lane::Right)]
    } else {
        &[Track::Whole]
    };
    debug!(lanes = resolution.has_sideloads(), "building flow graph");

    let mut builder = GraphBuilder {
        layout,
        resolution,
        balancer: Balancer::new(),
        nodes: BTreeMap::new(),
        merged: BTreeSet::new(),
        sinks: BTreeMap::new(),
        stranded: 0,
        outputs: Vec::new(),
        output_index: BTreeMap::new(),
        queue: VecDeque::new(),
    };

    for &input in resolution.inputs() {
        builder.add_input(input, tracks);
        builder.drain_queue();
    }
    builder.finish()
}

impl GraphBuilder<'_> {
    fn add_input(&mut self, input: SegmentId, tracks: &[Track]) {
        let Some(segment) = self.layout.get(input) else {
            return;
        };

        if segment.is_splitter() {
            for side in [Side::Left, Side::Right] {
                let mut lanes = Vec::with_capacity(tracks.len());
                for &track in tracks {
                    let node = self.ensure_splitter(input, track);
                    let belt = self.balancer.add_belt(track.capacity(segment.speed));
                    self.set_input(node, side_lane(side), belt);
                    lanes.push(belt);
                }
                self.balancer.add_input(port_of(lanes));
            }
            return;
        }

        let mut lanes = Vec::with_capacity(tracks.len());
        for &track in tracks {
            let chain = self.walk(Endpoint::center(input), None, segment.speed);
            let belt = self.balancer.add_belt(track.capacity(chain.speed));
            self.attach(belt, chain.end, track);
            lanes.push(belt);
        }
        self.balancer.add_input(port_of(lanes));
    }

    fn drain_queue(&mut self) {
        while let Some(job) = self.queue.pop_front() {
            match job {
                Job::SplitterOutput {
                    segment,
                    side,
                    track,
                    node,
                } => self.build_splitter_output(segment, side, track, node),
                Job::Attach { belt, end, track } => self.attach(belt, end, track),
            }
        }
    }

    /// Follow a chain from `start` until a splitter, a sideload point or a
    /// dead end. `from` is the output endpoint feeding `start`, if any.
    fn walk(&self, start: Endpoint, from: Option<Endpoint>, speed: SpeedClass) -> Chain {
        let connections = self.resolution.connections();
        let mut speed = speed;
        let mut current = start;
        let mut from = from;
        let mut visited = BTreeSet::new();

        loop {
            let Some(segment) = self.layout.get(current.segment) else {
                return Chain {
                    end: ChainEnd::Output(current.segment),
                    speed,
                };
            };
            speed = speed.min(segment.speed);

            if segment.is_splitter() {
                return Chain {
                    end: ChainEnd::Splitter(current),
                    speed,
                };
            }
            if let Some(feeder) = from {
                if self.resolution.is_sideload(current.segment) {
                    return Chain {
                        end: ChainEnd::Sideload {
                            point: current.segment,
                            feeder,
                        },
                        speed,
                    };
                }
            }

            let out = Endpoint::center(current.segment);
            match connections.forward(out) {
                Some(next) if visited.insert(current.segment) => {
                    from = Some(out);
                    current = next;
                }
                _ => {
                    return Chain {
                        end: ChainEnd::Output(current.segment),
                        speed,
                    };
                }
            }
        }
    }

    fn attach(&mut self, belt: BeltId, end: ChainEnd, track: Track) {
        match end {
            ChainEnd::Splitter(endpoint) => {
                let node = self.ensure_splitter(endpoint.segment, track);
                self.set_input(node, side_lane(endpoint.side), belt);
            }
            ChainEnd::Sideload { point, feeder } => {
                self.ensure_merge(point);
                let Track::Lane(lane) = track else {
                    return;
                };
                match self.sinks.get(&(point, feeder, lane)) {
                    Some(&Sink::Input(node, side)) => self.set_input(node, side, belt),
                    Some(&Sink::Link(next)) => self.balancer.link(belt, next),
                    None => {
                        warn!(?point, ?feeder, "feed has no place at sideload point");
                        self.stranded += 1;
                    }
                }
            }
            ChainEnd::Output(segment) => {
                let index = *self.output_index.entry(segment).or_insert_with(|| {
                    self.outputs.push((segment, Vec::new()));
                    self.outputs.len() - 1
                });
                self.outputs[index].1.push(belt);
            }
        }
    }

    fn build_splitter_output(
        &mut self,
        segment: SegmentId,
        side: Side,
        track: Track,
        node: SplitterId,
    ) {
        let Some(splitter) = self.layout.get(segment) else {
            return;
        };
        let from = Endpoint::new(segment, side);
        let Some(target) = self.resolution.connections().forward(from) else {
            return;
        };

        let chain = self.walk(target, Some(from), splitter.speed);
        let belt = self.balancer.add_belt(track.capacity(chain.speed));
        if let Some(node) = self.balancer.splitter_mut(node) {
            match side_lane(side) {
                Lane::Left => node.output_left = Some(belt),
                Lane::Right => node.output_right = Some(belt),
            }
        }
        self.attach(belt, chain.end, track);
    }

    /// The flow node of a layout splitter, created on first use.
    fn ensure_splitter(&mut self, segment: SegmentId, track: Track) -> SplitterId {
        if let Some(&node) = self.nodes.get(&(segment, track)) {
            return node;
        }
        let node = self.balancer.add_splitter(Splitter::new());
        self.nodes.insert((segment, track), node);
        for side in [Side::Left, Side::Right] {
            self.queue.push_back(Job::SplitterOutput {
                segment,
                side,
                track,
                node,
            });
        }
        node
    }

    fn set_input(&mut self, node: SplitterId, side: Lane, belt: BeltId) {
        if let Some(node) = self.balancer.splitter_mut(node) {
            match side {
                Lane::Left => node.input_left = Some(belt),
                Lane::Right => node.input_right = Some(belt),
            }
        }
    }

    // -- Sideload points --

    /// Build the merge cluster of a sideload point, once.
    fn ensure_merge(&mut self, point: SegmentId) {
        if !self.merged.insert(point) {
            return;
        }
        let Some(segment) = self.layout.get(point) else {
            return;
        };
        let Some(&feeds) = self.resolution.feeds(point) else {
            return;
        };
        let straight = feeds.straight;

        for lane in Lane::both() {
            let track = Track::Lane(lane);
            let chain = self.walk(Endpoint::center(point), None, segment.speed);
            let out = self.balancer.add_belt(track.capacity(chain.speed));
            self.queue.push_back(Job::Attach {
                belt: out,
                end: chain.end,
                track,
            });

            let join = feeds.side(lane).map(|side| {
                let node = self.balancer.add_splitter(Splitter::new());
                for feeder_lane in Lane::both() {
                    self.sinks
                        .insert((point, side, feeder_lane), Sink::Input(node, feeder_lane));
                }
                node
            });

            match (straight, join) {
                (Some(straight), Some(join)) => {
                    let joined = self.balancer.add_belt(track.capacity(segment.speed));
                    if let Some(node) = self.balancer.splitter_mut(join) {
                        node.output_left = Some(joined);
                    }
                    let merge = self.balancer.add_splitter(Splitter {
                        input_right: Some(joined),
                        output_left: Some(out),
                        input_priority: Priority::Left,
                        ..Splitter::new()
                    });
                    self.sinks
                        .insert((point, straight, lane), Sink::Input(merge, Lane::Left));
                }
                (Some(straight), None) => {
                    self.sinks.insert((point, straight, lane), Sink::Link(out));
                }
                (None, Some(join)) => {
                    if let Some(node) = self.balancer.splitter_mut(join) {
                        node.output_left = Some(out);
                    }
                }
                (None, None) => {}
            }
        }
    }

    // -- Completion --

    fn finish(mut self) -> Result<Balancer, BalancerError> {
        for (_, belts) in std::mem::take(&mut self.outputs) {
            self.balancer.add_output(port_of(belts));
        }

        let reached: BTreeSet<SegmentId> = self.nodes.keys().map(|&(segment, _)| segment).collect();
        let unreached = self
            .layout
            .iter()
            .filter(|(id, segment)| {
                if segment.is_splitter() {
                    !reached.contains(id)
                } else {
                    self.resolution.is_sideload(*id) && !self.merged.contains(id)
                }
            })
            .count()
            + self.stranded;
        if unreached > 0 {
            debug!(unreached, "layout nodes never reached from an input");
            return Err(BalancerError::DisconnectedNetwork { unreached });
        }
        self.balancer.check_connected()?;

        info!(
            splitters = self.balancer.splitter_count(),
            belts = self.balancer.belt_count(),
            inputs = self.balancer.input_count(),
            outputs = self.balancer.output_count(),
            "flow graph built"
        );
        Ok(self.balancer)
    }
}

fn side_lane(side: Side) -> Lane {
    match side {
        Side::Right => Lane::Right,
        Side::Left | Side::Center => Lane::Left,
    }
}

fn port_of(belts: Vec<BeltId>) -> Port {
    match belts.as_slice() {
        [left, right] => Port::lanes(*left, *right),
        _ => Port::from_belts(belts),
    }
}

// ---------------------------------------------------------------------------
// Layout entry point
// ---------------------------------------------------------------------------

impl Balancer {
    /// Pad, resolve and build a layout in one go.
    pub fn from_layout(layout: &mut Layout) -> Result<Balancer, BalancerError> {
        pad_connections(layout)?;
        let resolution = resolve(layout)?;
        build(layout, &resolution)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use balancer_spatial::{Direction, GridPosition};

    fn pos(x: i32, y: i32) -> GridPosition {
        GridPosition::new(x, y)
    }

    fn belt(layout: &mut Layout, x: i32, y: i32, dir: Direction, speed: SpeedClass) {
        layout.add_belt(pos(x, y), dir, speed).unwrap();
    }

    fn splitter(layout: &mut Layout, x: i32, y: i32, speed: SpeedClass) {
        layout
            .add(Segment::splitter(speed, pos(x, y), Direction::North))
            .unwrap();
    }

    #[test]
    fn chain_capacity_is_slowest_segment() {
        let mut layout = Layout::new();
        belt(&mut layout, 0, 4, Direction::North, SpeedClass::Express);
        splitter(&mut layout, 0, 3, SpeedClass::Express);
        belt(&mut layout, 0, 2, Direction::North, SpeedClass::Basic);
        splitter(&mut layout, 1, 2, SpeedClass::Express);
        belt(&mut layout, 1, 1, Direction::North, SpeedClass::Basic);
        belt(&mut layout, 2, 1, Direction::North, SpeedClass::Basic);

        let balancer = Balancer::from_layout(&mut layout).unwrap();
        assert_eq!(balancer.input_count(), 1);
        assert_eq!(balancer.output_count(), 3);
        assert_eq!(balancer.splitter_count(), 2);

        let capacities: Vec<Rational> = balancer
            .belts()
            .map(|(_, belt)| belt.capacity().clone())
            .collect();
        assert_eq!(
            capacities,
            vec![whole(3), whole(1), whole(3), whole(1), whole(1)]
        );
    }

    #[test]
    fn lone_splitter_is_padded() {
        let mut layout = Layout::new();
        splitter(&mut layout, 0, 0, SpeedClass::Basic);

        let balancer = Balancer::from_layout(&mut layout).unwrap();
        assert_eq!(layout.len(), 5);
        assert_eq!(balancer.input_count(), 2);
        assert_eq!(balancer.output_count(), 2);
        assert_eq!(balancer.splitter_count(), 1);
    }

    #[test]
    fn unpadded_splitter_input_gets_ports() {
        let mut layout = Layout::new();
        splitter(&mut layout, 0, 0, SpeedClass::Basic);
        let resolution = resolve(&layout).unwrap();

        // both sides dangle: the ports exist but nothing leaves the splitter
        let err = build(&layout, &resolution).unwrap_err();
        assert_eq!(err, BalancerError::NoOutputs);
    }

    #[test]
    fn sideload_builds_lane_graph() {
        let mut layout = Layout::new();
        belt(&mut layout, 0, 2, Direction::North, SpeedClass::Basic);
        belt(&mut layout, 0, 1, Direction::North, SpeedClass::Basic);
        belt(&mut layout, 0, 0, Direction::North, SpeedClass::Basic);
        belt(&mut layout, -1, 1, Direction::East, SpeedClass::Basic);

        let balancer = Balancer::from_layout(&mut layout).unwrap();
        assert_eq!(balancer.input_count(), 2);
        assert_eq!(balancer.output_count(), 1);
        // join + merge on the left lane only
        assert_eq!(balancer.splitter_count(), 2);
        for port in balancer.inputs().iter().chain(balancer.outputs()) {
            assert_eq!(port.belts().len(), 2);
        }
        for (_, belt) in balancer.belts() {
            assert_eq!(belt.capacity(), &ratio(1, 2));
        }
    }

    #[test]
    fn unreachable_splitter_is_disconnected() {
        let mut layout = Layout::new();
        belt(&mut layout, 0, 1, Direction::North, SpeedClass::Basic);
        splitter(&mut layout, 0, 0, SpeedClass::Basic);
        belt(&mut layout, 0, -1, Direction::North, SpeedClass::Basic);
        belt(&mut layout, 1, -1, Direction::North, SpeedClass::Basic);

        // a splitter whose left output loops back into its left input
        splitter(&mut layout, 10, 0, SpeedClass::Basic);
        belt(&mut layout, 10, -1, Direction::West, SpeedClass::Basic);
        belt(&mut layout, 9, -1, Direction::South, SpeedClass::Basic);
        belt(&mut layout, 9, 0, Direction::South, SpeedClass::Basic);
        belt(&mut layout, 9, 1, Direction::East, SpeedClass::Basic);
        belt(&mut layout, 10, 1, Direction::North, SpeedClass::Basic);

        let resolution = resolve(&layout).unwrap();
        assert!(!resolution.has_sideloads());
        let err = build(&layout, &resolution).unwrap_err();
        assert_eq!(err, BalancerError::DisconnectedNetwork { unreached: 1 });
    }
}
