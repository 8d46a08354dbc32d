//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::balancer::{Balancer, Port};
use crate::flow::Splitter;
use crate::id::BeltId;
use crate::rational::whole;
use crate::segment::{Layout, Segment, SpeedClass, UndergroundType};
use balancer_spatial::{Direction, GridPosition};

// ===========================================================================
// Flow graph construction
// ===========================================================================

pub fn add_belt(balancer: &mut Balancer, capacity: u32) -> BeltId {
    balancer.add_belt(whole(capacity))
}

/// Add a splitter over the given slots, with no priorities.
pub fn add_splitter(
    balancer: &mut Balancer,
    inputs: [Option<BeltId>; 2],
    outputs: [Option<BeltId>; 2],
) {
    let [input_left, input_right] = inputs;
    let [output_left, output_right] = outputs;
    balancer.add_splitter(Splitter {
        input_left,
        input_right,
        output_left,
        output_right,
        ..Splitter::new()
    });
}

// ===========================================================================
// Scenario graphs
// ===========================================================================

/// Two inputs, two outputs. Each input splits over both mixing splitters,
/// one per output. With `missing_link` the second input only reaches the
/// first output.
pub fn two_by_two(missing_link: bool) -> Balancer {
    let mut b = Balancer::new();
    let a = add_belt(&mut b, 1);
    let c = add_belt(&mut b, 1);
    let a1 = add_belt(&mut b, 1);
    let a2 = add_belt(&mut b, 1);
    let c1 = add_belt(&mut b, 1);
    let c2 = (!missing_link).then(|| add_belt(&mut b, 1));
    let out1 = add_belt(&mut b, 1);
    let out2 = add_belt(&mut b, 1);

    add_splitter(&mut b, [Some(a), None], [Some(a1), Some(a2)]);
    add_splitter(&mut b, [Some(c), None], [Some(c1), c2]);
    add_splitter(&mut b, [Some(a1), Some(c1)], [Some(out1), None]);
    add_splitter(&mut b, [Some(a2), c2], [Some(out2), None]);

    b.add_input(Port::single(a));
    b.add_input(Port::single(c));
    b.add_output(Port::single(out1));
    b.add_output(Port::single(out2));
    b
}

/// Four express inputs merged onto one express trunk. The trunk splits
/// into a basic belt and an express belt; the express belt splits into two
/// basic belts, one of which joins the first basic belt at a junction. The
/// junction and the remaining basic belt each feed two basic outputs.
///
/// A single saturated input fills both basic belts leaving the split, so
/// every output gets half a belt. A trickle reaches the outputs 3:3:1:1.
pub fn four_by_four_mixed_speeds() -> Balancer {
    let mut b = Balancer::new();
    let inputs: Vec<BeltId> = (0..4).map(|_| add_belt(&mut b, 3)).collect();
    let m1 = add_belt(&mut b, 3);
    let m2 = add_belt(&mut b, 3);
    let trunk = add_belt(&mut b, 3);
    let near = add_belt(&mut b, 1);
    let far = add_belt(&mut b, 3);
    let crossing = add_belt(&mut b, 1);
    let straight = add_belt(&mut b, 1);
    let joined = add_belt(&mut b, 1);
    let outputs: Vec<BeltId> = (0..4).map(|_| add_belt(&mut b, 1)).collect();

    add_splitter(&mut b, [Some(inputs[0]), Some(inputs[1])], [Some(m1), None]);
    add_splitter(&mut b, [Some(inputs[2]), Some(inputs[3])], [Some(m2), None]);
    add_splitter(&mut b, [Some(m1), Some(m2)], [Some(trunk), None]);
    add_splitter(&mut b, [Some(trunk), None], [Some(near), Some(far)]);
    add_splitter(&mut b, [Some(far), None], [Some(crossing), Some(straight)]);
    add_splitter(&mut b, [Some(near), Some(crossing)], [Some(joined), None]);
    add_splitter(&mut b, [Some(joined), None], [Some(outputs[0]), Some(outputs[1])]);
    add_splitter(&mut b, [Some(straight), None], [Some(outputs[2]), Some(outputs[3])]);

    for id in inputs {
        b.add_input(Port::single(id));
    }
    for id in outputs {
        b.add_output(Port::single(id));
    }
    b
}

// ===========================================================================
// Layouts
// ===========================================================================

pub fn pos(x: i32, y: i32) -> GridPosition {
    GridPosition::new(x, y)
}

pub fn place_belt(layout: &mut Layout, x: i32, y: i32, direction: Direction, speed: SpeedClass) {
    layout.add_belt(pos(x, y), direction, speed).unwrap();
}

pub fn place_splitter(
    layout: &mut Layout,
    x: i32,
    y: i32,
    direction: Direction,
    speed: SpeedClass,
) {
    layout
        .add(Segment::splitter(speed, pos(x, y), direction))
        .unwrap();
}

pub fn place_underground(
    layout: &mut Layout,
    x: i32,
    y: i32,
    direction: Direction,
    speed: SpeedClass,
    ty: UndergroundType,
) {
    layout
        .add(Segment::underground(speed, pos(x, y), direction, ty))
        .unwrap();
}

/// One express input split three ways: straight onto a basic belt, and into
/// a second express splitter with two basic outputs.
pub fn one_by_three_layout() -> Layout {
    let mut layout = Layout::new();
    place_belt(&mut layout, 0, 4, Direction::North, SpeedClass::Express);
    place_splitter(&mut layout, 0, 3, Direction::North, SpeedClass::Express);
    place_belt(&mut layout, 0, 2, Direction::North, SpeedClass::Basic);
    place_splitter(&mut layout, 1, 2, Direction::North, SpeedClass::Express);
    place_belt(&mut layout, 1, 1, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 2, 1, Direction::North, SpeedClass::Basic);
    layout
}

/// A single splitter with nothing around it.
pub fn lone_splitter_layout(speed: SpeedClass) -> Layout {
    let mut layout = Layout::new();
    place_splitter(&mut layout, 0, 0, Direction::North, speed);
    layout
}

/// A straight line of three basic belts with a fourth belt sideloading
/// onto the middle one from the west.
pub fn sideload_layout() -> Layout {
    let mut layout = Layout::new();
    place_belt(&mut layout, 0, 2, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 0, 1, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 0, 0, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, -1, 1, Direction::East, SpeedClass::Basic);
    layout
}

/// A splitter whose left output line is sideloaded from the west one belt
/// further on. Inputs: both splitter feeds, then the side belt. Outputs: the
/// right splitter output, then the sideloaded line.
pub fn sideloaded_splitter_layout() -> Layout {
    let mut layout = Layout::new();
    place_belt(&mut layout, 0, 1, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 1, 1, Direction::North, SpeedClass::Basic);
    place_splitter(&mut layout, 0, 0, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 0, -1, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 1, -1, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 0, -2, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, -1, -2, Direction::East, SpeedClass::Basic);
    layout
}

/// Two belts sideloading from opposite sides onto a belt with nothing
/// behind it.
pub fn t_junction_layout() -> Layout {
    let mut layout = Layout::new();
    place_belt(&mut layout, -1, 0, Direction::East, SpeedClass::Basic);
    place_belt(&mut layout, 1, 0, Direction::West, SpeedClass::Basic);
    place_belt(&mut layout, 0, 0, Direction::North, SpeedClass::Basic);
    layout
}

/// A belt running into the back of an underground output that is already
/// fed through its tunnel, followed by a splitter.
pub fn underground_fed_from_behind_layout() -> Layout {
    let mut layout = Layout::new();
    place_belt(&mut layout, 0, 1, Direction::North, SpeedClass::Basic);
    place_underground(
        &mut layout,
        0,
        0,
        Direction::North,
        SpeedClass::Basic,
        UndergroundType::Input,
    );
    place_belt(&mut layout, 0, -2, Direction::North, SpeedClass::Basic);
    place_underground(
        &mut layout,
        0,
        -3,
        Direction::North,
        SpeedClass::Basic,
        UndergroundType::Output,
    );
    place_splitter(&mut layout, 0, -4, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 0, -5, Direction::North, SpeedClass::Basic);
    place_belt(&mut layout, 1, -5, Direction::North, SpeedClass::Basic);
    layout
}

/// Two belts running into each other.
pub fn head_on_layout() -> Layout {
    let mut layout = Layout::new();
    place_belt(&mut layout, 0, 0, Direction::East, SpeedClass::Basic);
    place_belt(&mut layout, 1, 0, Direction::West, SpeedClass::Basic);
    layout
}
