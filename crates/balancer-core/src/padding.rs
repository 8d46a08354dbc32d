//! Input and output padding.
//!
//! A splitter that is itself an external input has no belt to carry its feed,
//! so before building, every external input gets a belt placed behind each of
//! its cells whenever any of the inputs is a splitter. Outputs are padded the
//! same way, ahead of their cells.

use crate::error::BalancerError;
use crate::id::SegmentId;
use crate::resolver::resolve;
use crate::segment::Layout;
use tracing::{debug, instrument};

/// Pad a layout in place. Returns the number of belts added.
#[instrument(skip_all, fields(segments = layout.len()))]
pub fn pad_connections(layout: &mut Layout) -> Result<usize, BalancerError> {
    let resolution = resolve(layout)?;
    let inputs = resolution.inputs().to_vec();
    let outputs = resolution.outputs().to_vec();

    let mut added = 0;
    if any_splitter(layout, &inputs) {
        added += pad(layout, &inputs, End::Input)?;
    }
    if any_splitter(layout, &outputs) {
        added += pad(layout, &outputs, End::Output)?;
    }
    if added > 0 {
        debug!(added, "padded external connections");
    }
    Ok(added)
}

#[derive(Clone, Copy)]
enum End {
    Input,
    Output,
}

fn any_splitter(layout: &Layout, segments: &[SegmentId]) -> bool {
    segments
        .iter()
        .filter_map(|&id| layout.get(id))
        .any(|segment| segment.is_splitter())
}

fn pad(layout: &mut Layout, segments: &[SegmentId], end: End) -> Result<usize, BalancerError> {
    let mut added = 0;
    for &id in segments {
        let Some(segment) = layout.get(id).cloned() else {
            continue;
        };
        let step = match end {
            End::Input => -1,
            End::Output => 1,
        };
        for cell in segment.cells() {
            layout.add_belt(cell.step(segment.direction, step), segment.direction, segment.speed)?;
            added += 1;
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Segment, SpeedClass};
    use balancer_spatial::{Direction, GridPosition};

    #[test]
    fn lone_splitter_gets_four_belts() {
        let mut layout = Layout::new();
        layout
            .add(Segment::splitter(
                SpeedClass::Fast,
                GridPosition::new(0, 0),
                Direction::North,
            ))
            .unwrap();

        assert_eq!(pad_connections(&mut layout).unwrap(), 4);
        assert_eq!(layout.len(), 5);

        let resolution = resolve(&layout).unwrap();
        assert_eq!(resolution.inputs().len(), 2);
        assert_eq!(resolution.outputs().len(), 2);
        for &id in resolution.inputs() {
            let belt = layout.get(id).unwrap();
            assert_eq!(belt.speed, SpeedClass::Fast);
            assert_eq!(belt.position.y, 1);
        }
    }

    #[test]
    fn belt_inputs_are_left_alone() {
        let mut layout = Layout::new();
        layout
            .add_belt(GridPosition::new(0, 1), Direction::North, SpeedClass::Basic)
            .unwrap();
        layout
            .add(Segment::splitter(
                SpeedClass::Basic,
                GridPosition::new(0, 0),
                Direction::North,
            ))
            .unwrap();
        layout
            .add_belt(GridPosition::new(1, 1), Direction::North, SpeedClass::Basic)
            .unwrap();

        // inputs are plain belts, outputs are the splitter itself
        assert_eq!(pad_connections(&mut layout).unwrap(), 2);
        assert_eq!(layout.index().occupants(GridPosition::new(1, -1)).len(), 1);
    }
}
