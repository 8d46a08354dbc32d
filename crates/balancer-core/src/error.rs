//! Error types for layout assembly, resolution, building and testing.
//!
//! Resolution never stops at the first problem: every offending fact is an
//! [`IllegalConfiguration`], and all of them are returned together.

use crate::id::SegmentId;
use balancer_spatial::{Direction, GridPosition, SpatialError};
use std::fmt;

// ---------------------------------------------------------------------------
// Layout errors
// ---------------------------------------------------------------------------

/// Errors raised while assembling a layout, before any resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("underground entity '{0}' needs an input/output type")]
    MissingUndergroundType(String),
    #[error("entities must face a cardinal direction, got {0:?}")]
    NonCardinalDirection(Direction),
    #[error("invalid direction index {0}")]
    InvalidDirection(u8),
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// One offending geometric fact found while resolving a layout.
///
/// Pair variants store their segments in ascending order so that the same
/// fact found from either side compares equal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalConfiguration {
    #[error("more than one entity occupying the same space at ({}, {})", .position.x, .position.y)]
    OverlappingEntities {
        position: GridPosition,
        occupants: Vec<SegmentId>,
    },
    #[error("entities facing each other")]
    FacingEachOther { first: SegmentId, second: SegmentId },
    #[error("sideloading onto a splitter")]
    SideloadOntoSplitter {
        segment: SegmentId,
        splitter: SegmentId,
    },
    #[error("two underground inputs in a row")]
    UndergroundInputsInRow { first: SegmentId, second: SegmentId },
    #[error("two connected underground inputs")]
    ConnectedUndergroundInputs { first: SegmentId, second: SegmentId },
    #[error("two connected underground outputs")]
    ConnectedUndergroundOutputs { first: SegmentId, second: SegmentId },
    #[error("lone underground input")]
    LoneUndergroundInput { segment: SegmentId },
    #[error("entity has no forward partner")]
    NoForwardPartner { segment: SegmentId },
    #[error("more than one feed entering a belt from the same side")]
    ConflictingFeeds {
        segment: SegmentId,
        feeders: Vec<SegmentId>,
    },
    #[error("output already connected elsewhere")]
    ConflictingConnection {
        segment: SegmentId,
        existing: SegmentId,
        requested: SegmentId,
    },
}

fn ordered(a: SegmentId, b: SegmentId) -> (SegmentId, SegmentId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl IllegalConfiguration {
    pub fn overlapping(position: GridPosition, occupants: &[SegmentId]) -> Self {
        let mut occupants = occupants.to_vec();
        occupants.sort();
        Self::OverlappingEntities {
            position,
            occupants,
        }
    }

    pub fn facing_each_other(a: SegmentId, b: SegmentId) -> Self {
        let (first, second) = ordered(a, b);
        Self::FacingEachOther { first, second }
    }

    pub fn underground_inputs_in_row(a: SegmentId, b: SegmentId) -> Self {
        let (first, second) = ordered(a, b);
        Self::UndergroundInputsInRow { first, second }
    }

    pub fn connected_underground_inputs(a: SegmentId, b: SegmentId) -> Self {
        let (first, second) = ordered(a, b);
        Self::ConnectedUndergroundInputs { first, second }
    }

    pub fn connected_underground_outputs(a: SegmentId, b: SegmentId) -> Self {
        let (first, second) = ordered(a, b);
        Self::ConnectedUndergroundOutputs { first, second }
    }

    /// Feeds that cannot all merge into `segment`, such as a belt running
    /// into the back of an underground output.
    pub fn conflicting_feeds(segment: SegmentId, feeders: &[SegmentId]) -> Self {
        let mut feeders = feeders.to_vec();
        feeders.sort();
        Self::ConflictingFeeds { segment, feeders }
    }

    /// Human-readable description of the fact, without the segments.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Segments involved in this fact.
    pub fn segments(&self) -> Vec<SegmentId> {
        match self {
            Self::OverlappingEntities { occupants, .. } => occupants.clone(),
            Self::FacingEachOther { first, second }
            | Self::UndergroundInputsInRow { first, second }
            | Self::ConnectedUndergroundInputs { first, second }
            | Self::ConnectedUndergroundOutputs { first, second } => vec![*first, *second],
            Self::SideloadOntoSplitter { segment, splitter } => vec![*segment, *splitter],
            Self::LoneUndergroundInput { segment } | Self::NoForwardPartner { segment } => {
                vec![*segment]
            }
            Self::ConflictingFeeds { segment, feeders } => {
                let mut segments = vec![*segment];
                segments.extend(feeders);
                segments
            }
            Self::ConflictingConnection {
                segment,
                existing,
                requested,
            } => vec![*segment, *existing, *requested],
        }
    }
}

/// Every configuration error found in a layout, duplicates removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IllegalConfigurations(Vec<IllegalConfiguration>);

impl IllegalConfigurations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error unless an equal one is already present.
    pub fn push(&mut self, error: IllegalConfiguration) {
        if !self.0.contains(&error) {
            self.0.push(error);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IllegalConfiguration> {
        self.0.iter()
    }

    pub fn contains(&self, error: &IllegalConfiguration) -> bool {
        self.0.contains(error)
    }

    pub fn into_vec(self) -> Vec<IllegalConfiguration> {
        self.0
    }
}

impl fmt::Display for IllegalConfigurations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} illegal configuration(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n    {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for IllegalConfigurations {}

impl IntoIterator for IllegalConfigurations {
    type Item = IllegalConfiguration;
    type IntoIter = std::vec::IntoIter<IllegalConfiguration>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<IllegalConfiguration> for IllegalConfigurations {
    fn from(error: IllegalConfiguration) -> Self {
        Self(vec![error])
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Errors from building or testing a balancer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalancerError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    IllegalConfigurations(#[from] IllegalConfigurations),
    #[error("the balancer is not fully connected: {unreached} node(s) unreachable")]
    DisconnectedNetwork { unreached: usize },
    #[error("simulation did not reach a steady state within {cycles} cycles")]
    DidNotConverge { cycles: usize },
    #[error("the balancer has no inputs")]
    NoInputs,
    #[error("the balancer has no outputs")]
    NoOutputs,
}
