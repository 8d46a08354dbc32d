//! Directed connections between layout segments.
//!
//! Connections are stored as an edge list with per-endpoint indices rather
//! than as references between segments. An OUTPUT endpoint feeds at most one
//! INPUT endpoint; an INPUT endpoint may have several OUTPUT endpoints merging
//! into it, which is what makes a sideload.

use crate::id::SegmentId;
use crate::segment::SegmentKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which part of a segment an endpoint belongs to. Splitters have a left and
/// a right endpoint on each end; everything else has a single center one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Center,
    Left,
    Right,
}

impl Side {
    /// Endpoint sides a segment of this kind exposes.
    pub fn for_kind(kind: SegmentKind) -> &'static [Side] {
        if kind.is_splitter() {
            &[Side::Left, Side::Right]
        } else {
            &[Side::Center]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConnectionType {
    Input,
    Output,
}

/// One end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub segment: SegmentId,
    pub side: Side,
}

impl Endpoint {
    pub fn new(segment: SegmentId, side: Side) -> Self {
        Self { segment, side }
    }

    pub fn center(segment: SegmentId) -> Self {
        Self::new(segment, Side::Center)
    }
}

/// A directed edge from an OUTPUT endpoint to an INPUT endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// Raised when an OUTPUT endpoint is asked to feed a second target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("output {from:?} already feeds {existing:?}")]
pub struct ConnectionConflict {
    pub from: Endpoint,
    pub existing: Endpoint,
}

// ---------------------------------------------------------------------------
// ConnectionTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    edges: Vec<Connection>,
    outgoing: BTreeMap<Endpoint, usize>,
    incoming: BTreeMap<Endpoint, Vec<usize>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `from` (an OUTPUT) to `to` (an INPUT). Returns `Ok(false)` if
    /// the identical connection already exists.
    pub fn connect(&mut self, from: Endpoint, to: Endpoint) -> Result<bool, ConnectionConflict> {
        if let Some(&index) = self.outgoing.get(&from) {
            let existing = self.edges[index].to;
            if existing == to {
                return Ok(false);
            }
            return Err(ConnectionConflict { from, existing });
        }

        let index = self.edges.len();
        self.edges.push(Connection { from, to });
        self.outgoing.insert(from, index);
        self.incoming.entry(to).or_default().push(index);
        Ok(true)
    }

    /// The INPUT endpoint fed by `from`, if any.
    pub fn forward(&self, from: Endpoint) -> Option<Endpoint> {
        self.outgoing.get(&from).map(|&index| self.edges[index].to)
    }

    /// Every OUTPUT endpoint feeding `to`, in connection order.
    pub fn backward(&self, to: Endpoint) -> impl Iterator<Item = Endpoint> + '_ {
        self.incoming
            .get(&to)
            .into_iter()
            .flatten()
            .map(|&index| self.edges[index].from)
    }

    pub fn inbound_count(&self, to: Endpoint) -> usize {
        self.incoming.get(&to).map_or(0, Vec::len)
    }

    pub fn is_connected(&self, endpoint: Endpoint, connection_type: ConnectionType) -> bool {
        match connection_type {
            ConnectionType::Output => self.outgoing.contains_key(&endpoint),
            ConnectionType::Input => self.inbound_count(endpoint) > 0,
        }
    }

    /// True when nothing feeds any input endpoint of the segment.
    pub fn has_no_inputs(&self, segment: SegmentId, kind: SegmentKind) -> bool {
        Side::for_kind(kind)
            .iter()
            .all(|&side| !self.is_connected(Endpoint::new(segment, side), ConnectionType::Input))
    }

    /// True when no output endpoint of the segment feeds anything.
    pub fn has_no_outputs(&self, segment: SegmentId, kind: SegmentKind) -> bool {
        Side::for_kind(kind)
            .iter()
            .all(|&side| !self.is_connected(Endpoint::new(segment, side), ConnectionType::Output))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Connection> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
