//! The flow graph and its simulation cycle.
//!
//! A [`Balancer`] owns splitter nodes and belt edges in slotmap arenas. One
//! [`cycle`](Balancer::cycle) runs every splitter in traversal order and then
//! pushes every belt into its `next` belt in creation order. External inputs
//! and outputs are [`Port`]s.

use crate::error::BalancerError;
use crate::flow::{Belt, Splitter, transfer};
use crate::id::{BeltId, SplitterId};
use crate::rational::{Rational, percentage, sum};
use num_traits::Zero;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::VecDeque;
use tracing::debug;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// One half of a physical belt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lane {
    Left,
    Right,
}

impl Lane {
    pub fn both() -> [Lane; 2] {
        [Lane::Left, Lane::Right]
    }
}

/// An external input or output: a single belt, or the two lane belts of one
/// physical belt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    belts: Vec<BeltId>,
}

impl Port {
    pub fn single(belt: BeltId) -> Self {
        Self { belts: vec![belt] }
    }

    pub fn lanes(left: BeltId, right: BeltId) -> Self {
        Self {
            belts: vec![left, right],
        }
    }

    /// A port over any number of belts.
    pub fn from_belts(belts: Vec<BeltId>) -> Self {
        Self { belts }
    }

    pub fn belts(&self) -> &[BeltId] {
        &self.belts
    }

    fn capacity(&self, belts: &SlotMap<BeltId, Belt>) -> Rational {
        sum(self.belts.iter().map(|&id| belts[id].capacity()))
    }

    fn content(&self, belts: &SlotMap<BeltId, Belt>) -> Rational {
        sum(self.belts.iter().map(|&id| belts[id].content()))
    }

    /// Supply `amount` (full capacity when `None`), split across the lanes in
    /// proportion to their capacity. Returns the amount added.
    fn supply(&self, belts: &mut SlotMap<BeltId, Belt>, amount: Option<&Rational>) -> Rational {
        let total = self.capacity(belts);
        let mut added = Rational::zero();
        for &id in &self.belts {
            let belt = &mut belts[id];
            let share = amount.map(|amount| amount * belt.capacity() / &total);
            added += belt.supply(share.as_ref());
        }
        added
    }

    fn drain(&self, belts: &mut SlotMap<BeltId, Belt>) -> Rational {
        let mut drained = Rational::zero();
        for &id in &self.belts {
            drained += belts[id].clear();
        }
        drained
    }
}

// ---------------------------------------------------------------------------
// Balancer
// ---------------------------------------------------------------------------

/// A built flow graph.
#[derive(Debug, Clone, Default)]
pub struct Balancer {
    splitters: SlotMap<SplitterId, Splitter>,
    splitter_order: Vec<SplitterId>,
    belts: SlotMap<BeltId, Belt>,
    belt_order: Vec<BeltId>,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl Balancer {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Construction --

    pub fn add_belt(&mut self, capacity: Rational) -> BeltId {
        let id = self.belts.insert(Belt::new(capacity));
        self.belt_order.push(id);
        id
    }

    pub fn add_splitter(&mut self, splitter: Splitter) -> SplitterId {
        let id = self.splitters.insert(splitter);
        self.splitter_order.push(id);
        id
    }

    pub fn add_input(&mut self, port: Port) {
        self.inputs.push(port);
    }

    pub fn add_output(&mut self, port: Port) {
        self.outputs.push(port);
    }

    /// Make `from` push its content into `to` every cycle.
    pub fn link(&mut self, from: BeltId, to: BeltId) {
        if let Some(belt) = self.belts.get_mut(from) {
            belt.next = Some(to);
        }
    }

    // -- Access --

    pub fn belt(&self, id: BeltId) -> Option<&Belt> {
        self.belts.get(id)
    }

    pub fn belt_mut(&mut self, id: BeltId) -> Option<&mut Belt> {
        self.belts.get_mut(id)
    }

    pub fn splitter(&self, id: SplitterId) -> Option<&Splitter> {
        self.splitters.get(id)
    }

    pub fn splitter_mut(&mut self, id: SplitterId) -> Option<&mut Splitter> {
        self.splitters.get_mut(id)
    }

    /// Splitters in traversal order.
    pub fn splitters(&self) -> impl Iterator<Item = (SplitterId, &Splitter)> + '_ {
        self.splitter_order
            .iter()
            .filter_map(|&id| self.splitters.get(id).map(|s| (id, s)))
    }

    /// Belts in creation order.
    pub fn belts(&self) -> impl Iterator<Item = (BeltId, &Belt)> + '_ {
        self.belt_order
            .iter()
            .filter_map(|&id| self.belts.get(id).map(|b| (id, b)))
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn splitter_count(&self) -> usize {
        self.splitters.len()
    }

    pub fn belt_count(&self) -> usize {
        self.belts.len()
    }

    /// Rough number of cycles a change needs to propagate through the graph.
    pub fn estimate_iterations(&self) -> usize {
        (self.splitter_count() * 2 + self.input_count() + self.output_count() + 1) * 4
    }

    // -- Simulation --

    /// Balance every splitter, then move every belt's content forward.
    pub fn cycle(&mut self) {
        for &id in &self.splitter_order {
            if let Some(splitter) = self.splitters.get(id) {
                splitter.balance(&mut self.belts);
            }
        }
        for &id in &self.belt_order {
            transfer(&mut self.belts, id);
        }
    }

    /// Empty every belt. Returns the total removed.
    pub fn clear(&mut self) -> Rational {
        let mut total = Rational::zero();
        for belt in self.belts.values_mut() {
            total += belt.clear();
        }
        total
    }

    /// Fill every belt. Returns the total added.
    pub fn fill(&mut self) -> Rational {
        let mut total = Rational::zero();
        for belt in self.belts.values_mut() {
            total += belt.supply(None);
        }
        total
    }

    /// Supply every input. Returns the amount added per input.
    pub fn supply(&mut self, amount: Option<&Rational>) -> Vec<Rational> {
        self.inputs
            .iter()
            .map(|port| port.supply(&mut self.belts, amount))
            .collect()
    }

    /// Drain every output. Returns the amount removed per output.
    pub fn drain(&mut self) -> Vec<Rational> {
        self.outputs
            .iter()
            .map(|port| port.drain(&mut self.belts))
            .collect()
    }

    /// Supply a single input. Panics on an out-of-range index.
    pub fn supply_input(&mut self, index: usize, amount: Option<&Rational>) -> Rational {
        self.inputs[index].supply(&mut self.belts, amount)
    }

    /// Drain a single output. Panics on an out-of-range index.
    pub fn drain_output(&mut self, index: usize) -> Rational {
        self.outputs[index].drain(&mut self.belts)
    }

    pub fn total_content(&self) -> Rational {
        sum(self.belts.values().map(Belt::content))
    }

    /// Fill level of an output as a percentage of its capacity.
    pub fn output_percentage(&self, index: usize) -> Rational {
        let port = &self.outputs[index];
        percentage(&port.content(&self.belts), &port.capacity(&self.belts))
    }

    // -- Structure --

    /// Check that the graph has inputs and outputs and is a single connected
    /// piece when edges are followed in both directions from the first input.
    pub fn check_connected(&self) -> Result<(), BalancerError> {
        let Some(start) = self.inputs.first() else {
            return Err(BalancerError::NoInputs);
        };
        if self.outputs.is_empty() {
            return Err(BalancerError::NoOutputs);
        }

        let mut touching: SecondaryMap<BeltId, Vec<Node>> = SecondaryMap::new();
        for &id in &self.splitter_order {
            if let Some(splitter) = self.splitters.get(id) {
                for belt in splitter.belts() {
                    push(&mut touching, belt, Node::Splitter(id));
                }
            }
        }
        for (id, belt) in self.belts.iter() {
            if let Some(next) = belt.next {
                push(&mut touching, id, Node::Belt(next));
                push(&mut touching, next, Node::Belt(id));
            }
        }
        for port in self.inputs.iter().chain(&self.outputs) {
            for &a in port.belts() {
                for &b in port.belts() {
                    if a != b {
                        push(&mut touching, a, Node::Belt(b));
                    }
                }
            }
        }

        let mut seen_belts: SecondaryMap<BeltId, ()> = SecondaryMap::new();
        let mut seen_splitters: SecondaryMap<SplitterId, ()> = SecondaryMap::new();
        let mut queue: VecDeque<Node> = start.belts().iter().map(|&id| Node::Belt(id)).collect();
        while let Some(node) = queue.pop_front() {
            match node {
                Node::Belt(id) => {
                    if seen_belts.insert(id, ()).is_some() {
                        continue;
                    }
                    if let Some(neighbors) = touching.get(id) {
                        queue.extend(neighbors.iter().copied());
                    }
                }
                Node::Splitter(id) => {
                    if seen_splitters.insert(id, ()).is_some() {
                        continue;
                    }
                    if let Some(splitter) = self.splitters.get(id) {
                        queue.extend(splitter.belts().map(Node::Belt));
                    }
                }
            }
        }

        let unreached = self
            .splitters
            .keys()
            .filter(|&id| !seen_splitters.contains_key(id))
            .count()
            + self
                .outputs
                .iter()
                .filter(|port| port.belts().iter().all(|&id| !seen_belts.contains_key(id)))
                .count();
        if unreached > 0 {
            debug!(unreached, "flow graph is not connected");
            return Err(BalancerError::DisconnectedNetwork { unreached });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Belt(BeltId),
    Splitter(SplitterId),
}

fn push(touching: &mut SecondaryMap<BeltId, Vec<Node>>, belt: BeltId, node: Node) {
    if let Some(entry) = touching.entry(belt) {
        entry.or_default().push(node);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
