//! Flow graph elements: belt edges and splitter nodes.
//!
//! Belts hold an exact amount of flow between zero and their capacity.
//! Splitters move flow from their input belts to their output belts, sharing
//! it evenly across the active sides unless a side has priority.

use crate::id::BeltId;
use crate::rational::{Rational, from_count, percentage};
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

// ---------------------------------------------------------------------------
// Belt
// ---------------------------------------------------------------------------

/// A flow edge with a fixed capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct Belt {
    capacity: Rational,
    content: Rational,
    /// Belt this one pushes its content into on every cycle.
    pub next: Option<BeltId>,
}

impl Belt {
    /// An empty belt. Panics unless `capacity` is positive.
    pub fn new(capacity: Rational) -> Self {
        assert!(capacity.is_positive(), "belt capacity must be positive");
        Self {
            capacity,
            content: Rational::zero(),
            next: None,
        }
    }

    pub fn capacity(&self) -> &Rational {
        &self.capacity
    }

    pub fn content(&self) -> &Rational {
        &self.content
    }

    /// Set the content. Panics outside `[0, capacity]`.
    pub fn set_content(&mut self, value: Rational) {
        assert!(
            !value.is_negative() && value <= self.capacity,
            "belt content {value} outside [0, {}]",
            self.capacity
        );
        self.content = value;
    }

    pub fn available(&self) -> Rational {
        &self.capacity - &self.content
    }

    pub fn percentage(&self) -> Rational {
        percentage(&self.content, &self.capacity)
    }

    pub fn is_full(&self) -> bool {
        self.content == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_zero()
    }

    /// Set the content to `amount` (the capacity when `None` or larger).
    /// Returns how much was added, negative if content went down.
    pub fn supply(&mut self, amount: Option<&Rational>) -> Rational {
        let target = match amount {
            Some(amount) if *amount < self.capacity => amount.clone(),
            _ => self.capacity.clone(),
        };
        let added = &target - &self.content;
        self.set_content(target);
        added
    }

    /// Empty the belt. Returns what was removed.
    pub fn clear(&mut self) -> Rational {
        std::mem::replace(&mut self.content, Rational::zero())
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Which side of a splitter is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Off,
    Left,
    Right,
}

impl Priority {
    fn pick<T>(self, left: Option<T>, right: Option<T>) -> Option<T> {
        match self {
            Priority::Off => None,
            Priority::Left => left,
            Priority::Right => right,
        }
    }
}

// ---------------------------------------------------------------------------
// Splitter
// ---------------------------------------------------------------------------

/// A two-in, two-out flow node. Any slot may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Splitter {
    pub input_left: Option<BeltId>,
    pub input_right: Option<BeltId>,
    pub output_left: Option<BeltId>,
    pub output_right: Option<BeltId>,
    pub input_priority: Priority,
    pub output_priority: Priority,
}

impl Splitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priorities(input_priority: Priority, output_priority: Priority) -> Self {
        Self {
            input_priority,
            output_priority,
            ..Self::default()
        }
    }

    /// Connected input belts, left first.
    pub fn inputs(&self) -> impl Iterator<Item = BeltId> + '_ {
        self.input_left.into_iter().chain(self.input_right)
    }

    /// Connected output belts, left first.
    pub fn outputs(&self) -> impl Iterator<Item = BeltId> + '_ {
        self.output_left.into_iter().chain(self.output_right)
    }

    /// Every connected slot.
    pub fn belts(&self) -> impl Iterator<Item = BeltId> + '_ {
        self.inputs().chain(self.outputs())
    }

    fn active_inputs(&self, belts: &SlotMap<BeltId, Belt>, credited: &[BeltId]) -> Vec<BeltId> {
        let usable = |slot: Option<BeltId>| {
            slot.filter(|id| {
                !credited.contains(id) && belts.get(*id).is_some_and(|belt| !belt.is_empty())
            })
        };
        if let Some(id) = usable(self.input_priority.pick(self.input_left, self.input_right)) {
            return vec![id];
        }
        [self.input_left, self.input_right]
            .into_iter()
            .filter_map(usable)
            .collect()
    }

    fn active_outputs(&self, belts: &SlotMap<BeltId, Belt>, debited: &[BeltId]) -> Vec<BeltId> {
        let usable = |slot: Option<BeltId>| {
            slot.filter(|id| {
                !debited.contains(id) && belts.get(*id).is_some_and(|belt| !belt.is_full())
            })
        };
        if let Some(id) = usable(self.output_priority.pick(self.output_left, self.output_right)) {
            return vec![id];
        }
        [self.output_left, self.output_right]
            .into_iter()
            .filter_map(usable)
            .collect()
    }

    /// Move as much flow as possible from inputs to outputs. Returns the
    /// total amount moved.
    ///
    /// A belt credited during this call is not drawn from again, and a belt
    /// drawn from is not credited, so a splitter looping onto itself settles.
    pub fn balance(&self, belts: &mut SlotMap<BeltId, Belt>) -> Rational {
        let mut moved = Rational::zero();
        let mut credited = Vec::new();
        let mut debited = Vec::new();

        loop {
            let inputs = self.active_inputs(belts, &credited);
            let outputs = self.active_outputs(belts, &debited);
            if inputs.is_empty() || outputs.is_empty() {
                break;
            }

            let min_content = smallest(inputs.iter().map(|&id| belts[id].content().clone()));
            let min_room = smallest(outputs.iter().map(|&id| belts[id].available()));
            let amount = (min_content * from_count(inputs.len()))
                .min(min_room * from_count(outputs.len()));
            if amount.is_zero() {
                break;
            }

            let debit = &amount / from_count(inputs.len());
            for id in inputs {
                let belt = &mut belts[id];
                belt.set_content(belt.content() - &debit);
                debited.push(id);
            }
            let credit = &amount / from_count(outputs.len());
            for id in outputs {
                let belt = &mut belts[id];
                belt.set_content(belt.content() + &credit);
                credited.push(id);
            }
            moved += amount;
        }
        moved
    }
}

fn smallest(values: impl Iterator<Item = Rational>) -> Rational {
    values.min().unwrap_or_else(Rational::zero)
}

/// Push a belt's content into its `next` belt, as much as fits.
pub(crate) fn transfer(belts: &mut SlotMap<BeltId, Belt>, id: BeltId) {
    let Some(next) = belts.get(id).and_then(|belt| belt.next) else {
        return;
    };
    if next == id {
        return;
    }
    let Some(room) = belts.get(next).map(Belt::available) else {
        return;
    };
    let amount = belts[id].content().clone().min(room);
    if amount.is_zero() {
        return;
    }
    let source = &mut belts[id];
    source.set_content(source.content() - &amount);
    let target = &mut belts[next];
    target.set_content(target.content() + &amount);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
