//! Balancer Core -- verification engine for belt balancers.
//!
//! Takes a placed layout of belts, underground belts and splitters, works out
//! how they connect, turns the result into a flow graph of belt edges and
//! splitter nodes, and simulates it with exact rational arithmetic to decide
//! whether the layout balances its inputs and outputs and how much throughput
//! it sustains.
//!
//! # Pipeline
//!
//! 1. **Pad** -- [`padding::pad_connections`] adds belts in front of and
//!    behind external splitters so every boundary is a belt.
//! 2. **Resolve** -- [`resolver::resolve`] links neighbouring segments and
//!    pairs undergrounds, collecting every illegal configuration it finds.
//! 3. **Build** -- [`builder::build`] walks the connections from each input
//!    and produces a [`balancer::Balancer`]. Layouts with sideloads are built
//!    per lane.
//! 4. **Test** -- [`tester::Tester`] drives the graph to a steady state for
//!    balance and throughput checks; [`report::test`] bundles them.
//!
//! ```rust,ignore
//! let mut balancer = Balancer::from_layout(&mut layout)?;
//! let report = balancer.test(&TestOptions::default())?;
//! ```
//!
//! # Key Types
//!
//! - [`segment::Layout`] -- Placed segments with a spatial index.
//! - [`connection::ConnectionTable`] -- Directed endpoint-to-endpoint edges.
//! - [`flow::Belt`] / [`flow::Splitter`] -- Flow edges and nodes.
//! - [`rational::Rational`] -- Exact arbitrary-precision flow quantities.
//! - [`error::BalancerError`] -- Every failure the pipeline can report.

pub mod balancer;
pub mod builder;
pub mod connection;
pub mod error;
pub mod flow;
pub mod id;
pub mod padding;
pub mod rational;
pub mod report;
pub mod resolver;
pub mod segment;
pub mod tester;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use balancer::{Balancer, Lane, Port};
pub use error::{BalancerError, IllegalConfiguration, IllegalConfigurations, LayoutError};
pub use report::{Report, ReportValue, TestOptions};
pub use segment::{Layout, Segment, SpeedClass};
pub use tester::{Tester, ThroughputResult};
