//! Convergence-based property tests.
//!
//! Every test drives the flow graph with a fixed supply/drain pattern until
//! what leaves the outputs matches what enters the inputs, then inspects the
//! steady state. Runs that never settle stop at a cycle cap with
//! [`BalancerError::DidNotConverge`].

use crate::balancer::Balancer;
use crate::error::BalancerError;
use crate::rational::{Rational, Tolerance, ratio, sum, to_f64, whole};
use tracing::{debug, info, instrument, trace, warn};

/// Flow offered per input in trickle mode, a quarter of a basic belt.
pub fn trickle_amount() -> Rational {
    ratio(1, 4)
}

/// Multiplier on [`Balancer::estimate_iterations`] for the default cycle cap.
const CYCLE_CAP_FACTOR: usize = 64;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a throughput run.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputResult {
    /// Whether the active outputs carried everything the active inputs offered.
    pub full: bool,
    /// Lowest fill level seen on an active output, in percent.
    pub worst: Rational,
}

impl ThroughputResult {
    pub fn worst_percentage(&self) -> f64 {
        to_f64(&self.worst)
    }
}

/// Drained and supplied amounts of one drive round.
struct Round {
    drained: Vec<Rational>,
    supplied: Vec<Rational>,
}

// ---------------------------------------------------------------------------
// Tester
// ---------------------------------------------------------------------------

/// Test driver. Holds the closeness tolerance and the cycle cap.
#[derive(Debug, Clone, Default)]
pub struct Tester {
    pub tolerance: Tolerance,
    /// Cycle cap; `None` uses `estimate_iterations() * 64`.
    pub max_cycles: Option<usize>,
}

impl Tester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = Some(max_cycles);
        self
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn cycle_cap(&self, balancer: &Balancer) -> usize {
        self.max_cycles
            .unwrap_or_else(|| balancer.estimate_iterations() * CYCLE_CAP_FACTOR)
    }

    /// Repeat `round` until the drained total is close to the supplied total.
    /// The first round is called with `first = true`.
    fn converge<F>(&self, balancer: &mut Balancer, mut round: F) -> Result<Round, BalancerError>
    where
        F: FnMut(&mut Balancer, bool) -> Round,
    {
        let cap = self.cycle_cap(balancer);
        let mut state = round(balancer, true);
        let mut cycles = 0;
        while !self
            .tolerance
            .is_close(&sum(&state.drained), &sum(&state.supplied))
        {
            if cycles >= cap {
                warn!(cycles, "no steady state reached");
                return Err(BalancerError::DidNotConverge { cycles });
            }
            state = round(balancer, false);
            cycles += 1;
        }
        trace!(cycles, "steady state");
        Ok(state)
    }

    // -- Balance --

    /// Feed each input alone, then all together, and require every output
    /// to receive the same amount at steady state.
    ///
    /// "The same" means within [`Tester::tolerance`] of the first output.
    /// Amounts are exact rationals, so a zero tolerance compares exactly.
    #[instrument(skip_all, fields(trickle = trickle))]
    pub fn test_output_balance(
        &self,
        balancer: &mut Balancer,
        trickle: bool,
    ) -> Result<bool, BalancerError> {
        let amount = trickle.then(trickle_amount);
        let amount = amount.as_ref();

        for input in 0..balancer.input_count() {
            balancer.clear();
            let state = self.converge(balancer, |b, first| {
                if !first {
                    b.cycle();
                }
                Round {
                    drained: b.drain(),
                    supplied: vec![b.supply_input(input, amount)],
                }
            })?;
            if !self.tolerance.all_close(&state.drained) {
                debug!(input, "outputs unbalanced");
                return Ok(false);
            }
        }

        balancer.clear();
        let state = self.converge(balancer, |b, first| {
            if !first {
                b.cycle();
            }
            Round {
                drained: b.drain(),
                supplied: b.supply(amount),
            }
        })?;
        Ok(self.tolerance.all_close(&state.drained))
    }

    /// Draw from each output alone, then all together, and require every
    /// input to give up the same amount at steady state. Trickle mode starts
    /// from an empty graph and offers a quarter belt per input.
    ///
    /// Input amounts are compared within [`Tester::tolerance`], exactly when
    /// that tolerance is zero.
    #[instrument(skip_all, fields(trickle = trickle))]
    pub fn test_input_balance(
        &self,
        balancer: &mut Balancer,
        trickle: bool,
    ) -> Result<bool, BalancerError> {
        let amount = trickle.then(trickle_amount);
        let amount = amount.as_ref();
        let reset = |b: &mut Balancer| {
            if trickle {
                b.clear();
            } else {
                b.fill();
            }
        };

        for output in 0..balancer.output_count() {
            reset(balancer);
            let state = self.converge(balancer, |b, first| {
                if !first {
                    b.cycle();
                }
                Round {
                    drained: vec![b.drain_output(output)],
                    supplied: b.supply(amount),
                }
            })?;
            if !self.tolerance.all_close(&state.supplied) {
                debug!(output, "inputs unbalanced");
                return Ok(false);
            }
        }

        reset(balancer);
        let state = self.converge(balancer, |b, first| {
            if !first {
                b.cycle();
            }
            Round {
                drained: b.drain(),
                supplied: b.supply(amount),
            }
        })?;
        Ok(self.tolerance.all_close(&state.supplied))
    }

    // -- Throughput --

    /// Run the selected inputs and outputs at full supply.
    pub fn test_throughput(
        &self,
        balancer: &mut Balancer,
        inputs: &[usize],
        outputs: &[usize],
    ) -> Result<ThroughputResult, BalancerError> {
        let drain = |b: &mut Balancer| -> Vec<Rational> {
            outputs.iter().map(|&j| b.drain_output(j)).collect()
        };
        let supply = |b: &mut Balancer| -> Vec<Rational> {
            inputs.iter().map(|&i| b.supply_input(i, None)).collect()
        };

        balancer.clear();
        let mut clean = Vec::new();
        self.converge(balancer, |b, first| {
            let drained = drain(b);
            if !first {
                b.cycle();
            }
            let supplied = supply(b);
            if first {
                clean = supplied.clone();
            }
            Round { drained, supplied }
        })?;

        let hundred = whole(100);
        let mut worst = hundred.clone();
        for &j in outputs {
            let level = balancer.output_percentage(j);
            if !self.tolerance.is_close(&worst, &level) && level < worst {
                worst = level;
            }
        }
        let drained = drain(balancer);

        let full = self.tolerance.is_close(&sum(&clean), &sum(&drained)) || worst >= hundred;
        Ok(ThroughputResult { full, worst })
    }

    /// Throughput of every equal-sized pairing of input and output subsets.
    /// Sizes run over `1..=min(inputs, outputs)` when `extensive`, otherwise
    /// over `1..=2` capped by that minimum. Each run uses its own copy of the
    /// graph; results come back in combination order.
    #[instrument(skip_all, fields(extensive = extensive))]
    pub fn throughput_sweep(
        &self,
        balancer: &Balancer,
        extensive: bool,
    ) -> Result<Vec<ThroughputResult>, BalancerError> {
        let (n_in, n_out) = (balancer.input_count(), balancer.output_count());
        let max_k = sweep_size(n_in, n_out, extensive);

        let mut runs = Vec::new();
        for k in 1..=max_k {
            for inputs in combinations(n_in, k) {
                for outputs in combinations(n_out, k) {
                    runs.push((inputs.clone(), outputs));
                }
            }
        }
        info!(runs = runs.len(), "throughput sweep");

        let run = |(inputs, outputs): &(Vec<usize>, Vec<usize>)| {
            let mut copy = balancer.clone();
            self.test_throughput(&mut copy, inputs, outputs)
        };

        #[cfg(feature = "parallel")]
        let results = {
            use rayon::prelude::*;
            runs.par_iter().map(run).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results = runs.iter().map(run).collect();
        results
    }

    /// Fold a sweep into one result: full only if every run was full, with
    /// the lowest bottleneck among the limited runs.
    pub fn test_throughput_unlimited(
        &self,
        balancer: &Balancer,
        extensive: bool,
    ) -> Result<ThroughputResult, BalancerError> {
        let mut folded = ThroughputResult {
            full: true,
            worst: whole(100),
        };
        for result in self.throughput_sweep(balancer, extensive)? {
            if result.full {
                continue;
            }
            folded.full = false;
            if !self.tolerance.is_close(&folded.worst, &result.worst) && result.worst < folded.worst
            {
                folded.worst = result.worst;
            }
        }
        Ok(folded)
    }
}

// ---------------------------------------------------------------------------
// Combinatorics
// ---------------------------------------------------------------------------

fn sweep_size(inputs: usize, outputs: usize, extensive: bool) -> usize {
    let limit = inputs.min(outputs);
    if extensive { limit } else { limit.min(2) }
}

fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Number of runs a sweep performs: pairings of size `1..=max_k`.
pub fn nr_of_combinations(inputs: usize, outputs: usize, max_k: usize) -> usize {
    (1..=max_k.min(inputs).min(outputs))
        .map(|k| binomial(inputs, k) * binomial(outputs, k))
        .sum()
}

/// Every size-`k` subset of `0..n`, in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if k > n {
        return result;
    }
    let mut current: Vec<usize> = (0..k).collect();
    loop {
        result.push(current.clone());
        let Some(pos) = (0..k).rev().find(|&i| current[i] < n - k + i) else {
            break;
        };
        current[pos] += 1;
        for i in pos + 1..k {
            current[i] = current[i - 1] + 1;
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Balancer shortcuts
// ---------------------------------------------------------------------------

impl Balancer {
    pub fn test_output_balance(&mut self, trickle: bool) -> Result<bool, BalancerError> {
        Tester::default().test_output_balance(self, trickle)
    }

    pub fn test_input_balance(&mut self, trickle: bool) -> Result<bool, BalancerError> {
        Tester::default().test_input_balance(self, trickle)
    }

    /// Full throughput with every input and output active.
    pub fn test_throughput(&mut self) -> Result<ThroughputResult, BalancerError> {
        let inputs: Vec<usize> = (0..self.input_count()).collect();
        let outputs: Vec<usize> = (0..self.output_count()).collect();
        Tester::default().test_throughput(self, &inputs, &outputs)
    }

    pub fn test_throughput_unlimited(
        &self,
        extensive: bool,
    ) -> Result<ThroughputResult, BalancerError> {
        Tester::default().test_throughput_unlimited(self, extensive)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
