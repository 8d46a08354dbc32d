//! Test selection and the result map.

use crate::balancer::Balancer;
use crate::error::BalancerError;
use crate::tester::Tester;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Which tests [`test`] runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestOptions {
    pub balance: bool,
    /// Also run both balance tests at a trickle supply.
    pub trickle: bool,
    pub throughput: bool,
    pub sweep: bool,
    #[serde(alias = "extensiveSweep")]
    pub extensive_sweep: bool,
    pub max_cycles: Option<usize>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            balance: true,
            trickle: false,
            throughput: false,
            sweep: false,
            extensive_sweep: false,
            max_cycles: None,
        }
    }
}

/// A single report entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportValue {
    Flag(bool),
    Percentage(f64),
}

impl ReportValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ReportValue::Flag(flag) => Some(*flag),
            ReportValue::Percentage(_) => None,
        }
    }

    pub fn as_percentage(&self) -> Option<f64> {
        match self {
            ReportValue::Percentage(value) => Some(*value),
            ReportValue::Flag(_) => None,
        }
    }
}

pub type Report = BTreeMap<String, ReportValue>;

/// Run the selected tests and collect their results by key.
#[instrument(skip(balancer), fields(inputs = balancer.input_count(), outputs = balancer.output_count()))]
pub fn test(balancer: &mut Balancer, options: &TestOptions) -> Result<Report, BalancerError> {
    let tester = Tester {
        max_cycles: options.max_cycles,
        ..Tester::default()
    };
    let mut report = Report::new();
    let mut put = |key: &str, value: ReportValue| {
        report.insert(key.to_string(), value);
    };

    balancer.clear();
    if options.balance {
        put(
            "output_balanced",
            ReportValue::Flag(tester.test_output_balance(balancer, false)?),
        );
        put(
            "input_balanced",
            ReportValue::Flag(tester.test_input_balance(balancer, false)?),
        );
        if options.trickle {
            put(
                "output_balanced_trickle",
                ReportValue::Flag(tester.test_output_balance(balancer, true)?),
            );
            put(
                "input_balanced_trickle",
                ReportValue::Flag(tester.test_input_balance(balancer, true)?),
            );
        }
    }

    if options.throughput {
        let inputs: Vec<usize> = (0..balancer.input_count()).collect();
        let outputs: Vec<usize> = (0..balancer.output_count()).collect();
        let result = tester.test_throughput(balancer, &inputs, &outputs)?;
        put("full_throughput", ReportValue::Flag(result.full));
        if !result.full {
            put(
                "full_throughput_bottleneck",
                ReportValue::Percentage(result.worst_percentage()),
            );
        }
    }

    if options.sweep || options.extensive_sweep {
        let result = tester.test_throughput_unlimited(balancer, options.extensive_sweep)?;
        let key = if options.extensive_sweep {
            "throughput_unlimited"
        } else {
            "throughput_unlimited_candidate"
        };
        put(key, ReportValue::Flag(result.full));
        if !result.full {
            put(
                "largest_bottleneck",
                ReportValue::Percentage(result.worst_percentage()),
            );
        }
    }

    info!(entries = report.len(), "tests finished");
    Ok(report)
}

impl Balancer {
    /// Run [`test`] on this balancer.
    pub fn test(&mut self, options: &TestOptions) -> Result<Report, BalancerError> {
        test(self, options)
    }
}
