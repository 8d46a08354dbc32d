//! End-to-end balance and throughput checks on hand-built flow graphs.

use balancer_core::error::BalancerError;
use balancer_core::rational::whole;
use balancer_core::test_utils::*;
use balancer_core::tester::{Tester, nr_of_combinations};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two splitters feeding two merging splitters balance both ways and run
/// at full throughput.
#[test]
fn two_by_two_is_a_balancer() {
    init_tracing();
    let mut balancer = two_by_two(false);

    assert!(balancer.test_output_balance(false).unwrap());
    assert!(balancer.test_input_balance(false).unwrap());

    let result = balancer.test_throughput().unwrap();
    assert!(result.full);
    assert_eq!(result.worst, whole(100));
}

/// Dropping one connecting belt breaks output balance.
#[test]
fn two_by_two_with_missing_link_is_unbalanced() {
    let mut balancer = two_by_two(true);
    assert!(!balancer.test_output_balance(false).unwrap());
    assert!(!balancer.test_throughput_unlimited(true).unwrap().full);
}

/// Express and basic branches meeting at one junction keep every output
/// saturated under full supply, but a trickle shows the uneven split.
#[test]
fn mixed_speed_junction_starves_under_trickle() {
    init_tracing();
    let mut balancer = four_by_four_mixed_speeds();
    assert!(balancer.test_output_balance(false).unwrap());
    assert!(!balancer.test_output_balance(true).unwrap());
}

/// A sweep leaves the original graph untouched.
#[test]
fn sweep_runs_on_copies() {
    let balancer = two_by_two(false);
    let before = balancer.total_content();
    let results = Tester::new().throughput_sweep(&balancer, true).unwrap();

    assert_eq!(results.len(), nr_of_combinations(2, 2, 2));
    assert!(results.iter().all(|r| r.full));
    assert_eq!(balancer.total_content(), before);
}

/// A zero cycle cap stops the first run that has not settled yet.
#[test]
fn cycle_cap_reports_did_not_converge() {
    let mut balancer = four_by_four_mixed_speeds();
    let tester = Tester::new().with_max_cycles(0);
    let err = tester.test_input_balance(&mut balancer, false).unwrap_err();
    assert_eq!(err, BalancerError::DidNotConverge { cycles: 0 });
}
