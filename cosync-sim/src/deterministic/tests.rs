//! Tests for deterministic scenario framework.

use crate::deterministic::{HostTicks, Scenario, SimulationError, run_scenario};

#[test]
fn test_scenario_reproducibility() {
    let scenario = Scenario::builder("reproducible")
        .seed(12345)
        .host_ticks(HostTicks::Random { max_gap: 1200 })
        .build()
        .unwrap();

    // Run scenario twice with same seed
    let report1 = run_scenario(&scenario).unwrap();
    let report2 = run_scenario(&scenario).unwrap();

    // Results should be identical
    assert_eq!(report1.trace.step_times(), report2.trace.step_times());
    assert_eq!(report1.trace.steps, report2.trace.steps);
    assert_eq!(report1.seed, report2.seed);
}

#[test]
fn test_intermediate_host_tick_is_visited() {
    let scenario = Scenario::builder("intermediate")
        .host_ticks(HostTicks::Fixed(vec![0, 900, 1350, 1800, 2700]))
        .end_tick(2700)
        .build()
        .unwrap();

    let report = run_scenario(&scenario).unwrap();

    assert!(report.success(), "{}", report.summary());
    assert_eq!(report.trace.step_times(), vec![0, 900, 1350, 1800, 2700]);

    let step = report.step(900).unwrap();
    assert_eq!(step.next_tick, Some(1350));
    assert_eq!(step.output.next_tick, Some(1350));
    assert!(step.host_result);

    // Declared tick on the regular boundary is not an intermediate hint
    assert_eq!(report.step(1350).unwrap().output.next_tick, None);
}

#[test]
fn test_sparse_host_lets_external_run_ahead() {
    let scenario = Scenario::builder("sparse")
        .host_ticks(HostTicks::Fixed(vec![0, 2000]))
        .end_tick(3600)
        .build()
        .unwrap();

    let report = run_scenario(&scenario).unwrap();

    assert!(report.success(), "{}", report.summary());
    assert_eq!(
        report.trace.step_times(),
        vec![0, 900, 1800, 2000, 2700, 3600]
    );
    assert!(!report.step(900).unwrap().host_result);
    assert!(report.step(2000).unwrap().host_result);
    assert_eq!(report.trace.host_ticks.len(), 2);
}

#[test]
fn test_random_hosts_satisfy_invariants() {
    for seed in 0..8 {
        let scenario = Scenario::builder(format!("random-{seed}"))
            .seed(seed)
            .host_ticks(HostTicks::Random { max_gap: 1200 })
            .end_tick(4500)
            .build()
            .unwrap();

        let report = run_scenario(&scenario).unwrap();
        assert!(report.success(), "{}", report.summary());
    }
}

#[test]
fn test_zero_step_size_rejected() {
    let result = Scenario::builder("broken").step_size(0).build();
    assert!(matches!(result, Err(SimulationError::InvalidScenario { .. })));
}

#[test]
fn test_schedule_truncated_to_end_tick() {
    let scenario = Scenario::builder("truncated")
        .host_ticks(HostTicks::Fixed(vec![0, 900, 5000]))
        .end_tick(1800)
        .build()
        .unwrap();

    assert_eq!(scenario.host_schedule.ticks(), &[0, 900]);
}
