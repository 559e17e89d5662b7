//! BDD scenarios for the monitor driving both watchable units.

use rstest_bdd_macros::scenario;

use super::test_helpers::{MonitorContext, monitor_context};

#[scenario(
    path = "tests/features/monitor.feature",
    name = "A job that starts and completes"
)]
fn scenario_job_completes(monitor_context: MonitorContext) {
    let _ = monitor_context;
}

#[scenario(
    path = "tests/features/monitor.feature",
    name = "Output is relayed without repeats"
)]
fn scenario_output_relayed(monitor_context: MonitorContext) {
    let _ = monitor_context;
}

#[scenario(
    path = "tests/features/monitor.feature",
    name = "Cancellation stops polling and cleans up"
)]
fn scenario_cancellation(monitor_context: MonitorContext) {
    let _ = monitor_context;
}

#[scenario(
    path = "tests/features/monitor.feature",
    name = "Provisioning failure skips polling"
)]
fn scenario_init_failure(monitor_context: MonitorContext) {
    let _ = monitor_context;
}

#[scenario(
    path = "tests/features/monitor.feature",
    name = "A job that disappears fails the run"
)]
fn scenario_job_disappears(monitor_context: MonitorContext) {
    let _ = monitor_context;
}

#[scenario(
    path = "tests/features/monitor.feature",
    name = "The meter stops when the controller disappears"
)]
fn scenario_meter_controller_gone(monitor_context: MonitorContext) {
    let _ = monitor_context;
}

#[scenario(
    path = "tests/features/monitor.feature",
    name = "The meter refuses a host without its license"
)]
fn scenario_meter_unlicensed(monitor_context: MonitorContext) {
    let _ = monitor_context;
}
