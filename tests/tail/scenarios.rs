//! BDD scenarios for tail deduplication across fetches.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TailContext, tail_context};

#[scenario(
    path = "tests/features/tail.feature",
    name = "An appended fetch emits only the new lines"
)]
fn scenario_appended_fetch(tail_context: TailContext) {
    let _ = tail_context;
}

#[scenario(path = "tests/features/tail.feature", name = "The first fetch emits every line")]
fn scenario_first_fetch(tail_context: TailContext) {
    let _ = tail_context;
}

#[scenario(
    path = "tests/features/tail.feature",
    name = "A log growing in small steps is emitted once"
)]
fn scenario_small_steps(tail_context: TailContext) {
    let _ = tail_context;
}

#[scenario(
    path = "tests/features/tail.feature",
    name = "A log growing by the compare window is emitted once"
)]
fn scenario_window_sized_steps(tail_context: TailContext) {
    let _ = tail_context;
}

#[scenario(
    path = "tests/features/tail.feature",
    name = "A log growing faster than the compare window is emitted once"
)]
fn scenario_large_steps(tail_context: TailContext) {
    let _ = tail_context;
}

#[scenario(path = "tests/features/tail.feature", name = "Quiet polls emit nothing")]
fn scenario_quiet_polls(tail_context: TailContext) {
    let _ = tail_context;
}

#[scenario(path = "tests/features/tail.feature", name = "Memory stays bounded")]
fn scenario_memory_bounded(tail_context: TailContext) {
    let _ = tail_context;
}

#[scenario(path = "tests/features/tail.feature", name = "A restarted log is replayed")]
fn scenario_restart_replayed(tail_context: TailContext) {
    let _ = tail_context;
}
