//! BDD step definitions for the tail scenarios.

use batchwatch::jobs::TAIL_LENGTH;
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{TailContext, lines, log_line, server_tail};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("an empty tail window")]
fn empty_window(tail_context: TailContext) -> TailContext {
    tail_context
}

#[when("the log tail reads \"{tail}\"")]
fn tail_reads(mut tail_context: TailContext, tail: String) -> TailContext {
    let text: String = lines(&tail)
        .into_iter()
        .map(|line| format!("{line}\n"))
        .collect();
    tail_context.fetch(&text);
    tail_context
}

#[when(
    "a log grows by {step} lines per fetch for {rounds} fetches \
     while the server shows {visible} lines"
)]
fn log_grows(
    mut tail_context: TailContext,
    step: usize,
    rounds: usize,
    visible: usize,
) -> TailContext {
    for round in 0..rounds {
        let start = round * step;
        tail_context.log.extend((start..start + step).map(log_line));
        let text = server_tail(&tail_context.log, visible);
        tail_context.fetch(&text);
    }
    tail_context
}

#[when("a log of {count} lines is fetched whole")]
fn fetched_whole(mut tail_context: TailContext, count: usize) -> TailContext {
    tail_context.log = (0..count).map(log_line).collect();
    let text = server_tail(&tail_context.log, count);
    tail_context.fetch(&text);
    tail_context
}

#[then("the last fetch emits \"{tail}\"")]
fn last_emits(tail_context: &TailContext, tail: String) -> Result<(), StepError> {
    let expected = lines(&tail);
    if tail_context.last == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {:?}",
            tail_context.last
        )))
    }
}

#[then("the last fetch emits nothing")]
fn last_emits_nothing(tail_context: &TailContext) {
    assert!(
        tail_context.last.is_empty(),
        "unexpected lines: {:?}",
        tail_context.last
    );
}

#[then("the emitted output equals the whole log")]
fn emitted_equals_log(tail_context: &TailContext) -> Result<(), StepError> {
    if tail_context.emitted == tail_context.log {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "emitted {} lines for a log of {}",
            tail_context.emitted.len(),
            tail_context.log.len()
        )))
    }
}

#[then("the window remembers the last {count} lines of the log")]
fn remembers_last(tail_context: &TailContext, count: usize) {
    assert_eq!(count, TAIL_LENGTH);
    let skip = tail_context.log.len().saturating_sub(count);
    let expected: Vec<&str> = tail_context.log.iter().skip(skip).map(String::as_str).collect();
    let remembered: Vec<&str> = tail_context.window.remembered().collect();
    assert_eq!(remembered, expected);
}
