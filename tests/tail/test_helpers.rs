//! Shared fixtures for tail deduplication scenarios.

use batchwatch::jobs::TailWindow;
use rstest::fixture;

#[derive(Clone, Debug, Default)]
pub struct TailContext {
    pub window: TailWindow,
    pub log: Vec<String>,
    pub emitted: Vec<String>,
    pub last: Vec<String>,
}

impl TailContext {
    /// Feeds one fetch through the window, recording what it emits.
    pub fn fetch(&mut self, text: &str) {
        let fresh: Vec<String> = self
            .window
            .advance(text)
            .into_iter()
            .map(str::to_owned)
            .collect();
        self.emitted.extend(fresh.iter().cloned());
        self.last = fresh;
    }
}

#[fixture]
pub fn tail_context() -> TailContext {
    TailContext::default()
}

/// Splits a comma-separated list of lines, dropping blanks.
pub fn lines(text: &str) -> Vec<&str> {
    text.split(',')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

pub fn log_line(n: usize) -> String {
    format!("[{n:05}] aligned {} reads", n * 17)
}

/// Renders the last `visible` lines of `log` the way the tail endpoint does.
pub fn server_tail(log: &[String], visible: usize) -> String {
    let skip = log.len().saturating_sub(visible);
    log.iter().skip(skip).map(|line| format!("{line}\n")).collect()
}
