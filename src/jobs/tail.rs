//! Incremental deduplication of a remote output tail.
//!
//! The tail endpoint returns the whole currently available tail on every call
//! and offers no cursor, so [`TailWindow`] remembers the last lines it has
//! seen and emits only what follows them in the next fetch.

/// Number of lines remembered between fetches.
pub const TAIL_LENGTH: usize = 100;

/// Trailing context, in lines, that must match before an anchor is trusted.
pub const COMPARE_WINDOW: usize = 25;

/// Rolling memory of the most recently fetched lines.
///
/// Slots are right-aligned: the newest line sits at the end, and slots never
/// filled by a fetch stay `None`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TailWindow {
    lines: Vec<Option<String>>,
}

impl Default for TailWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl TailWindow {
    /// Creates a window with no history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: vec![None; TAIL_LENGTH],
        }
    }

    /// Returns `true` until the first non-empty fetch has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(Option::is_none)
    }

    /// Iterates the remembered lines, oldest first.
    pub fn remembered(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().flatten().map(String::as_str)
    }

    /// Consumes a freshly fetched tail and returns the lines not yet emitted.
    ///
    /// An empty fetch emits nothing and leaves the memory untouched. Without
    /// history, or when no verified overlap is found, the whole fetch is
    /// returned.
    pub fn advance<'t>(&mut self, text: &'t str) -> Vec<&'t str> {
        let fetched: Vec<&'t str> = text.lines().collect();
        if fetched.is_empty() {
            return Vec::new();
        }

        let start = if self.is_empty() {
            0
        } else {
            self.resume_point(&fetched).unwrap_or(0)
        };
        let emitted = fetched
            .get(start..)
            .map(<[&str]>::to_vec)
            .unwrap_or_default();
        self.remember(&fetched);
        emitted
    }

    /// Remembered lines from the anchor to the newest line.
    ///
    /// The anchor is found by stepping back [`COMPARE_WINDOW`] slots from the
    /// newest non-empty line, then forward to the first non-empty line.
    fn anchor_window(&self) -> Option<Vec<&str>> {
        let newest = self
            .lines
            .iter()
            .rposition(|slot| slot.as_deref().is_some_and(|line| !line.is_empty()))?;
        let oldest = self.lines.iter().position(Option::is_some)?;
        let from = newest.saturating_sub(COMPARE_WINDOW).max(oldest);

        Some(
            self.lines
                .iter()
                .skip(from)
                .flatten()
                .map(String::as_str)
                .skip_while(|line| line.is_empty())
                .collect(),
        )
    }

    /// Index of the first fetched line after a verified overlap.
    fn resume_point(&self, fetched: &[&str]) -> Option<usize> {
        let window = self.anchor_window()?;
        fetched
            .windows(window.len())
            .position(|candidate| candidate == window.as_slice())
            .map(|offset| offset + window.len())
    }

    fn remember(&mut self, fetched: &[&str]) {
        let kept = fetched.len().min(TAIL_LENGTH);
        let skipped = fetched.len() - kept;
        self.lines = std::iter::repeat_n(None, TAIL_LENGTH - kept)
            .chain(
                fetched
                    .iter()
                    .skip(skipped)
                    .map(|line| Some((*line).to_owned())),
            )
            .collect();
    }
}
