//! Runtime for scenario steps that drive async code on a paused clock.

use tokio::runtime::{Builder, Runtime};

/// Builds a current-thread runtime whose clock auto-advances while idle.
pub fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("paused runtime should build: {err}"))
}
