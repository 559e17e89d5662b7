//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Label prefix used by the shared batch plan.
pub const LABEL_PREFIX: &str = "dragen";

/// Job number assigned by `ScriptedJobService`.
pub const JOB_NUMBER: &str = "4711";

/// Instance name of the scripted controller host.
pub const CONTROLLER: &str = "controller";
