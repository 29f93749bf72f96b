//! Foundation utilities for runmux
//!
//! Shared ground for the other crates: runs-root resolution, run id
//! sanitization, and tracing setup. Nothing here holds state; components
//! take the runs root as an explicit argument and use these helpers only at
//! the edges.

pub mod logging;
pub mod paths;
pub mod run_id;

pub use logging::init_tracing;
pub use paths::{DEFAULT_RUNS_ROOT, RUNS_ROOT_ENV, default_runs_root, ensure_dir_all};
pub use run_id::{RunIdError, sanitize_run_id};

// Re-exported so downstream crates can match lock errors without a direct
// runmux-lock dependency.
pub use runmux_lock::LockError;

#[cfg(any(test, feature = "test-utils"))]
pub use paths::{RunsRootGuard, with_isolated_runs_root};
