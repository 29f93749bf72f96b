//! runmux - Parallel run orchestration with workspace isolation
//!
//! This crate executes batches of runs concurrently, giving each run an
//! isolated git worktree and OS-level locks so that parallel runs can
//! never trample each other's files or execute the same run twice.
//!
//! Three layers cooperate:
//!
//! - **Locking** ([`ExecutorLock`], [`WorkspaceLease`]): try-once,
//!   non-blocking file locks keyed by run id and by workspace path.
//!   Locks carry the holder's pid and host for diagnostics and never
//!   expire on their own; a crashed holder is cleared explicitly with
//!   [`ops::force_unlock`].
//! - **Workspaces** ([`WorkspaceManager`]): one linked git worktree per
//!   run under `{runs_root}/workspaces/`, recreated pristine on reuse.
//! - **Supervision** ([`RunSupervisor`]): bounded-concurrency batch
//!   execution behind a fail-closed parallelism policy, with per-run
//!   failure isolation and exactly one [`RunResult`] per run id.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use camino::Utf8Path;
//! use runmux::{CallbackOutput, RunCallback, RunSupervisor, StaticPolicy, SupervisorConfig};
//!
//! struct BuildCallback;
//!
//! #[async_trait]
//! impl RunCallback for BuildCallback {
//!     async fn execute(
//!         &self,
//!         _run_id: &str,
//!         _workspace_path: &Utf8Path,
//!     ) -> anyhow::Result<CallbackOutput> {
//!         // Do the run's real work inside the workspace here.
//!         Ok(CallbackOutput::default())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let supervisor = RunSupervisor::new(SupervisorConfig::new(".runmux", "."));
//!
//!     let run_ids: Vec<String> = vec!["run-1".into(), "run-2".into(), "run-3".into()];
//!     let results = supervisor
//!         .execute_parallel(
//!             &run_ids,
//!             Arc::new(BuildCallback),
//!             2,
//!             &StaticPolicy::allow_up_to(2),
//!         )
//!         .await?;
//!
//!     for (run_id, result) in &results {
//!         println!("{run_id}: success={}", result.success);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Policy
//!
//! Concurrency above 1 must be authorized. [`StaticPolicy`] configures
//! this in code; [`PolicyDocument`] loads it from `policy.toml` (see
//! [`resolve_policy_path`] for the search order). A denied batch fails
//! before any run starts — there is no silent fallback to serial.
//!
//! # Crash recovery
//!
//! Locks are files; a machine crash can leave them behind, and they
//! stay held until an operator clears them. [`ops`] has the recovery
//! surface: [`ops::force_unlock`] breaks a dead run's lock,
//! [`ops::list_workspaces`] and [`ops::purge_workspaces`] reclaim
//! leftover worktrees.

// ============================================================================
// Supervision
// ============================================================================

/// Batch executor: drives runs through the create / lease / lock /
/// callback pipeline with bounded concurrency.
pub use runmux_supervisor::RunSupervisor;

/// Settings shared by every run a supervisor executes: runs root,
/// source repository, checkout target, teardown behavior.
pub use runmux_supervisor::SupervisorConfig;

/// Batch-level supervisor error. Per-run failures are reported in
/// [`RunResult`], not here.
pub use runmux_supervisor::SupervisorError;

/// The work a run performs inside its workspace, supplied by the
/// caller.
pub use runmux_supervisor::RunCallback;

/// Outcome of one run: success flag, exit code, workspace path,
/// captured output, and the pipeline error if it failed early.
pub use runmux_supervisor::RunResult;

/// Output a callback reports back to the supervisor.
pub use runmux_supervisor::CallbackOutput;

// ============================================================================
// Workspaces
// ============================================================================

/// Creates, lists, and removes per-run git worktrees.
pub use runmux_workspace::WorkspaceManager;

/// Metadata for one run workspace.
pub use runmux_workspace::Workspace;

/// What a workspace checks out: a branch, or detached HEAD for
/// conflict-free parallel checkouts of the same commit.
pub use runmux_workspace::CheckoutTarget;

pub use runmux_workspace::WorkspaceError;

// ============================================================================
// Locking
// ============================================================================

/// Per-run mutual exclusion: at most one executor per run id under a
/// runs root.
pub use runmux_lock::ExecutorLock;

/// Per-directory mutual exclusion: at most one run per physical
/// workspace path.
pub use runmux_lock::WorkspaceLease;

/// The underlying try-once file lock both wrappers are built on.
pub use runmux_lock::ExclusiveFileLock;

/// Outcome of a lock attempt: acquired, or contended with the holder's
/// identity when it could be read.
pub use runmux_lock::LockAttempt;

/// Who holds a lock: pid, hostname, and working directory.
pub use runmux_lock::HolderInfo;

pub use runmux_lock::LockError;

// ============================================================================
// Policy
// ============================================================================

/// The authorization seam: decides whether a requested concurrency
/// level is allowed.
pub use runmux_policy::ParallelismPolicy;

/// Fixed in-process policy for tests and embedders.
pub use runmux_policy::StaticPolicy;

/// Policy loaded from `policy.toml`.
pub use runmux_policy::PolicyDocument;

/// The gate itself: validates a concurrency request against a policy.
pub use runmux_policy::authorize;

pub use runmux_policy::{PolicyError, load_policy_from_path, resolve_policy_path};

// ============================================================================
// Paths, run ids, logging
// ============================================================================

/// Resolve the runs root: `RUNMUX_ROOT` if set, else `.runmux`.
pub use runmux_utils::default_runs_root;

/// Map an arbitrary run id onto a filesystem-safe directory name.
pub use runmux_utils::sanitize_run_id;

pub use runmux_utils::RunIdError;

/// Install a compact tracing subscriber honoring `RUST_LOG`.
/// Embedders with their own subscriber skip this.
pub use runmux_utils::init_tracing;

// ============================================================================
// Crate-root modules
// ============================================================================

pub mod error;
pub mod ops;

pub use error::RunmuxError;

// Component crates, for anything the curated re-exports above omit.
#[doc(hidden)]
pub use runmux_lock as lock;
#[doc(hidden)]
pub use runmux_policy as policy;
#[doc(hidden)]
pub use runmux_supervisor as supervisor;
#[doc(hidden)]
pub use runmux_utils as utils;
#[doc(hidden)]
pub use runmux_workspace as workspace;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub use runmux_utils::{RunsRootGuard, with_isolated_runs_root};
