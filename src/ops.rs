//! Operator maintenance actions.
//!
//! Inspect and reclaim state under a runs root without going through a
//! supervisor: list leftover workspaces, break a lock whose holder
//! crashed, purge everything. These are deliberate recovery actions,
//! so each one logs what it did.

use camino::Utf8Path;
use tracing::info;

use crate::error::RunmuxError;
use runmux_lock::ExecutorLock;
use runmux_utils::sanitize_run_id;
use runmux_workspace::{Workspace, WorkspaceManager};

/// List the workspaces currently present under `runs_root`.
///
/// # Errors
///
/// Fails only on I/O errors reading the workspaces directory; a runs
/// root with no workspaces yields an empty list.
pub async fn list_workspaces(
    runs_root: &Utf8Path,
    source_repo: &Utf8Path,
) -> Result<Vec<Workspace>, RunmuxError> {
    let manager = WorkspaceManager::new(runs_root.to_owned(), source_repo.to_owned());
    Ok(manager.list().await?)
}

/// Forcibly remove the executor lock for `run_id`.
///
/// Executor locks never expire on their own, so this is the recovery
/// path when a holder crashed without releasing. The previous holder's
/// identity is logged before removal. Returns whether a lock file was
/// actually removed.
///
/// # Errors
///
/// Fails if the run id has no usable characters or the lock file
/// cannot be removed.
pub fn force_unlock(runs_root: &Utf8Path, run_id: &str) -> Result<bool, RunmuxError> {
    let sanitized = sanitize_run_id(run_id)?;
    Ok(ExecutorLock::force_unlock(
        runs_root.as_std_path(),
        &sanitized,
    )?)
}

/// Force-remove every workspace under `runs_root`.
///
/// Returns how many were removed. Individual removal failures are
/// logged and skipped, matching [`WorkspaceManager::cleanup_all`].
pub async fn purge_workspaces(
    runs_root: &Utf8Path,
    source_repo: &Utf8Path,
) -> Result<usize, RunmuxError> {
    let manager = WorkspaceManager::new(runs_root.to_owned(), source_repo.to_owned());
    let removed = manager.cleanup_all().await?;
    info!(target: "runmux::ops", removed, "Purged workspaces");
    Ok(removed)
}
