//! Git worktree workspace management for isolated run execution
//!
//! Every run gets its own linked worktree under
//! `{runs_root}/workspaces/{run_id}/`, created from a shared source
//! repository. Worktrees share the object database with the source
//! repo, so creating one is cheap compared to a full clone while still
//! giving each run an isolated checkout to mutate.
//!
//! Creation is idempotent: a leftover directory from a crashed run is
//! removed and recreated so the run always starts from a pristine
//! checkout. Removal is best-effort layered — polite `git worktree
//! remove` first, then `--force`, then a manual directory delete —
//! and always finishes with `git worktree prune` so the source repo's
//! worktree registry does not accumulate stale entries.

mod git;

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::git::run_git;
use runmux_utils::{RunIdError, ensure_dir_all, sanitize_run_id};

/// Directory under the runs root that holds all run workspaces.
pub const WORKSPACES_DIR: &str = "workspaces";

/// What a freshly created workspace checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
    /// Check out an existing branch by name.
    Branch(String),
    /// Detach at the source repo's current HEAD commit.
    ///
    /// Detached checkouts sidestep git's one-worktree-per-branch rule,
    /// so parallel runs can all start from the same commit.
    DetachedHead,
}

impl CheckoutTarget {
    /// Map an optional branch name to a checkout target.
    #[must_use]
    pub fn from_branch(branch: Option<String>) -> Self {
        match branch {
            Some(name) => Self::Branch(name),
            None => Self::DetachedHead,
        }
    }
}

impl std::fmt::Display for CheckoutTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Branch(name) => write!(f, "branch '{name}'"),
            Self::DetachedHead => write!(f, "detached HEAD"),
        }
    }
}

/// Metadata for a single run workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Sanitized run identifier; doubles as the directory name.
    pub run_id: String,
    /// Absolute or runs-root-relative path of the worktree.
    pub path: Utf8PathBuf,
    /// The repository this worktree is linked to.
    pub source_repo: Utf8PathBuf,
    /// When the workspace directory was created.
    pub created_at: DateTime<Utc>,
    /// What the workspace has checked out.
    pub checkout: CheckoutTarget,
}

/// Errors from workspace lifecycle operations.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Failed to create workspace for run '{run_id}': {reason}")]
    CreationFailed { run_id: String, reason: String },

    #[error("Failed to remove workspace at '{path}': {reason}")]
    RemovalFailed { path: Utf8PathBuf, reason: String },

    #[error("Invalid run id: {0}")]
    InvalidRunId(#[from] RunIdError),

    #[error("Workspace I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Creates, lists, and removes run workspaces for one runs root and
/// one source repository.
///
/// The manager holds no open handles and spawns git on demand, so it
/// is cheap to construct and safe to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    runs_root: Utf8PathBuf,
    source_repo: Utf8PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at `runs_root`, linking worktrees from
    /// `source_repo`.
    pub fn new(runs_root: impl Into<Utf8PathBuf>, source_repo: impl Into<Utf8PathBuf>) -> Self {
        Self {
            runs_root: runs_root.into(),
            source_repo: source_repo.into(),
        }
    }

    /// The runs root this manager operates under.
    #[must_use]
    pub fn runs_root(&self) -> &Utf8Path {
        &self.runs_root
    }

    /// The source repository workspaces are linked from.
    #[must_use]
    pub fn source_repo(&self) -> &Utf8Path {
        &self.source_repo
    }

    /// Directory that holds all workspaces for this runs root.
    #[must_use]
    pub fn workspaces_root(&self) -> Utf8PathBuf {
        self.runs_root.join(WORKSPACES_DIR)
    }

    /// Compute the workspace path for a run without touching the
    /// filesystem. The run id is sanitized the same way [`create`]
    /// sanitizes it, so traversal sequences cannot escape the
    /// workspaces root.
    ///
    /// [`create`]: WorkspaceManager::create
    pub fn workspace_path(&self, run_id: &str) -> Result<Utf8PathBuf, RunIdError> {
        let sanitized = sanitize_run_id(run_id)?;
        Ok(self.workspaces_root().join(sanitized))
    }

    /// Create a pristine workspace for `run_id`.
    ///
    /// If a directory for this run already exists — typically left
    /// behind by a crashed or interrupted run — it is force-removed
    /// first so the new worktree starts clean. Stale state never
    /// leaks into a fresh run.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::InvalidRunId`] if the run id has no
    /// usable characters, and [`WorkspaceError::CreationFailed`] if
    /// git cannot create the worktree (missing branch, source repo is
    /// not a git repository, git not installed).
    pub async fn create(
        &self,
        run_id: &str,
        checkout: &CheckoutTarget,
    ) -> Result<Workspace, WorkspaceError> {
        let sanitized = sanitize_run_id(run_id)?;
        let path = self.workspaces_root().join(&sanitized);

        ensure_dir_all(self.workspaces_root()).map_err(|e| WorkspaceError::CreationFailed {
            run_id: sanitized.clone(),
            reason: format!("cannot create workspaces root: {e}"),
        })?;

        if path.exists() {
            warn!(
                target: "runmux::workspace",
                run_id = %sanitized,
                path = %path,
                "Workspace directory already exists; recreating"
            );
            self.remove(&path, true)
                .await
                .map_err(|e| WorkspaceError::CreationFailed {
                    run_id: sanitized.clone(),
                    reason: format!("could not remove stale workspace: {e}"),
                })?;
        }

        let mut args = vec!["worktree", "add"];
        match checkout {
            CheckoutTarget::Branch(branch) => {
                args.push(path.as_str());
                args.push(branch.as_str());
            }
            CheckoutTarget::DetachedHead => {
                args.push("--detach");
                args.push(path.as_str());
            }
        }

        let output = run_git(&self.source_repo, &args).await.map_err(|e| {
            WorkspaceError::CreationFailed {
                run_id: sanitized.clone(),
                reason: format!("failed to spawn git: {e}"),
            }
        })?;

        if !output.success() {
            return Err(WorkspaceError::CreationFailed {
                run_id: sanitized,
                reason: output.brief_stderr(),
            });
        }

        info!(
            target: "runmux::workspace",
            run_id = %sanitized,
            path = %path,
            checkout = %checkout,
            "Created workspace"
        );

        Ok(Workspace {
            run_id: sanitized,
            path,
            source_repo: self.source_repo.clone(),
            created_at: Utc::now(),
            checkout: checkout.clone(),
        })
    }

    /// Remove the workspace at `path`.
    ///
    /// Without `force`, git's safety checks apply: a worktree with
    /// uncommitted changes is refused and the error carries git's
    /// reason. With `force`, removal is escalated until the directory
    /// is gone — `git worktree remove --force`, then a plain recursive
    /// delete for directories git no longer recognizes as worktrees.
    ///
    /// `git worktree prune` runs in the source repo on every call so
    /// manual deletions do not leave stale registry entries behind.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::RemovalFailed`] if the directory
    /// still exists after every applicable removal step.
    pub async fn remove(&self, path: &Utf8Path, force: bool) -> Result<(), WorkspaceError> {
        let mut removed = false;
        let mut last_reason = String::new();

        match run_git(&self.source_repo, &["worktree", "remove", path.as_str()]).await {
            Ok(output) if output.success() => removed = true,
            Ok(output) => {
                last_reason = output.brief_stderr();
                debug!(
                    target: "runmux::workspace",
                    path = %path,
                    reason = %last_reason,
                    "git worktree remove refused"
                );
            }
            Err(e) => last_reason = format!("failed to spawn git: {e}"),
        }

        if !removed && force {
            match run_git(
                &self.source_repo,
                &["worktree", "remove", "--force", path.as_str()],
            )
            .await
            {
                Ok(output) if output.success() => removed = true,
                Ok(output) => {
                    last_reason = output.brief_stderr();
                    warn!(
                        target: "runmux::workspace",
                        path = %path,
                        reason = %last_reason,
                        "git worktree remove --force refused"
                    );
                }
                Err(e) => last_reason = format!("failed to spawn git: {e}"),
            }
        }

        // Git refuses directories it does not recognize as worktrees,
        // e.g. a half-created workspace from a crashed run. Forced
        // removal falls back to deleting the directory itself.
        if !removed && force && path.exists() {
            match tokio::fs::remove_dir_all(path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => removed = true,
                Err(e) => last_reason = format!("manual delete failed: {e}"),
            }
        }

        match run_git(&self.source_repo, &["worktree", "prune"]).await {
            Ok(output) if !output.success() => {
                debug!(
                    target: "runmux::workspace",
                    reason = %output.brief_stderr(),
                    "git worktree prune failed"
                );
            }
            Err(e) => {
                debug!(target: "runmux::workspace", error = %e, "could not spawn git worktree prune");
            }
            _ => {}
        }

        if path.exists() {
            return Err(WorkspaceError::RemovalFailed {
                path: path.to_owned(),
                reason: last_reason,
            });
        }

        if removed {
            info!(target: "runmux::workspace", path = %path, "Removed workspace");
        }
        Ok(())
    }

    /// List workspaces currently present under the workspaces root.
    ///
    /// A missing workspaces root is an empty list, not an error. The
    /// checkout target of each workspace is resolved best-effort by
    /// asking git for a symbolic HEAD; anything that fails to resolve
    /// is reported as detached.
    pub async fn list(&self) -> Result<Vec<Workspace>, WorkspaceError> {
        let root = self.workspaces_root();
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut workspaces = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let path = root.join(&name);

            let created_at = entry
                .metadata()
                .await
                .ok()
                .and_then(|meta| meta.created().or_else(|_| meta.modified()).ok())
                .map_or_else(Utc::now, DateTime::<Utc>::from);

            let checkout = resolve_checkout(&path).await;

            workspaces.push(Workspace {
                run_id: name,
                path,
                source_repo: self.source_repo.clone(),
                created_at,
                checkout,
            });
        }

        workspaces.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(workspaces)
    }

    /// Force-remove every workspace under the workspaces root.
    ///
    /// Individual failures are logged and skipped so one stubborn
    /// directory cannot block cleanup of the rest. Returns how many
    /// workspaces were removed.
    pub async fn cleanup_all(&self) -> Result<usize, WorkspaceError> {
        let workspaces = self.list().await?;
        let mut removed = 0;

        for workspace in workspaces {
            match self.remove(&workspace.path, true).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(
                        target: "runmux::workspace",
                        path = %workspace.path,
                        error = %e,
                        "Failed to remove workspace during cleanup; continuing"
                    );
                }
            }
        }

        Ok(removed)
    }
}

/// Ask git what `path` has checked out. Failures mean detached.
async fn resolve_checkout(path: &Utf8Path) -> CheckoutTarget {
    match run_git(path, &["symbolic-ref", "-q", "--short", "HEAD"]).await {
        Ok(output) if output.success() => {
            let name = output.stdout.trim();
            if name.is_empty() {
                CheckoutTarget::DetachedHead
            } else {
                CheckoutTarget::Branch(name.to_string())
            }
        }
        _ => CheckoutTarget::DetachedHead,
    }
}
