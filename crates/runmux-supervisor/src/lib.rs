//! Parallel run supervision
//!
//! The supervisor drives batches of runs through a fixed pipeline:
//! create the workspace, take the workspace lease, take the executor
//! lock, invoke the callback, release locks in reverse order, then
//! optionally tear the workspace down. A counting semaphore bounds how
//! many runs are inside the pipeline at once.
//!
//! Failure isolation is per run. A run that loses a lock race, fails
//! workspace creation, returns an error from its callback, or panics
//! produces a failed [`RunResult`] for its own id and nothing else;
//! sibling runs are unaffected. The only batch-level failure is the
//! parallelism policy gate, which is checked before any run starts.

mod callback;
mod result;

pub use callback::RunCallback;
pub use result::{CallbackOutput, RunResult};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};

use runmux_lock::{ExecutorLock, WorkspaceLease};
use runmux_policy::{ParallelismPolicy, PolicyError, authorize};
use runmux_utils::logging::{log_run_complete, log_run_error, log_run_start, run_span};
use runmux_utils::sanitize_run_id;
use runmux_workspace::{CheckoutTarget, WorkspaceManager};

/// Batch-level supervisor errors.
///
/// Per-run failures never surface here; they are reported through the
/// [`RunResult`] of the run that failed.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Settings shared by every run a supervisor executes.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory that holds workspaces, locks, and leases.
    pub runs_root: Utf8PathBuf,
    /// Repository that run workspaces are linked from.
    pub source_repo: Utf8PathBuf,
    /// What each run's workspace checks out.
    pub checkout: CheckoutTarget,
    /// Remove each run's workspace after its callback finishes.
    ///
    /// Off by default: completed workspaces are usually kept for
    /// inspection and reclaimed later via
    /// [`WorkspaceManager::cleanup_all`].
    pub teardown_on_completion: bool,
}

impl SupervisorConfig {
    /// Defaults: detached-HEAD checkouts, workspaces kept after runs.
    pub fn new(runs_root: impl Into<Utf8PathBuf>, source_repo: impl Into<Utf8PathBuf>) -> Self {
        Self {
            runs_root: runs_root.into(),
            source_repo: source_repo.into(),
            checkout: CheckoutTarget::DetachedHead,
            teardown_on_completion: false,
        }
    }

    #[must_use]
    pub fn with_checkout(mut self, checkout: CheckoutTarget) -> Self {
        self.checkout = checkout;
        self
    }

    #[must_use]
    pub fn with_teardown_on_completion(mut self, teardown: bool) -> Self {
        self.teardown_on_completion = teardown;
        self
    }
}

/// Executes batches of runs with bounded concurrency.
pub struct RunSupervisor {
    config: Arc<SupervisorConfig>,
    manager: Arc<WorkspaceManager>,
}

impl RunSupervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        let manager = Arc::new(WorkspaceManager::new(
            config.runs_root.clone(),
            config.source_repo.clone(),
        ));
        Self {
            config: Arc::new(config),
            manager,
        }
    }

    /// The workspace manager this supervisor creates workspaces with.
    #[must_use]
    pub fn manager(&self) -> &WorkspaceManager {
        &self.manager
    }

    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Execute `run_ids` in parallel, at most `max_concurrency` at a
    /// time, and return one [`RunResult`] per distinct run id.
    ///
    /// The policy gate is consulted before anything else happens; a
    /// denial aborts the whole batch with no workspaces created and no
    /// callbacks invoked. Past the gate, failures are per run: the
    /// returned map always contains every distinct submitted id, each
    /// mapped to whatever outcome its pipeline reached.
    ///
    /// Duplicate ids are collapsed to their first occurrence — two
    /// entries for the same id would race for the same executor lock
    /// and the loser would fail spuriously.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Policy`] when `max_concurrency` is zero or
    /// exceeds what `policy` authorizes.
    pub async fn execute_parallel(
        &self,
        run_ids: &[String],
        callback: Arc<dyn RunCallback>,
        max_concurrency: usize,
        policy: &dyn ParallelismPolicy,
    ) -> Result<BTreeMap<String, RunResult>, SupervisorError> {
        authorize(policy, max_concurrency)?;

        let mut seen = HashSet::new();
        let unique: Vec<String> = run_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        if unique.len() < run_ids.len() {
            warn!(
                target: "runmux::supervisor",
                submitted = run_ids.len(),
                distinct = unique.len(),
                "Duplicate run ids collapsed; each run executes once"
            );
        }

        info!(
            target: "runmux::supervisor",
            runs = unique.len(),
            max_concurrency,
            "Starting run batch"
        );
        let batch_started = Instant::now();

        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut handles: Vec<(String, JoinHandle<RunResult>)> = Vec::with_capacity(unique.len());

        for run_id in unique {
            let semaphore = Arc::clone(&semaphore);
            let manager = Arc::clone(&self.manager);
            let config = Arc::clone(&self.config);
            let callback = Arc::clone(&callback);
            let id = run_id.clone();

            let handle = tokio::spawn(async move {
                // The permit is taken inside the task so every run is
                // spawned immediately and queues on the semaphore, not
                // on the spawn loop.
                let Ok(permit) = semaphore.acquire_owned().await else {
                    // The semaphore lives as long as the tasks and is
                    // never closed.
                    return RunResult::failed(id, None, "concurrency semaphore closed");
                };
                let _permit = permit;
                run_pipeline(manager, config, callback, id).await
            });
            handles.push((run_id, handle));
        }

        let mut results = BTreeMap::new();
        for (run_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => self.contain_task_failure(&run_id, &join_err).await,
            };
            results.insert(run_id, result);
        }

        let succeeded = results.values().filter(|r| r.success).count();
        info!(
            target: "runmux::supervisor",
            runs = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            duration_ms = batch_started.elapsed().as_millis() as u64,
            "Run batch finished"
        );

        Ok(results)
    }

    /// Execute one run through the same pipeline, without the policy
    /// gate or semaphore. Serial execution needs no authorization.
    pub async fn execute_single(&self, run_id: &str, callback: Arc<dyn RunCallback>) -> RunResult {
        run_pipeline(
            Arc::clone(&self.manager),
            Arc::clone(&self.config),
            callback,
            run_id.to_string(),
        )
        .await
    }

    /// Turn a panicked or cancelled run task into a failed result.
    ///
    /// Locks release through their `Drop` impls during unwind, so the
    /// only state a panicked run can leave behind is its workspace.
    async fn contain_task_failure(
        &self,
        run_id: &str,
        join_err: &tokio::task::JoinError,
    ) -> RunResult {
        let reason = if join_err.is_panic() {
            "run pipeline panicked"
        } else {
            "run task cancelled"
        };
        error!(
            target: "runmux::supervisor",
            run_id = %run_id,
            error = %join_err,
            "Run task did not complete"
        );

        if self.config.teardown_on_completion
            && let Ok(path) = self.manager.workspace_path(run_id)
            && path.exists()
            && let Err(e) = self.manager.remove(&path, true).await
        {
            warn!(
                target: "runmux::supervisor",
                path = %path,
                error = %e,
                "Failed to remove workspace left by a panicked run"
            );
        }

        let workspace_path = self
            .manager
            .workspace_path(run_id)
            .ok()
            .filter(|path| path.exists());
        RunResult::failed(run_id.to_string(), workspace_path, reason)
    }
}

/// Run one pipeline inside its tracing span.
async fn run_pipeline(
    manager: Arc<WorkspaceManager>,
    config: Arc<SupervisorConfig>,
    callback: Arc<dyn RunCallback>,
    run_id: String,
) -> RunResult {
    let span = run_span(&run_id);
    execute_run(manager, config, callback, run_id)
        .instrument(span)
        .await
}

/// The per-run pipeline: workspace, lease, executor lock, callback,
/// reverse-order release, optional teardown.
async fn execute_run(
    manager: Arc<WorkspaceManager>,
    config: Arc<SupervisorConfig>,
    callback: Arc<dyn RunCallback>,
    run_id: String,
) -> RunResult {
    let started = Instant::now();
    log_run_start(&run_id);

    let fail = |error: String, workspace_path: Option<Utf8PathBuf>| {
        log_run_error(&run_id, &error, started.elapsed().as_millis());
        RunResult::failed(run_id.clone(), workspace_path, error)
    };

    let sanitized = match sanitize_run_id(&run_id) {
        Ok(sanitized) => sanitized,
        Err(e) => return fail(format!("invalid run id: {e}"), None),
    };

    let workspace = match manager.create(&sanitized, &config.checkout).await {
        Ok(workspace) => workspace,
        Err(e) => return fail(format!("workspace creation failed: {e}"), None),
    };

    // Lease before executor lock; release happens in reverse. On lease
    // contention the workspace stays on disk — whoever holds the lease
    // is presumably using it.
    let mut lease = WorkspaceLease::new(config.runs_root.as_std_path(), workspace.path.as_std_path());
    match lease.acquire() {
        Ok(true) => {}
        Ok(false) => {
            return fail(
                "workspace lease is held by another process".to_string(),
                Some(workspace.path.clone()),
            );
        }
        Err(e) => {
            return fail(
                format!("workspace lease failed: {e}"),
                Some(workspace.path.clone()),
            );
        }
    }

    let mut exec_lock = ExecutorLock::new(config.runs_root.as_std_path(), &sanitized);
    match exec_lock.acquire() {
        Ok(true) => {}
        Ok(false) => {
            lease.release();
            return fail(
                "executor lock is held by another process".to_string(),
                Some(workspace.path.clone()),
            );
        }
        Err(e) => {
            lease.release();
            return fail(
                format!("executor lock failed: {e}"),
                Some(workspace.path.clone()),
            );
        }
    }

    // A panic in the callback unwinds through this frame; both guards
    // release in their Drop impls and the join handle reports it.
    let callback_result = callback.execute(&run_id, &workspace.path).await;

    exec_lock.release();
    lease.release();

    let result = match callback_result {
        Ok(output) => RunResult::from_callback(run_id.clone(), workspace.path.clone(), output),
        Err(e) => {
            // `{e:#}` keeps the anyhow context chain on one line.
            let error = format!("callback failed: {e:#}");
            log_run_error(&run_id, &error, started.elapsed().as_millis());
            RunResult::failed(run_id.clone(), Some(workspace.path.clone()), error)
        }
    };

    if config.teardown_on_completion
        && let Err(e) = manager.remove(&workspace.path, true).await
    {
        // Teardown is best-effort and never changes the run outcome.
        warn!(
            target: "runmux::supervisor",
            path = %workspace.path,
            error = %e,
            "Workspace teardown failed; leaving directory behind"
        );
    }

    if result.error.is_none() {
        log_run_complete(&run_id, result.success, started.elapsed().as_millis());
    }
    result
}
