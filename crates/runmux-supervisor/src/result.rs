//! Run outcome types.

use camino::Utf8PathBuf;

/// Output captured from one callback invocation.
///
/// The callback decides what counts as stdout/stderr; for callbacks
/// that shell out this is the child's captured output, for in-process
/// callbacks it is whatever they choose to report.
#[derive(Debug, Clone)]
pub struct CallbackOutput {
    /// Process-style exit code. Zero means success.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Default for CallbackOutput {
    fn default() -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

impl CallbackOutput {
    /// Whether the callback reported success (exit code 0).
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Final outcome of one run's pipeline.
///
/// Every run submitted to the supervisor produces exactly one of
/// these, whether the run succeeded, failed in its callback, lost a
/// lock race, or panicked.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The run id as the caller submitted it.
    pub run_id: String,
    /// True only if the pipeline completed and the callback reported
    /// exit code 0.
    pub success: bool,
    /// Callback exit code; `None` when the pipeline failed before the
    /// callback ran (or the callback itself errored).
    pub exit_code: Option<i32>,
    /// Where the run's workspace was created, when it got that far.
    pub workspace_path: Option<Utf8PathBuf>,
    pub stdout: String,
    pub stderr: String,
    /// Pipeline-level failure description. `None` for runs whose
    /// callback ran to completion, even with a non-zero exit code.
    pub error: Option<String>,
}

impl RunResult {
    /// Build a result from a completed callback.
    #[must_use]
    pub fn from_callback(run_id: String, workspace_path: Utf8PathBuf, output: CallbackOutput) -> Self {
        Self {
            run_id,
            success: output.succeeded(),
            exit_code: Some(output.exit_code),
            workspace_path: Some(workspace_path),
            stdout: output.stdout,
            stderr: output.stderr,
            error: None,
        }
    }

    /// Build a result for a run that failed before or outside its
    /// callback: invalid id, workspace creation failure, lock
    /// contention, callback error, panic.
    #[must_use]
    pub fn failed(
        run_id: String,
        workspace_path: Option<Utf8PathBuf>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            success: false,
            exit_code: None,
            workspace_path,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error.into()),
        }
    }
}
