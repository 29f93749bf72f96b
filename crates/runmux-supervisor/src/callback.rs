//! The callback seam between the supervisor and whatever a run
//! actually does.

use async_trait::async_trait;
use camino::Utf8Path;

use crate::result::CallbackOutput;

/// Work executed inside a run's workspace.
///
/// The supervisor invokes this once per run, after the workspace
/// exists and both the workspace lease and executor lock are held.
/// Implementations must confine their filesystem writes to
/// `workspace_path`; everything else the supervisor guarantees about
/// isolation assumes that.
///
/// Errors and panics are both contained per run: an `Err` becomes a
/// failed [`RunResult`](crate::RunResult) for that run id, a panic is
/// caught at the task boundary, and sibling runs proceed either way.
#[async_trait]
pub trait RunCallback: Send + Sync {
    /// Execute the run's work in `workspace_path`.
    ///
    /// `run_id` is the id as submitted, not the sanitized directory
    /// name; callbacks that need the directory name can take it from
    /// `workspace_path`.
    async fn execute(
        &self,
        run_id: &str,
        workspace_path: &Utf8Path,
    ) -> anyhow::Result<CallbackOutput>;
}
