//! Thin wrapper around the `git` binary.
//!
//! Worktree manipulation goes through the real git CLI rather than a
//! library binding so that behavior matches whatever git version the
//! host has, including future worktree fixes. All invocations are
//! argv-style with stdin detached.

use std::io;
use std::process::Stdio;

use camino::Utf8Path;
use tokio::process::Command;
use tracing::trace;

/// Captured output of a single git invocation.
#[derive(Debug)]
pub(crate) struct GitOutput {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
    /// Exit code, or `None` if git was terminated by a signal.
    pub(crate) exit_code: Option<i32>,
}

impl GitOutput {
    #[must_use]
    pub(crate) fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// First stderr line, for embedding in error messages.
    ///
    /// Git prefixes its diagnostics with `fatal:` or `error:` on the
    /// first line; the rest is usually hint text we do not want in a
    /// one-line reason.
    #[must_use]
    pub(crate) fn brief_stderr(&self) -> String {
        match self.stderr.lines().find(|line| !line.trim().is_empty()) {
            Some(line) => line.trim().to_string(),
            None => match self.exit_code {
                Some(code) => format!("git exited with status {code}"),
                None => "git terminated by signal".to_string(),
            },
        }
    }
}

/// Run a git command in `current_dir` and capture its output.
///
/// A non-zero exit is not an error at this layer; callers inspect
/// [`GitOutput::success`] and decide. `Err` means git could not be
/// spawned at all (binary missing, directory gone).
pub(crate) async fn run_git(current_dir: &Utf8Path, args: &[&str]) -> io::Result<GitOutput> {
    let output = Command::new("git")
        .args(args)
        .current_dir(current_dir)
        .stdin(Stdio::null())
        .output()
        .await?;

    let git_output = GitOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    };

    trace!(
        target: "runmux::workspace",
        args = ?args,
        cwd = %current_dir,
        exit_code = ?git_output.exit_code,
        "git invocation completed"
    );

    Ok(git_output)
}
