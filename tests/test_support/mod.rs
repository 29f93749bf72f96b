//! Shared fixtures for the integration suite.
//!
//! Each integration test binary compiles its own copy of this module and
//! uses only part of it.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8PathBuf;

/// Change the working directory for a test and restore it on drop.
///
/// The working directory is process-global; tests using this guard must
/// be `#[serial]`.
pub(crate) struct CwdGuard {
    original: PathBuf,
}

impl CwdGuard {
    pub(crate) fn new(dir: &Path) -> std::io::Result<Self> {
        let original = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        Ok(Self { original })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        // Restore even when the test body panicked; a missing original
        // directory would poison every later test in the binary.
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Whether the `git` binary is on PATH.
///
/// Workspace tests drive real worktrees and skip themselves when git is
/// unavailable rather than failing the suite on a bare machine.
pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Create a source repository with one commit on `main` and a spare
/// `work` branch, under `dir/source`.
pub(crate) fn init_source_repo(dir: &Path) -> Utf8PathBuf {
    let repo = dir.join("source");
    std::fs::create_dir_all(&repo).expect("create source repo dir");

    git(&repo, &["init", "--initial-branch=main"]);
    git(&repo, &["config", "user.email", "tests@runmux.invalid"]);
    git(&repo, &["config", "user.name", "runmux tests"]);

    std::fs::write(repo.join("tracked.txt"), "fixture content\n").expect("write fixture file");
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "initial commit"]);
    git(&repo, &["branch", "work"]);

    Utf8PathBuf::from_path_buf(repo).expect("temp dirs are UTF-8")
}

/// Run git in `dir` for test setup; panics on failure with git's stderr.
///
/// Global and system config are masked so a host's commit.gpgsign or
/// hooks cannot break fixture setup.
pub(crate) fn git(dir: &Path, args: &[&str]) {
    let output = git_command(dir, args);
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Capture stdout of a git command in `dir`; panics on failure.
pub(crate) fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = git_command(dir, args);
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn git_command(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_GLOBAL", dir.join("no-global-gitconfig"))
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("spawn git")
}
