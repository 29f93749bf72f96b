//! Runs-root resolution and directory helpers
//!
//! Every component takes its runs root as an explicit constructor argument;
//! ambient resolution exists only for operator entry points and tests.

use camino::Utf8PathBuf;
use std::cell::RefCell;

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_RUNS_ROOT: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Environment variable that overrides the default runs root.
pub const RUNS_ROOT_ENV: &str = "RUNMUX_ROOT";

/// Directory used when nothing else is configured, relative to the current
/// directory.
pub const DEFAULT_RUNS_ROOT: &str = ".runmux";

/// Resolve the ambient runs root:
/// 1) thread-local override (tests use this)
/// 2) env `RUNMUX_ROOT` (opt-in for users/CI)
/// 3) default ".runmux"
#[must_use]
pub fn default_runs_root() -> Utf8PathBuf {
    if let Some(tl) = THREAD_RUNS_ROOT.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    if let Ok(p) = std::env::var(RUNS_ROOT_ENV) {
        if !p.trim().is_empty() {
            return Utf8PathBuf::from(p);
        }
    }
    Utf8PathBuf::from(DEFAULT_RUNS_ROOT)
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// RAII guard for an isolated runs root that clears thread-local state on drop
#[cfg(any(test, feature = "test-utils"))]
pub struct RunsRootGuard {
    inner: tempfile::TempDir,
}

#[cfg(any(test, feature = "test-utils"))]
impl Drop for RunsRootGuard {
    fn drop(&mut self) {
        THREAD_RUNS_ROOT.with(|tl| *tl.borrow_mut() = None);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl std::ops::Deref for RunsRootGuard {
    type Target = tempfile::TempDir;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Test helper: give this test a unique runs root under the system temp dir.
///
/// Hold the `RunsRootGuard` for the test's duration so the directory stays
/// alive and the thread-local override is cleaned up. Not part of public API
/// stability guarantees.
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(not(test), allow(dead_code))]
#[must_use]
pub fn with_isolated_runs_root() -> RunsRootGuard {
    let td = tempfile::TempDir::new().expect("create temp runs root");
    let p = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
    THREAD_RUNS_ROOT.with(|tl| *tl.borrow_mut() = Some(p));
    RunsRootGuard { inner: td }
}
