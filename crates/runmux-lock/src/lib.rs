//! Exclusive file locking for parallel run execution
//!
//! This crate provides the try-once, OS-level exclusive locks that keep
//! concurrent runs from stepping on each other: [`ExecutorLock`] guards a run
//! identity, [`WorkspaceLease`] guards a physical workspace directory, and
//! both are built on [`ExclusiveFileLock`]. The locking is advisory and
//! coordinates cooperating processes but is not a security boundary.
//!
//! Acquisition never blocks and never expires on its own. A lock file left
//! behind by a crashed holder keeps blocking acquisition until an operator
//! removes it with [`ExecutorLock::force_unlock`]; breaking a live lock
//! automatically could double-execute a run, which is the worse failure.

use fd_lock::RwLock;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::System;

/// Subdirectory of the runs root that holds executor lock files.
pub const LOCK_DIR: &str = ".locks";

/// Subdirectory of the runs root that holds workspace lease files.
pub const LEASE_DIR: &str = ".workspace_leases";

/// Lock errors for file locking operations
///
/// Contention is not an error; see [`LockAttempt`]. These variants cover only
/// I/O failures where the attempt itself could not be carried out.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Failed to acquire lock at '{path}': {reason}")]
    Acquire { path: PathBuf, reason: String },

    #[error("Failed to remove lock file at '{path}': {reason}")]
    Remove { path: PathBuf, reason: String },
}

/// Diagnostic identity of a lock holder.
///
/// Written into every lock file so an operator staring at a stale lock can
/// tell which process on which machine created it. Line-oriented plain text,
/// never machine-parsed for decisions: line 1 is `{pid}@{hostname}`, line 2
/// is the holder's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// Hostname of the machine that created the lock
    pub hostname: String,
    /// Working directory of the creating process
    pub owner_path: String,
}

impl HolderInfo {
    /// Identity of the current process.
    fn current() -> Self {
        let hostname = System::host_name().unwrap_or_else(|| "unknown-host".to_string());
        let owner_path = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            pid: process::id(),
            hostname,
            owner_path,
        }
    }

    /// Render the two-line lock file body.
    fn render(&self) -> String {
        format!("{}@{}\n{}\n", self.pid, self.hostname, self.owner_path)
    }

    /// Parse a lock file body. Returns `None` for anything malformed; the
    /// body is diagnostic data and an unreadable one never blocks a decision.
    fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines();
        let first = lines.next()?;
        let (pid_str, hostname) = first.split_once('@')?;
        let pid = pid_str.trim().parse().ok()?;
        let owner_path = lines.next().unwrap_or("").trim().to_string();
        Some(Self {
            pid,
            hostname: hostname.trim().to_string(),
            owner_path,
        })
    }

    /// Whether the recorded process still appears to be alive on this host.
    ///
    /// Diagnostic only. Liveness is never used to break a lock: the pid may
    /// belong to a holder on another machine, or may have been recycled.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        is_process_running(self.pid)
    }
}

/// Outcome of a non-blocking lock acquisition attempt.
///
/// Acquisition has three outcomes, not two: acquired, contended, or failed.
/// Callers match on this enum for the first two; only genuine I/O failure
/// surfaces as [`LockError`].
#[derive(Debug)]
pub enum LockAttempt {
    /// The lock was acquired; the handle owns the lock file until release.
    Acquired(ExclusiveFileLock),
    /// Another holder owns the lock. Carries the holder's diagnostic
    /// identity when the lock file body was readable.
    Contended(Option<HolderInfo>),
}

/// OS-level, try-once exclusive lock on a designated file path.
///
/// Mutual exclusion comes from atomic `O_EXCL` file creation: at most one
/// process system-wide can create the lock file, and the file's existence is
/// the lock. An advisory file-descriptor lock is additionally held on the
/// created file while the holder stamps its [`HolderInfo`] into it.
///
/// Release is idempotent and never raises; dropping an un-released handle
/// performs the same cleanup. The contract is identical across host
/// operating systems.
pub struct ExclusiveFileLock {
    lock_path: PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    holder: HolderInfo,
    acquired_at: u64,
    released: bool,
}

impl ExclusiveFileLock {
    /// Attempt to acquire the lock at `lock_path` without blocking.
    ///
    /// Creates parent directories as needed. Returns
    /// [`LockAttempt::Contended`] when the file already exists, whether its
    /// holder is alive or long dead; there is no staleness heuristic here.
    pub fn acquire(lock_path: &Path) -> Result<LockAttempt, LockError> {
        if let Some(parent) = lock_path.parent() {
            ensure_dir_all(parent).map_err(|e| LockError::Acquire {
                path: lock_path.to_path_buf(),
                reason: format!("failed to create lock directory: {e}"),
            })?;
        }

        // Atomic file creation with O_EXCL semantics (create_new)
        match fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(lock_path)
        {
            Ok(lock_file) => {
                Self::finalize(lock_path.to_path_buf(), lock_file).map(LockAttempt::Acquired)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Ok(LockAttempt::Contended(Self::read_holder(lock_path)))
            }
            Err(e) => Err(LockError::Acquire {
                path: lock_path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    /// Finalize acquisition by stamping holder metadata under an fd lock.
    fn finalize(lock_path: PathBuf, lock_file: fs::File) -> Result<Self, LockError> {
        let holder = HolderInfo::current();
        let mut rw_lock = Box::new(RwLock::new(lock_file));

        if let Err(e) = Self::stamp_holder(&mut rw_lock, &holder) {
            // A bodyless lock file would block forever with no diagnostics;
            // remove it before reporting the failure.
            drop(rw_lock);
            let _ = fs::remove_file(&lock_path);
            return Err(LockError::Acquire {
                path: lock_path,
                reason: format!("failed to write holder metadata: {e}"),
            });
        }

        let acquired_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        tracing::debug!(
            target: "runmux::lock",
            path = %lock_path.display(),
            pid = holder.pid,
            "Acquired exclusive file lock"
        );

        Ok(Self {
            lock_path,
            _fd_lock: Some(rw_lock),
            holder,
            acquired_at,
            released: false,
        })
    }

    /// Write the holder body while holding the advisory fd lock.
    ///
    /// The guard is dropped at the end of the write; the created file itself
    /// remains the lock.
    fn stamp_holder(rw_lock: &mut Box<RwLock<fs::File>>, holder: &HolderInfo) -> io::Result<()> {
        let fd_lock = rw_lock.try_write()?;
        let mut file_ref = &*fd_lock;
        file_ref.write_all(holder.render().as_bytes())?;
        file_ref.flush()?;
        // Sync to disk for crash-resilience (small file, acceptable cost)
        file_ref.sync_all()?;
        Ok(())
    }

    /// Read a holder identity back out of an existing lock file.
    pub(crate) fn read_holder(lock_path: &Path) -> Option<HolderInfo> {
        let content = fs::read_to_string(lock_path).ok()?;
        HolderInfo::parse(&content)
    }

    /// Release the lock: close the handle and delete the lock file.
    ///
    /// Idempotent and infallible by contract. Removal failures are logged
    /// and swallowed so a release on an unwind path can never mask the
    /// caller's real outcome.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Drop the file descriptor lock first
        self._fd_lock.take();

        match fs::remove_file(&self.lock_path) {
            Ok(()) => {
                tracing::debug!(
                    target: "runmux::lock",
                    path = %self.lock_path.display(),
                    "Released exclusive file lock"
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    target: "runmux::lock",
                    path = %self.lock_path.display(),
                    error = %e,
                    "Failed to remove lock file on release"
                );
            }
        }
    }

    /// Path of the lock file this handle owns.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// The identity stamped into the lock file.
    #[must_use]
    pub fn holder(&self) -> &HolderInfo {
        &self.holder
    }

    /// Seconds since the UNIX epoch when the lock was acquired.
    #[must_use]
    pub const fn acquired_at(&self) -> u64 {
        self.acquired_at
    }
}

impl std::fmt::Debug for ExclusiveFileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveFileLock")
            .field("lock_path", &self.lock_path)
            .field("holder", &self.holder)
            .field("released", &self.released)
            .field("_fd_lock", &"<RwLock>")
            .finish()
    }
}

impl Drop for ExclusiveFileLock {
    /// Automatically release the lock when the handle is dropped.
    fn drop(&mut self) {
        self.release();
    }
}

/// Mutual-exclusion guard over a run identity.
///
/// At most one process executes a given run id at a time. Lock files live at
/// `{runs_root}/.locks/{run_id}.lock`. There is deliberately no TTL: a lock
/// abandoned by a crashed holder is a documented operational hazard that
/// [`ExecutorLock::force_unlock`] exists to clear, not something healed
/// automatically.
#[derive(Debug)]
pub struct ExecutorLock {
    run_id: String,
    lock_path: PathBuf,
    inner: Option<ExclusiveFileLock>,
}

impl ExecutorLock {
    /// Create a handle for `run_id` under `runs_root`. Does not acquire.
    pub fn new(runs_root: &Path, run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            lock_path: Self::lock_path_for(runs_root, run_id),
            inner: None,
        }
    }

    /// Path of the lock file for `run_id` under `runs_root`.
    #[must_use]
    pub fn lock_path_for(runs_root: &Path, run_id: &str) -> PathBuf {
        runs_root.join(LOCK_DIR).join(format!("{run_id}.lock"))
    }

    /// Attempt to acquire the lock without blocking.
    ///
    /// `Ok(true)` on success; `Ok(false)` when another holder owns it, in
    /// which case the holder's identity and apparent liveness are logged for
    /// the operator. Acquiring through a handle that already holds the lock
    /// is a no-op returning `true`.
    pub fn acquire(&mut self) -> Result<bool, LockError> {
        if self.inner.is_some() {
            return Ok(true);
        }

        match ExclusiveFileLock::acquire(&self.lock_path)? {
            LockAttempt::Acquired(lock) => {
                tracing::debug!(
                    target: "runmux::lock",
                    run_id = %self.run_id,
                    path = %self.lock_path.display(),
                    "Acquired executor lock"
                );
                self.inner = Some(lock);
                Ok(true)
            }
            LockAttempt::Contended(holder) => {
                log_contention("executor lock", &self.run_id, &self.lock_path, holder.as_ref());
                Ok(false)
            }
        }
    }

    /// Release the lock. Idempotent; also a no-op on a never-acquired handle.
    pub fn release(&mut self) {
        if let Some(mut lock) = self.inner.take() {
            lock.release();
        }
    }

    /// Whether this handle currently holds the lock.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.inner.is_some()
    }

    /// The run id this lock guards.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Path of the lock file, whether or not it exists.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Read the holder recorded in an existing lock file, if any.
    #[must_use]
    pub fn holder_info(runs_root: &Path, run_id: &str) -> Option<HolderInfo> {
        let lock_path = Self::lock_path_for(runs_root, run_id);
        ExclusiveFileLock::read_holder(&lock_path)
    }

    /// Remove the lock file for `run_id` regardless of who holds it.
    ///
    /// The escape hatch for a crashed holder. Logged loudly, including the
    /// recorded holder when readable. Returns `Ok(true)` when a file was
    /// removed and `Ok(false)` when none existed.
    pub fn force_unlock(runs_root: &Path, run_id: &str) -> Result<bool, LockError> {
        let lock_path = Self::lock_path_for(runs_root, run_id);
        let holder = ExclusiveFileLock::read_holder(&lock_path);

        match fs::remove_file(&lock_path) {
            Ok(()) => {
                match holder {
                    Some(h) => tracing::warn!(
                        target: "runmux::lock",
                        run_id = %run_id,
                        path = %lock_path.display(),
                        holder_pid = h.pid,
                        holder_host = %h.hostname,
                        holder_alive = h.is_alive(),
                        "Force-removed executor lock"
                    ),
                    None => tracing::warn!(
                        target: "runmux::lock",
                        run_id = %run_id,
                        path = %lock_path.display(),
                        "Force-removed executor lock with unreadable holder metadata"
                    ),
                }
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::Remove {
                path: lock_path,
                reason: e.to_string(),
            }),
        }
    }
}

/// Mutual-exclusion guard over a physical workspace directory.
///
/// Independent of run identity: a directory can be reused by different run
/// ids over time, so holding an [`ExecutorLock`] says nothing about who else
/// might be touching the same path during a cleanup race. Lease files live
/// at `{runs_root}/.workspace_leases/workspace_{digest}.lock`, keyed by a
/// digest of the absolute workspace path so every process derives the same
/// lease for the same directory.
#[derive(Debug)]
pub struct WorkspaceLease {
    workspace_path: PathBuf,
    lock_path: PathBuf,
    inner: Option<ExclusiveFileLock>,
}

impl WorkspaceLease {
    /// Create a handle leasing `workspace_path` under `runs_root`.
    /// Does not acquire.
    pub fn new(runs_root: &Path, workspace_path: &Path) -> Self {
        Self {
            workspace_path: workspace_path.to_path_buf(),
            lock_path: Self::lease_path_for(runs_root, workspace_path),
            inner: None,
        }
    }

    /// Path of the lease file for `workspace_path` under `runs_root`.
    #[must_use]
    pub fn lease_path_for(runs_root: &Path, workspace_path: &Path) -> PathBuf {
        runs_root
            .join(LEASE_DIR)
            .join(format!("workspace_{}.lock", path_digest(workspace_path)))
    }

    /// Attempt to acquire the lease without blocking.
    ///
    /// `Ok(true)` on success; `Ok(false)` when another holder owns it.
    /// Acquiring through a handle that already holds the lease is a no-op
    /// returning `true`.
    pub fn acquire(&mut self) -> Result<bool, LockError> {
        if self.inner.is_some() {
            return Ok(true);
        }

        match ExclusiveFileLock::acquire(&self.lock_path)? {
            LockAttempt::Acquired(lock) => {
                tracing::debug!(
                    target: "runmux::lock",
                    workspace = %self.workspace_path.display(),
                    path = %self.lock_path.display(),
                    "Acquired workspace lease"
                );
                self.inner = Some(lock);
                Ok(true)
            }
            LockAttempt::Contended(holder) => {
                let label = self.workspace_path.display().to_string();
                log_contention("workspace lease", &label, &self.lock_path, holder.as_ref());
                Ok(false)
            }
        }
    }

    /// Release the lease. Idempotent; also a no-op on a never-acquired handle.
    pub fn release(&mut self) {
        if let Some(mut lock) = self.inner.take() {
            lock.release();
        }
    }

    /// Whether this handle currently holds the lease.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.inner.is_some()
    }

    /// The workspace directory this lease guards.
    #[must_use]
    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    /// Path of the lease file, whether or not it exists.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// Stable digest of a workspace path, used to key lease files.
///
/// Relative paths are resolved against the current directory first so every
/// process derives the same lease file for the same physical directory.
/// Sixteen hex characters keeps lease filenames short while leaving
/// collisions out of reach for the workspace counts one root ever sees.
fn path_digest(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let digest = blake3::hash(absolute.to_string_lossy().as_bytes());
    digest.to_hex()[..16].to_string()
}

/// Log a contended acquisition with everything an operator needs to find
/// the conflicting process: recorded pid, host, working directory, whether
/// that pid still looks alive here, and how old the lock file is.
fn log_contention(kind: &str, subject: &str, lock_path: &Path, holder: Option<&HolderInfo>) {
    let age = lock_file_age_secs(lock_path)
        .map(format_duration_secs)
        .unwrap_or_else(|| "unknown".to_string());

    match holder {
        Some(h) => tracing::warn!(
            target: "runmux::lock",
            subject = %subject,
            path = %lock_path.display(),
            holder_pid = h.pid,
            holder_host = %h.hostname,
            holder_path = %h.owner_path,
            holder_alive = h.is_alive(),
            lock_age = %age,
            "Contended {kind}: already held"
        ),
        None => tracing::warn!(
            target: "runmux::lock",
            subject = %subject,
            path = %lock_path.display(),
            lock_age = %age,
            "Contended {kind}: already held, holder metadata unreadable"
        ),
    }
}

/// Age of a lock file in seconds, from its modification time.
fn lock_file_age_secs(lock_path: &Path) -> Option<u64> {
    let modified = fs::metadata(lock_path).ok()?.modified().ok()?;
    SystemTime::now()
        .duration_since(modified)
        .ok()
        .map(|d| d.as_secs())
}

/// Format a duration in seconds in a human-readable way
fn format_duration_secs(duration: u64) -> String {
    if duration < 60 {
        format!("{duration}s")
    } else if duration < 3600 {
        format!("{}m", duration / 60)
    } else if duration < 86400 {
        format!("{}h", duration / 3600)
    } else {
        format!("{}d", duration / 86400)
    }
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
///
/// Simplified version of the helper in runmux-utils so this crate stays at
/// the bottom of the workspace with no internal dependencies.
fn ensure_dir_all(path: &Path) -> io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// Check if a process with the given PID is still running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // On Unix systems, use kill(pid, 0) to check if process exists
        // Returns 0 if process exists and we can signal it
        // Returns -1 with ESRCH if process doesn't exist
        // Returns -1 with EPERM if process exists but we lack permission
        let rc = unsafe { libc::kill(pid as i32, 0) };
        if rc == 0 {
            true
        } else {
            // If EPERM, the process exists but we can't signal it
            matches!(
                io::Error::last_os_error().raw_os_error(),
                Some(code) if code == libc::EPERM
            )
        }
    }

    #[cfg(windows)]
    {
        // On Windows, try to open the process handle and check if it's still running
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::minwinbase::STILL_ACTIVE;
        use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
        use winapi::um::winnt::PROCESS_QUERY_LIMITED_INFORMATION;

        unsafe {
            // PROCESS_QUERY_LIMITED_INFORMATION is sufficient for
            // GetExitCodeProcess and works with more processes than
            // PROCESS_QUERY_INFORMATION
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }

            let mut exit_code: u32 = 0;
            let result = GetExitCodeProcess(handle, &mut exit_code);

            // If GetExitCodeProcess fails, assume process is not running
            if result == 0 {
                CloseHandle(handle);
                return false;
            }

            // STILL_ACTIVE (259) means the process is still running
            CloseHandle(handle);
            exit_code == STILL_ACTIVE
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        // Fallback: assume process is running (conservative approach)
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn temp_root() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    #[test]
    fn acquire_creates_lock_file_with_holder_metadata() {
        let root = temp_root();
        let lock_path = root.path().join("test.lock");

        let attempt = ExclusiveFileLock::acquire(&lock_path).expect("acquire");
        let lock = match attempt {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::Contended(_) => panic!("fresh path should not be contended"),
        };

        assert!(lock_path.exists());
        assert_eq!(lock.path(), lock_path.as_path());
        assert_eq!(lock.holder().pid, process::id());

        let body = fs::read_to_string(&lock_path).unwrap();
        let mut lines = body.lines();
        let first = lines.next().unwrap();
        assert!(first.starts_with(&format!("{}@", process::id())));
        let cwd = std::env::current_dir().unwrap().display().to_string();
        assert_eq!(lines.next().unwrap(), cwd);
    }

    #[test]
    fn second_acquire_reports_contention_with_holder() {
        let root = temp_root();
        let lock_path = root.path().join("test.lock");

        let _held = match ExclusiveFileLock::acquire(&lock_path).unwrap() {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::Contended(_) => panic!("first acquire should win"),
        };

        match ExclusiveFileLock::acquire(&lock_path).unwrap() {
            LockAttempt::Acquired(_) => panic!("second acquire must not succeed"),
            LockAttempt::Contended(holder) => {
                let holder = holder.expect("holder metadata should be readable");
                assert_eq!(holder.pid, process::id());
                assert!(holder.is_alive());
            }
        }
    }

    #[test]
    fn release_removes_file_and_is_idempotent() {
        let root = temp_root();
        let lock_path = root.path().join("test.lock");

        let mut lock = match ExclusiveFileLock::acquire(&lock_path).unwrap() {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::Contended(_) => panic!("fresh path should not be contended"),
        };

        lock.release();
        assert!(!lock_path.exists());

        // Second release is a no-op, not a panic or an error
        lock.release();

        // And the path is acquirable again
        assert!(matches!(
            ExclusiveFileLock::acquire(&lock_path).unwrap(),
            LockAttempt::Acquired(_)
        ));
    }

    #[test]
    fn drop_releases_the_lock() {
        let root = temp_root();
        let lock_path = root.path().join("test.lock");

        {
            let _lock = match ExclusiveFileLock::acquire(&lock_path).unwrap() {
                LockAttempt::Acquired(lock) => lock,
                LockAttempt::Contended(_) => panic!("fresh path should not be contended"),
            };
            assert!(lock_path.exists());
        }

        assert!(!lock_path.exists());
        assert!(matches!(
            ExclusiveFileLock::acquire(&lock_path).unwrap(),
            LockAttempt::Acquired(_)
        ));
    }

    #[test]
    fn contended_lock_with_garbage_body_reports_no_holder() {
        let root = temp_root();
        let lock_path = root.path().join("test.lock");
        fs::write(&lock_path, "not a lock body").unwrap();

        match ExclusiveFileLock::acquire(&lock_path).unwrap() {
            LockAttempt::Acquired(_) => panic!("existing file must block acquisition"),
            LockAttempt::Contended(holder) => assert!(holder.is_none()),
        }
    }

    #[test]
    fn stale_file_from_dead_holder_still_blocks() {
        // No TTL: a lock file survives its holder until force-removed.
        let root = temp_root();
        let lock_path = root.path().join("test.lock");
        fs::write(&lock_path, "4294967295@ghost-host\n/nowhere\n").unwrap();

        match ExclusiveFileLock::acquire(&lock_path).unwrap() {
            LockAttempt::Acquired(_) => panic!("stale lock must not be auto-broken"),
            LockAttempt::Contended(holder) => {
                let holder = holder.expect("body is well-formed");
                assert_eq!(holder.pid, u32::MAX);
                assert_eq!(holder.hostname, "ghost-host");
                assert_eq!(holder.owner_path, "/nowhere");
            }
        }
    }

    #[test]
    fn executor_lock_round_trip() {
        let root = temp_root();

        let mut first = ExecutorLock::new(root.path(), "run-1");
        assert!(!first.is_held());
        assert!(first.acquire().unwrap());
        assert!(first.is_held());

        // Re-acquiring through the same handle is a no-op
        assert!(first.acquire().unwrap());

        let mut second = ExecutorLock::new(root.path(), "run-1");
        assert!(!second.acquire().unwrap());
        assert!(!second.is_held());

        first.release();
        assert!(!first.is_held());
        assert!(second.acquire().unwrap());
        second.release();
    }

    #[test]
    fn executor_lock_files_live_under_locks_dir() {
        let root = temp_root();
        let lock = ExecutorLock::new(root.path(), "run-7");
        assert_eq!(
            lock.lock_path(),
            root.path().join(".locks").join("run-7.lock")
        );
    }

    #[test]
    fn executor_locks_for_different_runs_are_independent() {
        let root = temp_root();

        let mut a = ExecutorLock::new(root.path(), "run-a");
        let mut b = ExecutorLock::new(root.path(), "run-b");
        assert!(a.acquire().unwrap());
        assert!(b.acquire().unwrap());

        a.release();
        b.release();
    }

    #[test]
    fn executor_release_without_acquire_is_a_noop() {
        let root = temp_root();
        let mut lock = ExecutorLock::new(root.path(), "run-1");
        lock.release();
        lock.release();
        assert!(!lock.is_held());
    }

    #[test]
    fn force_unlock_removes_a_held_lock() {
        let root = temp_root();

        let mut held = ExecutorLock::new(root.path(), "run-1");
        assert!(held.acquire().unwrap());

        assert!(ExecutorLock::force_unlock(root.path(), "run-1").unwrap());
        assert!(!held.lock_path().exists());

        let mut next = ExecutorLock::new(root.path(), "run-1");
        assert!(next.acquire().unwrap());
        next.release();

        // The original handle's release must tolerate the file being gone.
        held.release();
    }

    #[test]
    fn force_unlock_without_lock_reports_false() {
        let root = temp_root();
        assert!(!ExecutorLock::force_unlock(root.path(), "run-1").unwrap());
    }

    #[test]
    fn holder_info_reads_back_from_disk() {
        let root = temp_root();

        let mut lock = ExecutorLock::new(root.path(), "run-1");
        assert!(lock.acquire().unwrap());

        let holder = ExecutorLock::holder_info(root.path(), "run-1").expect("holder readable");
        assert_eq!(holder.pid, process::id());

        lock.release();
        assert!(ExecutorLock::holder_info(root.path(), "run-1").is_none());
    }

    #[test]
    fn lease_blocks_second_holder_on_same_path() {
        let root = temp_root();
        let workspace = root.path().join("workspaces").join("run-1");

        let mut first = WorkspaceLease::new(root.path(), &workspace);
        let mut second = WorkspaceLease::new(root.path(), &workspace);

        assert!(first.acquire().unwrap());
        assert!(!second.acquire().unwrap());

        first.release();
        assert!(second.acquire().unwrap());
        second.release();
    }

    #[test]
    fn leases_on_different_paths_are_independent() {
        let root = temp_root();

        let mut a = WorkspaceLease::new(root.path(), &root.path().join("ws-a"));
        let mut b = WorkspaceLease::new(root.path(), &root.path().join("ws-b"));

        assert!(a.acquire().unwrap());
        assert!(b.acquire().unwrap());
        assert_ne!(a.lock_path(), b.lock_path());

        a.release();
        b.release();
    }

    #[test]
    fn lease_files_live_under_lease_dir_keyed_by_digest() {
        let root = temp_root();
        let workspace = root.path().join("ws");
        let lease = WorkspaceLease::new(root.path(), &workspace);

        let file_name = lease.lock_path().file_name().unwrap().to_string_lossy();
        assert!(file_name.starts_with("workspace_"));
        assert!(file_name.ends_with(".lock"));

        let digest = file_name
            .strip_prefix("workspace_")
            .unwrap()
            .strip_suffix(".lock")
            .unwrap();
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(
            lease.lock_path().parent().unwrap(),
            root.path().join(".workspace_leases")
        );
    }

    #[test]
    fn path_digest_is_stable_and_distinguishes_paths() {
        let a = Path::new("/tmp/runmux/workspaces/run-1");
        let b = Path::new("/tmp/runmux/workspaces/run-2");

        assert_eq!(path_digest(a), path_digest(a));
        assert_ne!(path_digest(a), path_digest(b));
    }

    #[test]
    fn current_pid_is_reported_running() {
        assert!(is_process_running(process::id()));
    }

    #[test]
    fn format_duration_buckets() {
        assert_eq!(format_duration_secs(45), "45s");
        assert_eq!(format_duration_secs(120), "2m");
        assert_eq!(format_duration_secs(7200), "2h");
        assert_eq!(format_duration_secs(172_800), "2d");
    }

    proptest! {
        #[test]
        fn holder_info_roundtrips_through_lock_body(
            pid in any::<u32>(),
            hostname in "[a-z][a-z0-9.-]{0,31}",
            owner in "(/[a-zA-Z0-9_.-]{1,12}){1,6}",
        ) {
            let info = HolderInfo {
                pid,
                hostname: hostname.clone(),
                owner_path: owner.clone(),
            };
            let parsed = HolderInfo::parse(&info.render()).expect("well-formed body parses");
            prop_assert_eq!(parsed, info);
        }

        #[test]
        fn path_digest_is_short_lowercase_hex(segments in "(/[a-zA-Z0-9_.-]{1,16}){1,8}") {
            let digest = path_digest(Path::new(&segments));
            prop_assert_eq!(digest.len(), 16);
            prop_assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
