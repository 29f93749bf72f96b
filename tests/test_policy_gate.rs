//! Integration tests for the fail-closed parallelism policy gate.
//!
//! The gate is the only batch-level failure mode: a denied or invalid
//! concurrency request aborts `execute_parallel` before any workspace
//! exists or any callback runs, and never degrades to serial execution
//! silently. These tests validate that boundary plus the TOML policy
//! document loader operators configure the gate with.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serial_test::serial;
use tempfile::TempDir;

use runmux::{
    CallbackOutput, PolicyDocument, PolicyError, RunCallback, RunSupervisor, StaticPolicy,
    SupervisorConfig, SupervisorError, authorize, load_policy_from_path, resolve_policy_path,
};

#[allow(clippy::duplicate_mod)]
#[path = "test_support/mod.rs"]
mod test_support;

struct CountingCallback {
    calls: AtomicUsize,
}

impl CountingCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RunCallback for CountingCallback {
    async fn execute(&self, _run_id: &str, _workspace: &Utf8Path) -> Result<CallbackOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CallbackOutput::default())
    }
}

fn supervisor_under(root: &TempDir) -> (RunSupervisor, Utf8PathBuf) {
    let base = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).expect("UTF-8 temp dir");
    let runs_root = base.join("runs");
    let supervisor = RunSupervisor::new(SupervisorConfig::new(
        runs_root.clone(),
        base.join("source"),
    ));
    (supervisor, runs_root)
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

/// Scenario: policy denies concurrency above 1, caller asks for 3. The
/// call fails before any callback and before any filesystem effect.
#[tokio::test]
async fn denied_batch_creates_nothing_and_invokes_nothing() -> Result<()> {
    let root = TempDir::new()?;
    let (supervisor, runs_root) = supervisor_under(&root);
    let callback = CountingCallback::new();

    let outcome = supervisor
        .execute_parallel(
            &ids(&["r1", "r2", "r3"]),
            Arc::clone(&callback) as Arc<dyn RunCallback>,
            3,
            &StaticPolicy::deny(),
        )
        .await;

    assert!(matches!(
        outcome,
        Err(SupervisorError::Policy(PolicyError::Denied { requested: 3 }))
    ));
    assert_eq!(callback.calls.load(Ordering::SeqCst), 0);

    // Fail closed means zero side effects: no workspaces, no locks, no
    // leases — the runs root was never even created.
    assert!(!runs_root.join("workspaces").exists());
    assert!(!runs_root.join(".locks").exists());
    assert!(!runs_root.join(".workspace_leases").exists());
    Ok(())
}

/// A denial is a hard error, not a quiet downgrade: nothing runs at
/// concurrency 1 either.
#[tokio::test]
async fn denied_batch_does_not_fall_back_to_serial() -> Result<()> {
    let root = TempDir::new()?;
    let (supervisor, _runs_root) = supervisor_under(&root);
    let callback = CountingCallback::new();

    let outcome = supervisor
        .execute_parallel(
            &ids(&["r1", "r2"]),
            Arc::clone(&callback) as Arc<dyn RunCallback>,
            2,
            &StaticPolicy::deny(),
        )
        .await;

    assert!(outcome.is_err());
    assert_eq!(
        callback.calls.load(Ordering::SeqCst),
        0,
        "a denied batch must not execute any run, serial or otherwise"
    );
    Ok(())
}

/// Requesting zero concurrency is a caller bug and fails the batch the
/// same way a denial does.
#[tokio::test]
async fn zero_concurrency_fails_the_batch() -> Result<()> {
    let root = TempDir::new()?;
    let (supervisor, runs_root) = supervisor_under(&root);

    let outcome = supervisor
        .execute_parallel(
            &ids(&["r1"]),
            CountingCallback::new() as Arc<dyn RunCallback>,
            0,
            &StaticPolicy::allow_up_to(4),
        )
        .await;

    assert!(matches!(
        outcome,
        Err(SupervisorError::Policy(PolicyError::InvalidConcurrency {
            requested: 0
        }))
    ));
    assert!(!runs_root.exists());
    Ok(())
}

/// Serial execution needs no authorization; parallel needs an explicit
/// grant up to the ceiling.
#[test]
fn authorize_enforces_the_ceiling_but_always_allows_serial() {
    let policy = StaticPolicy::allow_up_to(4);
    assert!(authorize(&policy, 1).is_ok());
    assert!(authorize(&policy, 4).is_ok());
    assert_eq!(
        authorize(&policy, 5),
        Err(PolicyError::Denied { requested: 5 })
    );

    // Serial clears even a policy that denies everything.
    assert!(authorize(&StaticPolicy::deny(), 1).is_ok());
}

/// A policy document straight from disk drives the gate end to end.
#[tokio::test]
async fn policy_document_from_disk_authorizes_the_gate() -> Result<()> {
    let root = TempDir::new()?;
    let policy_path = root.path().join("policy.toml");
    std::fs::write(
        &policy_path,
        "[parallel]\nenabled = true\nmax_concurrency = 2\n",
    )?;

    let policy = load_policy_from_path(&policy_path)?;
    assert!(authorize(&policy, 2).is_ok());
    assert_eq!(
        authorize(&policy, 3),
        Err(PolicyError::Denied { requested: 3 })
    );

    // And through the supervisor: 3 is refused by the loaded document.
    let (supervisor, _runs_root) = supervisor_under(&root);
    let outcome = supervisor
        .execute_parallel(
            &ids(&["r1", "r2", "r3"]),
            CountingCallback::new() as Arc<dyn RunCallback>,
            3,
            &policy,
        )
        .await;
    assert!(matches!(
        outcome,
        Err(SupervisorError::Policy(PolicyError::Denied { requested: 3 }))
    ));
    Ok(())
}

/// Absent fields fail closed: an empty document denies parallelism, and
/// `enabled = true` alone still leaves the ceiling at 1.
#[test]
fn policy_document_defaults_fail_closed() -> Result<()> {
    let root = TempDir::new()?;

    let empty = root.path().join("empty.toml");
    std::fs::write(&empty, "")?;
    let policy = load_policy_from_path(&empty)?;
    assert_eq!(
        authorize(&policy, 2),
        Err(PolicyError::Denied { requested: 2 })
    );

    let enabled_only = root.path().join("enabled.toml");
    std::fs::write(&enabled_only, "[parallel]\nenabled = true\n")?;
    let policy = load_policy_from_path(&enabled_only)?;
    assert_eq!(
        authorize(&policy, 2),
        Err(PolicyError::Denied { requested: 2 })
    );
    assert!(authorize(&policy, 1).is_ok());
    Ok(())
}

/// Malformed TOML is a load error, which callers surface as batch-level
/// misconfiguration rather than running without a policy.
#[test]
fn malformed_policy_document_fails_to_load() -> Result<()> {
    let root = TempDir::new()?;
    let path = root.path().join("broken.toml");
    std::fs::write(&path, "[parallel\nenabled = yes")?;

    assert!(load_policy_from_path(&path).is_err());
    Ok(())
}

/// An explicitly named policy file must exist; a missing one is an
/// error, not an implicit default.
#[test]
fn explicit_policy_path_must_exist() -> Result<()> {
    let root = TempDir::new()?;

    let present = root.path().join("policy.toml");
    std::fs::write(&present, "[parallel]\nenabled = false\n")?;
    assert_eq!(resolve_policy_path(Some(&present))?, Some(present.clone()));

    let missing = root.path().join("no-such-policy.toml");
    assert!(resolve_policy_path(Some(&missing)).is_err());
    Ok(())
}

/// Without an explicit path, `.runmux/policy.toml` under the current
/// directory is found first.
#[test]
#[serial]
fn policy_path_resolution_finds_the_local_document() -> Result<()> {
    let root = TempDir::new()?;
    let local = root.path().join(".runmux");
    std::fs::create_dir_all(&local)?;
    let policy_path = local.join("policy.toml");
    std::fs::write(&policy_path, "[parallel]\nenabled = true\nmax_concurrency = 2\n")?;

    let _cwd = test_support::CwdGuard::new(root.path())?;

    let resolved = resolve_policy_path(None)?.expect("local policy should be found");
    // Compare canonicalized paths: the guard's chdir may go through
    // symlinks (macOS /tmp).
    assert_eq!(resolved.canonicalize()?, policy_path.canonicalize()?);

    let policy: PolicyDocument = load_policy_from_path(&resolved)?;
    assert!(authorize(&policy, 2).is_ok());
    Ok(())
}
