//! Parallelism policy gate for run execution
//!
//! Running more than one run at a time multiplies resource usage and
//! any damage a misbehaving callback can do, so parallel execution is
//! opt-in. This module provides the policy types and the single
//! authorization check the supervisor calls before starting a batch.
//!
//! The gate fails closed: concurrency above 1 is refused unless the
//! policy explicitly allows it, and a refusal never degrades to serial
//! execution behind the caller's back — the batch simply does not
//! start. Serial execution (concurrency 1) needs no authorization.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Decides whether a requested level of parallelism is authorized.
///
/// Implementations only see concurrency levels greater than 1;
/// [`authorize`] short-circuits serial requests and rejects zero
/// before consulting the policy.
pub trait ParallelismPolicy: Send + Sync {
    /// Whether `requested_concurrency` simultaneous runs are allowed.
    fn is_parallelism_allowed(&self, requested_concurrency: usize) -> bool;
}

/// Errors from the authorization gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Parallel execution of {requested} runs is not authorized by policy")]
    Denied { requested: usize },

    #[error("Invalid concurrency limit {requested}: must be at least 1")]
    InvalidConcurrency { requested: usize },
}

/// Check `requested_concurrency` against `policy`.
///
/// Zero is rejected outright: a semaphore with zero permits would
/// deadlock the batch. One is always allowed. Anything higher must be
/// explicitly authorized; on refusal the caller gets an error instead
/// of a silently reduced concurrency level.
///
/// # Errors
///
/// [`PolicyError::InvalidConcurrency`] for zero,
/// [`PolicyError::Denied`] when the policy refuses.
pub fn authorize(
    policy: &dyn ParallelismPolicy,
    requested_concurrency: usize,
) -> Result<(), PolicyError> {
    if requested_concurrency == 0 {
        return Err(PolicyError::InvalidConcurrency {
            requested: requested_concurrency,
        });
    }

    if requested_concurrency == 1 {
        return Ok(());
    }

    if policy.is_parallelism_allowed(requested_concurrency) {
        debug!(
            target: "runmux::policy",
            requested = requested_concurrency,
            "Parallel execution authorized"
        );
        Ok(())
    } else {
        warn!(
            target: "runmux::policy",
            requested = requested_concurrency,
            "Parallel execution denied by policy"
        );
        Err(PolicyError::Denied {
            requested: requested_concurrency,
        })
    }
}

/// Fixed in-process policy, mostly for tests and embedders that manage
/// authorization themselves.
#[derive(Debug, Clone, Copy)]
pub struct StaticPolicy {
    enabled: bool,
    max_concurrency: usize,
}

impl StaticPolicy {
    /// Allow parallel execution up to `max_concurrency` runs.
    #[must_use]
    pub const fn allow_up_to(max_concurrency: usize) -> Self {
        Self {
            enabled: true,
            max_concurrency,
        }
    }

    /// Deny all parallel execution.
    #[must_use]
    pub const fn deny() -> Self {
        Self {
            enabled: false,
            max_concurrency: 1,
        }
    }
}

impl ParallelismPolicy for StaticPolicy {
    fn is_parallelism_allowed(&self, requested_concurrency: usize) -> bool {
        self.enabled && requested_concurrency <= self.max_concurrency
    }
}

/// Policy document loaded from `policy.toml`.
///
/// ```toml
/// [parallel]
/// enabled = true
/// max_concurrency = 4
/// ```
///
/// Absent sections and fields take the fail-closed defaults: parallel
/// execution disabled, ceiling of 1.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyDocument {
    /// Parallel execution authorization.
    #[serde(default)]
    pub parallel: ParallelSection,
}

/// The `[parallel]` section of a policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelSection {
    /// Whether parallel execution is authorized at all.
    #[serde(default)]
    pub enabled: bool,

    /// Highest concurrency the policy authorizes.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for ParallelSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_max_concurrency() -> usize {
    1
}

impl ParallelismPolicy for PolicyDocument {
    fn is_parallelism_allowed(&self, requested_concurrency: usize) -> bool {
        self.parallel.enabled && requested_concurrency <= self.parallel.max_concurrency
    }
}

/// Resolve policy path from an explicit argument or default locations
///
/// Searches for a policy file in the following order:
/// 1. Explicit path provided by the caller
/// 2. `.runmux/policy.toml` in current directory or repo root
/// 3. `~/.config/runmux/policy.toml`
pub fn resolve_policy_path(policy_path: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = policy_path {
        // Explicit path provided
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        anyhow::bail!("Policy file not found: {}", path.display());
    }

    // Try .runmux/policy.toml in current directory
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let local_policy = cwd.join(".runmux").join("policy.toml");
    if local_policy.exists() {
        return Ok(Some(local_policy));
    }

    // Try to find repo root and check for .runmux/policy.toml
    let repo_root = find_repo_root(&cwd);
    let repo_policy = repo_root.join(".runmux").join("policy.toml");
    if repo_policy.exists() {
        return Ok(Some(repo_policy));
    }

    // Try ~/.config/runmux/policy.toml
    if let Some(config_dir) = dirs::config_dir() {
        let config_policy = config_dir.join("runmux").join("policy.toml");
        if config_policy.exists() {
            return Ok(Some(config_policy));
        }
    }

    // No policy file found
    Ok(None)
}

/// Find repository root by looking for a .git directory
fn find_repo_root(start: &Path) -> PathBuf {
    let mut current = start.to_path_buf();

    for _ in 0..10 {
        if current.join(".git").exists() {
            return current;
        }

        if !current.pop() {
            break;
        }
    }

    // No .git found, fall back to the start directory
    start.to_path_buf()
}

/// Load a policy document from a TOML file
pub fn load_policy_from_path(path: &Path) -> Result<PolicyDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file: {}", path.display()))?;

    let policy: PolicyDocument = toml::from_str(&content)
        .with_context(|| format!("Failed to parse policy TOML: {}", path.display()))?;

    Ok(policy)
}
