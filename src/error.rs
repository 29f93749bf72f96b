//! Library-level error type.
//!
//! Component crates keep their own error enums; this aggregate exists
//! for callers of the crate-root operations in [`crate::ops`] and for
//! embedders that want a single error type at their boundary.

use thiserror::Error;

/// Any error a crate-root operation can produce.
#[derive(Error, Debug)]
pub enum RunmuxError {
    #[error("Lock error: {0}")]
    Lock(#[from] runmux_lock::LockError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] runmux_workspace::WorkspaceError),

    #[error("Run id error: {0}")]
    RunId(#[from] runmux_utils::RunIdError),

    #[error("Policy error: {0}")]
    Policy(#[from] runmux_policy::PolicyError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] runmux_supervisor::SupervisorError),
}
