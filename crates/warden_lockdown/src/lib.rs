//! WARDEN Process Lockdown
//!
//! Process-wide syscall containment, independent of any single VM
//! instance. A seccomp-bpf denylist filter is installed once per process
//! and cannot be removed or widened afterward. Resource limits and
//! privilege drop are separate, explicit pre-lockdown steps.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bpf;
#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
mod linux;
pub mod limits;

pub use limits::{apply_resource_limits, drop_privileges, ResourceLimits};

#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
static APPLIED: AtomicBool = AtomicBool::new(false);

/// Lockdown errors
#[derive(Debug, thiserror::Error)]
pub enum LockdownError {
    /// `prctl(PR_SET_NO_NEW_PRIVS)` failed
    #[error("prctl(PR_SET_NO_NEW_PRIVS) failed: {0}")]
    NoNewPrivs(std::io::Error),

    /// The seccomp filter could not be installed
    #[error("seccomp filter install failed: {0}")]
    FilterInstall(std::io::Error),

    /// A resource limit change was rejected
    #[error("resource limit change failed: {0}")]
    ResourceLimit(std::io::Error),

    /// Changing uid/gid was rejected
    #[error("privilege drop failed: {0}")]
    PrivilegeDrop(std::io::Error),

    /// Lockdown was already applied to this process
    #[error("process lockdown already applied")]
    AlreadyApplied,

    /// This platform has no supported containment mechanism
    #[error("process lockdown is not supported on this platform")]
    Unsupported,
}

/// Lock down the entire process.
///
/// Sets the no-new-privileges attribute, then installs a seccomp-bpf
/// filter that kills the process on an architecture mismatch, denies the
/// fixed high-risk syscall set (process execution, forking, raw sockets,
/// tracing) with `EPERM`, and allows everything else.
///
/// One-shot and irreversible: the filter cannot be removed or widened
/// for the remaining process lifetime, and a second call fails with
/// [`LockdownError::AlreadyApplied`]. Apply after any setup that still
/// needs the denied syscalls, and after [`apply_resource_limits`] /
/// [`drop_privileges`] when those are used.
///
/// # Errors
///
/// Returns the OS-level failure if either prctl step is rejected
pub fn lockdown() -> Result<(), LockdownError> {
    #[cfg(all(
        target_os = "linux",
        any(target_arch = "x86_64", target_arch = "aarch64")
    ))]
    {
        if APPLIED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LockdownError::AlreadyApplied);
        }
        if let Err(err) = linux::install() {
            // nothing was installed; allow a retry
            APPLIED.store(false, Ordering::SeqCst);
            return Err(err);
        }
        return Ok(());
    }
    #[cfg(not(all(
        target_os = "linux",
        any(target_arch = "x86_64", target_arch = "aarch64")
    )))]
    Err(LockdownError::Unsupported)
}
