//! Resource limits and privilege drop for isolated embeddings.
//!
//! Both are ordinary, reversible-by-privilege OS operations, kept
//! separate from the irreversible filter install. When used together
//! with [`crate::lockdown`], apply these first.

use crate::LockdownError;

/// Process resource limits.
///
/// Unset fields are left untouched; core dumps are always disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceLimits {
    /// Cap on the address space, in bytes
    pub address_space_bytes: Option<u64>,
    /// Cap on consumed CPU time, in seconds
    pub cpu_seconds: Option<u64>,
    /// Cap on open file descriptors
    pub open_files: Option<u64>,
}

impl ResourceLimits {
    /// Create limits that only disable core dumps
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the address space in bytes
    #[must_use]
    pub fn with_address_space(mut self, bytes: u64) -> Self {
        self.address_space_bytes = Some(bytes);
        self
    }

    /// Cap consumed CPU time in seconds
    #[must_use]
    pub fn with_cpu_seconds(mut self, seconds: u64) -> Self {
        self.cpu_seconds = Some(seconds);
        self
    }

    /// Cap open file descriptors
    #[must_use]
    pub fn with_open_files(mut self, count: u64) -> Self {
        self.open_files = Some(count);
        self
    }
}

/// Apply resource limits to the current process.
///
/// # Errors
///
/// Returns [`LockdownError::ResourceLimit`] with the OS error if any
/// limit is rejected
#[cfg(target_os = "linux")]
pub fn apply_resource_limits(limits: &ResourceLimits) -> Result<(), LockdownError> {
    if let Some(bytes) = limits.address_space_bytes {
        set_rlimit(libc::RLIMIT_AS, bytes, bytes)?;
        set_rlimit(libc::RLIMIT_DATA, bytes, bytes)?;
    }
    if let Some(seconds) = limits.cpu_seconds {
        // soft limit delivers SIGXCPU; the hard limit leaves a grace
        // window before SIGKILL
        set_rlimit(libc::RLIMIT_CPU, seconds, seconds + 5)?;
    }
    if let Some(count) = limits.open_files {
        set_rlimit(libc::RLIMIT_NOFILE, count, count)?;
    }
    set_rlimit(libc::RLIMIT_CORE, 0, 0)?;

    tracing::info!(?limits, "applied resource limits");
    Ok(())
}

/// Apply resource limits to the current process.
///
/// # Errors
///
/// Always fails on non-Linux platforms
#[cfg(not(target_os = "linux"))]
pub fn apply_resource_limits(_limits: &ResourceLimits) -> Result<(), LockdownError> {
    Err(LockdownError::Unsupported)
}

/// Drop process privileges to an unprivileged uid/gid.
///
/// # Errors
///
/// Returns [`LockdownError::PrivilegeDrop`] with the OS error if either
/// id change is rejected
#[cfg(target_os = "linux")]
pub fn drop_privileges(uid: u32, gid: u32) -> Result<(), LockdownError> {
    // group first: once the uid is dropped, the group can no longer be
    // changed
    unsafe {
        if libc::setgid(gid) != 0 {
            return Err(LockdownError::PrivilegeDrop(std::io::Error::last_os_error()));
        }
        if libc::setuid(uid) != 0 {
            return Err(LockdownError::PrivilegeDrop(std::io::Error::last_os_error()));
        }
    }
    tracing::info!(uid, gid, "dropped process privileges");
    Ok(())
}

/// Drop process privileges to an unprivileged uid/gid.
///
/// # Errors
///
/// Always fails on non-Linux platforms
#[cfg(not(target_os = "linux"))]
pub fn drop_privileges(_uid: u32, _gid: u32) -> Result<(), LockdownError> {
    Err(LockdownError::Unsupported)
}

#[cfg(target_os = "linux")]
fn set_rlimit(
    resource: libc::__rlimit_resource_t,
    soft: u64,
    hard: u64,
) -> Result<(), LockdownError> {
    let limit = libc::rlimit {
        rlim_cur: soft,
        rlim_max: hard,
    };
    let rc = unsafe { libc::setrlimit(resource, &limit) };
    if rc != 0 {
        return Err(LockdownError::ResourceLimit(std::io::Error::last_os_error()));
    }
    Ok(())
}
