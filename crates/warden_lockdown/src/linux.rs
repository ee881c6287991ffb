//! Filter installation on Linux.

use crate::bpf::{self, SockFprog};
use crate::LockdownError;

/// Audit architecture token the filter is built for; any other
/// architecture at runtime kills the process.
#[cfg(target_arch = "x86_64")]
const AUDIT_ARCH: u32 = 0xC000_003E; // AUDIT_ARCH_X86_64
#[cfg(target_arch = "aarch64")]
const AUDIT_ARCH: u32 = 0xC000_00B7; // AUDIT_ARCH_AARCH64

#[cfg(target_arch = "x86_64")]
mod syscall_nr {
    pub const FORK: u32 = 57;
    pub const VFORK: u32 = 58;
    pub const EXECVE: u32 = 59;
    pub const EXECVEAT: u32 = 322;
    pub const SOCKET: u32 = 41;
    pub const CONNECT: u32 = 42;
    pub const ACCEPT: u32 = 43;
    pub const BIND: u32 = 49;
    pub const ACCEPT4: u32 = 288;
    pub const PTRACE: u32 = 101;
}

#[cfg(target_arch = "aarch64")]
mod syscall_nr {
    // aarch64 has no fork/vfork syscalls; forking goes through clone,
    // which threads also need
    pub const EXECVE: u32 = 221;
    pub const EXECVEAT: u32 = 281;
    pub const SOCKET: u32 = 198;
    pub const CONNECT: u32 = 203;
    pub const ACCEPT: u32 = 202;
    pub const BIND: u32 = 200;
    pub const ACCEPT4: u32 = 242;
    pub const PTRACE: u32 = 117;
}

/// The fixed high-risk syscall set: process execution, forking, raw
/// sockets, tracing.
pub(crate) fn denied_syscalls() -> Vec<u32> {
    use syscall_nr::{ACCEPT, ACCEPT4, BIND, CONNECT, EXECVE, EXECVEAT, PTRACE, SOCKET};
    let mut denied = vec![
        EXECVE, EXECVEAT, SOCKET, CONNECT, BIND, ACCEPT, ACCEPT4, PTRACE,
    ];
    #[cfg(target_arch = "x86_64")]
    denied.extend([syscall_nr::FORK, syscall_nr::VFORK]);
    denied
}

/// Set no-new-privileges and install the denylist filter.
pub(crate) fn install() -> Result<(), LockdownError> {
    let denied = denied_syscalls();
    let program = bpf::build_denylist_program(AUDIT_ARCH, &denied, libc::EPERM);
    let prog = SockFprog {
        len: program.len() as u16,
        filter: program.as_ptr(),
    };

    // Without no-new-privs an unprivileged process may not install a
    // filter at all.
    unsafe {
        if libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) != 0 {
            return Err(LockdownError::NoNewPrivs(std::io::Error::last_os_error()));
        }
        if libc::prctl(
            libc::PR_SET_SECCOMP,
            libc::SECCOMP_MODE_FILTER,
            &prog as *const SockFprog,
            0,
            0,
        ) != 0
        {
            return Err(LockdownError::FilterInstall(std::io::Error::last_os_error()));
        }
    }

    tracing::info!(
        denied = denied.len(),
        instructions = program.len(),
        "installed seccomp denylist filter"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denylist_covers_the_fixed_set() {
        let denied = denied_syscalls();
        assert!(denied.contains(&syscall_nr::EXECVE));
        assert!(denied.contains(&syscall_nr::EXECVEAT));
        assert!(denied.contains(&syscall_nr::SOCKET));
        assert!(denied.contains(&syscall_nr::CONNECT));
        assert!(denied.contains(&syscall_nr::BIND));
        assert!(denied.contains(&syscall_nr::ACCEPT));
        assert!(denied.contains(&syscall_nr::ACCEPT4));
        assert!(denied.contains(&syscall_nr::PTRACE));
    }

    #[test]
    fn test_denylist_has_no_duplicates() {
        let denied = denied_syscalls();
        let mut unique = denied.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), denied.len());
    }
}
