//! Process liveness probe.
//!
//! Only [`ProcessLiveness::Dead`] ever justifies deleting a lock or temp file;
//! every other outcome, including probe failures, is treated as a live owner.

/// Result of probing a process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLiveness {
    /// The process exists.
    Alive,
    /// The process exists but belongs to another user.
    AliveOtherUser,
    /// No process has this id.
    Dead,
    /// The probe could not tell.
    Unknown,
}

impl ProcessLiveness {
    /// Returns `true` only when the process is confirmed gone.
    pub fn is_dead(self) -> bool {
        self == Self::Dead
    }
}

/// Checks whether `pid` refers to a running process without affecting it.
#[cfg(unix)]
pub fn probe(pid: u32) -> ProcessLiveness {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return ProcessLiveness::Unknown;
    };
    // 0 and negative ids address process groups, not a single process.
    if raw <= 0 {
        return ProcessLiveness::Unknown;
    }

    // SAFETY: signal 0 only performs the existence and permission checks.
    if unsafe { libc::kill(raw, 0) } == 0 {
        return ProcessLiveness::Alive;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => ProcessLiveness::Dead,
        Some(libc::EPERM) => ProcessLiveness::AliveOtherUser,
        _ => ProcessLiveness::Unknown,
    }
}

/// Checks whether `pid` refers to a running process without affecting it.
#[cfg(windows)]
pub fn probe(pid: u32) -> ProcessLiveness {
    use windows_sys::Win32::Foundation::{
        CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, GetLastError, STILL_ACTIVE,
    };
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    if pid == 0 {
        return ProcessLiveness::Unknown;
    }

    // SAFETY: the handle is checked before use and closed exactly once.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            return match GetLastError() {
                ERROR_INVALID_PARAMETER => ProcessLiveness::Dead,
                ERROR_ACCESS_DENIED => ProcessLiveness::AliveOtherUser,
                _ => ProcessLiveness::Unknown,
            };
        }

        let mut code = 0u32;
        let queried = GetExitCodeProcess(handle, &mut code);
        CloseHandle(handle);

        if queried == 0 {
            ProcessLiveness::Unknown
        } else if code == STILL_ACTIVE as u32 {
            ProcessLiveness::Alive
        } else {
            ProcessLiveness::Dead
        }
    }
}

/// Checks whether `pid` refers to a running process without affecting it.
#[cfg(not(any(unix, windows)))]
pub fn probe(_pid: u32) -> ProcessLiveness {
    ProcessLiveness::Unknown
}
