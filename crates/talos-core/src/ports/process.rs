//! Signal delivery to processes found on declared ports.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Term => "SIGTERM",
            Signal::Kill => "SIGKILL",
        })
    }
}

/// Result of signalling one PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    Killed,
    NoLongerExists,
    PermissionDenied,
    Other(String),
}

impl fmt::Display for KillOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillOutcome::Killed => f.write_str("killed"),
            KillOutcome::NoLongerExists => f.write_str("no longer exists"),
            KillOutcome::PermissionDenied => f.write_str("permission denied"),
            KillOutcome::Other(reason) => write!(f, "error: {reason}"),
        }
    }
}

pub fn send_signal(pid: u32, signal: Signal) -> KillOutcome {
    let Ok(pid_t) = libc::pid_t::try_from(pid) else {
        return KillOutcome::Other("PID out of range".to_string());
    };
    if pid_t <= 0 {
        return KillOutcome::Other("refusing to signal a process group".to_string());
    }

    // SAFETY: kill(2) with a positive pid only targets that process.
    let result = unsafe { libc::kill(pid_t, signal.raw()) };
    if result == 0 {
        return KillOutcome::Killed;
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => KillOutcome::NoLongerExists,
        Some(libc::EPERM) => KillOutcome::PermissionDenied,
        _ => KillOutcome::Other(err.to_string()),
    }
}

/// Whether `pid` still exists (signal 0 probe).
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid_t) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid_t <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs permission and existence checks only.
    let result = unsafe { libc::kill(pid_t, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signalling_a_reaped_child_reports_gone() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert_eq!(send_signal(pid, Signal::Term), KillOutcome::NoLongerExists);
        assert!(!is_alive(pid));
    }

    #[test]
    fn terminates_a_running_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(is_alive(pid));
        assert_eq!(send_signal(pid, Signal::Kill), KillOutcome::Killed);
        child.wait().unwrap();
    }

    #[test]
    fn pid_zero_is_refused() {
        assert!(matches!(send_signal(0, Signal::Term), KillOutcome::Other(_)));
    }
}
