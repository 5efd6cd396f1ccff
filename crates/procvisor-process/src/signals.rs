//! Platform signal delivery used by the stop escalation
//!
//! The escalation never branches on the platform itself; it calls a
//! [`SignalStrategy`] picked once by [`default_strategy`] (or injected by
//! the host, e.g. to count deliveries in tests).

use std::sync::Arc;

use crate::error::SignalError;

/// Delivery of the escalation signals to a pid
pub trait SignalStrategy: Send + Sync {
    /// Polite interrupt (SIGINT)
    fn interrupt(&self, pid: u32) -> Result<(), SignalError>;

    /// Interrupt for platforms without POSIX signal delivery
    fn interrupt_equivalent(&self, _pid: u32) -> Result<(), SignalError> {
        Ok(())
    }

    /// Termination request (SIGTERM)
    fn terminate(&self, pid: u32) -> Result<(), SignalError>;

    /// Uncatchable kill (SIGKILL)
    fn kill(&self, pid: u32) -> Result<(), SignalError>;

    /// Escape hatch for processes that dodge ordinary delivery
    fn aggressive_kill(&self, pid: u32) -> Result<(), SignalError>;
}

/// The strategy for the platform this crate was built for
pub fn default_strategy() -> Arc<dyn SignalStrategy> {
    #[cfg(unix)]
    {
        Arc::new(UnixSignals)
    }

    #[cfg(windows)]
    {
        Arc::new(WindowsSignals)
    }
}

#[cfg(unix)]
pub use unix::UnixSignals;

#[cfg(unix)]
mod unix {
    use std::io;

    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use tracing::trace;

    use super::SignalStrategy;
    use crate::error::SignalError;

    /// POSIX signals via `kill(2)` and `killpg(2)`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UnixSignals;

    fn target(signal: Signal, pid: u32) -> Result<Pid, SignalError> {
        // pid 0 and negative values would address whole process groups
        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
            _ => Err(SignalError::new(
                signal.as_str(),
                pid,
                io::Error::new(io::ErrorKind::InvalidInput, "not a valid process id"),
            )),
        }
    }

    fn deliver(signal: Signal, pid: u32) -> Result<(), SignalError> {
        let raw = target(signal, pid)?;
        match kill(raw, signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                trace!(pid, signal = signal.as_str(), "Process already gone");
                Ok(())
            }
            Err(e) => Err(SignalError::new(signal.as_str(), pid, io::Error::from(e))),
        }
    }

    impl SignalStrategy for UnixSignals {
        fn interrupt(&self, pid: u32) -> Result<(), SignalError> {
            deliver(Signal::SIGINT, pid)
        }

        fn terminate(&self, pid: u32) -> Result<(), SignalError> {
            deliver(Signal::SIGTERM, pid)
        }

        fn kill(&self, pid: u32) -> Result<(), SignalError> {
            deliver(Signal::SIGKILL, pid)
        }

        /// SIGKILL to the whole process group led by `pid`, falling back to
        /// the single process when it leads no group (e.g. adopted pids)
        fn aggressive_kill(&self, pid: u32) -> Result<(), SignalError> {
            let raw = target(Signal::SIGKILL, pid)?;
            match killpg(raw, Signal::SIGKILL) {
                Ok(()) => Ok(()),
                Err(Errno::ESRCH) | Err(Errno::EPERM) => deliver(Signal::SIGKILL, pid),
                Err(e) => Err(SignalError::new("SIGKILL(group)", pid, io::Error::from(e))),
            }
        }
    }

}

#[cfg(windows)]
pub use windows::WindowsSignals;

#[cfg(windows)]
mod windows {
    use std::io;
    use std::process::{Command, Stdio};

    use super::SignalStrategy;
    use crate::error::SignalError;

    /// `taskkill` based delivery; Windows has no POSIX signals
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WindowsSignals;

    fn taskkill(name: &'static str, pid: u32, extra: &[&str]) -> Result<(), SignalError> {
        let status = Command::new("taskkill")
            .args(["/pid", &pid.to_string()])
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SignalError::new(name, pid, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(SignalError::new(
                name,
                pid,
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("taskkill exited with {:?}", status.code()),
                ),
            ))
        }
    }

    impl SignalStrategy for WindowsSignals {
        fn interrupt(&self, _pid: u32) -> Result<(), SignalError> {
            Ok(())
        }

        fn interrupt_equivalent(&self, pid: u32) -> Result<(), SignalError> {
            taskkill("close", pid, &[])
        }

        fn terminate(&self, pid: u32) -> Result<(), SignalError> {
            taskkill("close", pid, &[])
        }

        fn kill(&self, pid: u32) -> Result<(), SignalError> {
            taskkill("force", pid, &["/f"])
        }

        fn aggressive_kill(&self, pid: u32) -> Result<(), SignalError> {
            taskkill("force-tree", pid, &["/t", "/f"])
        }
    }
}
