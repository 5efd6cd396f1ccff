//! Live process-table queries
//!
//! Every call goes back to the operating system; nothing is cached between
//! queries, so a process killed by someone else disappears (or turns into a
//! zombie) on the very next lookup.
//!
//! ## Backends
//!
//! - **Linux/Android**: `/proc/<pid>/stat` text records ([`Procfs`])
//! - **macOS**: `sysctl(KERN_PROC_ALL)` fixed-layout `kinfo_proc` records
//!   (see [`layout`])
//! - **Everything else**: the `sysinfo` crate

pub mod layout;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use linux::Procfs;
#[cfg(any(target_os = "linux", target_os = "android"))]
use linux as platform;

#[cfg(target_os = "macos")]
mod darwin;
#[cfg(target_os = "macos")]
use darwin as platform;

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
mod fallback;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
use fallback as platform;

use std::fmt;

use serde::Serialize;

use crate::error::{ProcessError, Result};

/// Run state of an OS process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProcessState {
    Running,
    /// Sleeping or waiting (interruptible or not)
    Sleeping,
    /// Stopped by a job-control signal or a tracer
    Stopped,
    /// Zombie or dead: exited but not yet reaped
    Dead,
    /// Present, but the platform reported a state we do not map
    Unknown,
    /// No process with this pid
    NonExistent,
    /// The pid now belongs to a different process
    Obsolete,
}

impl ProcessState {
    /// Whether a process in this state still counts as running
    pub fn is_alive(self) -> bool {
        !matches!(
            self,
            ProcessState::NonExistent | ProcessState::Obsolete | ProcessState::Dead
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Point-in-time facts about one OS process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeProcessInfo {
    pub pid: u32,
    pub parent_pid: u32,
    pub executable: String,
    pub state: ProcessState,
}

impl RuntimeProcessInfo {
    /// Sentinel for "there is no such process"
    pub fn non_existent() -> Self {
        Self {
            pid: 0,
            parent_pid: 0,
            executable: String::new(),
            state: ProcessState::NonExistent,
        }
    }
}

/// Source of live process-table snapshots
pub trait ProcessEnumerator: Send + Sync {
    /// Every process currently known to the OS
    fn list_all(&self) -> Result<Vec<RuntimeProcessInfo>>;

    /// One process by pid
    ///
    /// Must agree with filtering [`list_all`](Self::list_all), including
    /// reporting zombies as present with [`ProcessState::Dead`].
    fn by_pid(&self, pid: u32) -> Result<Option<RuntimeProcessInfo>> {
        Ok(self.list_all()?.into_iter().find(|p| p.pid == pid))
    }
}

/// The enumerator for the platform this crate was built for
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnumerator;

impl ProcessEnumerator for SystemEnumerator {
    fn list_all(&self) -> Result<Vec<RuntimeProcessInfo>> {
        platform::list_all()
    }

    fn by_pid(&self, pid: u32) -> Result<Option<RuntimeProcessInfo>> {
        platform::by_pid(pid)
    }
}

/// All processes, freshly queried
pub fn all_processes() -> Result<Vec<RuntimeProcessInfo>> {
    SystemEnumerator.list_all()
}

/// One process by pid, freshly queried
pub fn process_by_pid(pid: u32) -> Result<RuntimeProcessInfo> {
    SystemEnumerator
        .by_pid(pid)?
        .ok_or(ProcessError::NotFound { pid })
}
