//! `sysinfo` backed process table for platforms without a native backend

use sysinfo::{ProcessStatus, System};

use super::{ProcessState, RuntimeProcessInfo};
use crate::error::Result;

fn state_from_status(status: ProcessStatus) -> ProcessState {
    match status {
        ProcessStatus::Run => ProcessState::Running,
        ProcessStatus::Sleep | ProcessStatus::Idle | ProcessStatus::UninterruptibleDiskSleep => {
            ProcessState::Sleeping
        }
        ProcessStatus::Stop | ProcessStatus::Tracing => ProcessState::Stopped,
        ProcessStatus::Zombie | ProcessStatus::Dead => ProcessState::Dead,
        _ => ProcessState::Unknown,
    }
}

pub(super) fn list_all() -> Result<Vec<RuntimeProcessInfo>> {
    // A fresh System per query so nothing is served from an old refresh
    let mut system = System::new();
    system.refresh_processes();

    Ok(system
        .processes()
        .iter()
        .map(|(pid, process)| RuntimeProcessInfo {
            pid: pid.as_u32(),
            parent_pid: process.parent().map(|p| p.as_u32()).unwrap_or(0),
            executable: process.name().to_string(),
            state: state_from_status(process.status()),
        })
        .collect())
}

pub(super) fn by_pid(pid: u32) -> Result<Option<RuntimeProcessInfo>> {
    Ok(list_all()?.into_iter().find(|p| p.pid == pid))
}
