//! `/proc` backed process table

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use super::{ProcessEnumerator, ProcessState, RuntimeProcessInfo};
use crate::error::{ProcessError, Result};

/// Reads the process table from a procfs mount
#[derive(Debug, Clone)]
pub struct Procfs {
    root: PathBuf,
}

impl Default for Procfs {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl Procfs {
    /// Use a procfs mounted somewhere other than `/proc`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_process(&self, dir: &Path, pid: u32) -> io::Result<Option<RuntimeProcessInfo>> {
        // `comm` is cut at 15 bytes and may end mid-character
        let stat = fs::read(dir.join("stat"))?;
        Ok(parse_stat(&stat).filter(|info| info.pid == pid))
    }

    /// Thread ids resolve under `/proc` too but are not listed; only a
    /// thread-group leader is a process.
    fn is_group_leader(&self, dir: &Path, pid: u32) -> io::Result<bool> {
        let status = fs::read(dir.join("status"))?;
        let tgid = String::from_utf8_lossy(&status)
            .lines()
            .find_map(|line| line.strip_prefix("Tgid:"))
            .and_then(|value| value.trim().parse::<u32>().ok());
        Ok(tgid.map_or(true, |tgid| tgid == pid))
    }
}

impl ProcessEnumerator for Procfs {
    fn list_all(&self) -> Result<Vec<RuntimeProcessInfo>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| ProcessError::enumeration("failed to read process table", e))?;

        let mut procs = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };

            match self.read_process(&entry.path(), pid) {
                Ok(Some(info)) => procs.push(info),
                Ok(None) => trace!(pid, "Unparseable stat record"),
                // Exited between readdir and read
                Err(e) => trace!(pid, error = %e, "Process vanished during listing"),
            }
        }

        Ok(procs)
    }

    fn by_pid(&self, pid: u32) -> Result<Option<RuntimeProcessInfo>> {
        if pid == 0 {
            return Ok(None);
        }

        let dir = self.root.join(pid.to_string());
        let info = match self.read_process(&dir, pid) {
            Ok(info) => info,
            Err(e) if is_gone(&e) => return Ok(None),
            Err(e) => {
                return Err(ProcessError::enumeration(
                    &format!("failed to read stat of pid {pid}"),
                    e,
                ))
            }
        };

        match self.is_group_leader(&dir, pid) {
            Ok(true) => Ok(info),
            Ok(false) => Ok(None),
            Err(e) if is_gone(&e) => Ok(None),
            Err(e) => Err(ProcessError::enumeration(
                &format!("failed to read status of pid {pid}"),
                e,
            )),
        }
    }
}

fn is_gone(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(nix::libc::ESRCH)
}

/// Parse one `/proc/<pid>/stat` line
///
/// `comm` sits in parentheses and may itself contain spaces or `)`, so the
/// name runs up to the last closing parenthesis. The name is raw bytes with
/// no charset guarantee and is decoded lossily.
pub(crate) fn parse_stat(contents: &[u8]) -> Option<RuntimeProcessInfo> {
    let open = contents.iter().position(|&b| b == b'(')?;
    let close = contents.iter().rposition(|&b| b == b')')?;
    if close < open {
        return None;
    }

    let pid = std::str::from_utf8(&contents[..open]).ok()?.trim().parse().ok()?;
    let executable = String::from_utf8_lossy(&contents[open + 1..close]).into_owned();

    let mut fields = std::str::from_utf8(&contents[close + 1..])
        .ok()?
        .split_whitespace();
    let state = state_from_letter(fields.next()?.chars().next()?);
    let parent_pid = fields.next()?.parse().ok()?;

    Some(RuntimeProcessInfo {
        pid,
        parent_pid,
        executable,
        state,
    })
}

fn state_from_letter(letter: char) -> ProcessState {
    match letter {
        'R' => ProcessState::Running,
        'S' | 'D' | 'I' | 'W' | 'P' => ProcessState::Sleeping,
        'T' | 't' => ProcessState::Stopped,
        'Z' | 'X' | 'x' => ProcessState::Dead,
        _ => ProcessState::Unknown,
    }
}

pub(super) fn list_all() -> Result<Vec<RuntimeProcessInfo>> {
    Procfs::default().list_all()
}

pub(super) fn by_pid(pid: u32) -> Result<Option<RuntimeProcessInfo>> {
    Procfs::default().by_pid(pid)
}
