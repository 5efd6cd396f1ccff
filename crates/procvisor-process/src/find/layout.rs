//! Fixed-layout process records
//!
//! macOS answers `sysctl(CTL_KERN, KERN_PROC, KERN_PROC_ALL)` with an array
//! of `struct kinfo_proc` (64-bit, little-endian). Only the fields below are
//! read; everything between them is skipped by offset.
//!
//! | field                  | offset | size |
//! |------------------------|--------|------|
//! | `kp_proc.p_stat`       | 36     | 1    |
//! | `kp_proc.p_pid`        | 40     | 4    |
//! | `kp_proc.p_comm`       | 243    | 17   |
//! | `kp_eproc.e_ppid`      | 560    | 4    |
//! | record size            |        | 648  |
//!
//! `p_comm` is `MAXCOMLEN + 1` bytes and zero-terminated when shorter;
//! bytes after the first zero are stale and must not leak into the name.
//!
//! The decoder is plain byte slicing so it builds and is tested everywhere.

use super::{ProcessState, RuntimeProcessInfo};
use crate::error::{ProcessError, Result};

pub const KINFO_PROC_SIZE: usize = 648;
pub const P_STAT_OFFSET: usize = 36;
pub const P_PID_OFFSET: usize = 40;
pub const P_COMM_OFFSET: usize = 243;
pub const P_COMM_LEN: usize = 17;
pub const E_PPID_OFFSET: usize = 560;

const SIDL: u8 = 1;
const SRUN: u8 = 2;
const SSLEEP: u8 = 3;
const SSTOP: u8 = 4;
const SZOMB: u8 = 5;

/// Decode a zero-terminated name buffer
///
/// Stops at the first zero byte; a buffer without one is used whole.
pub fn c_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn read_i32_le(record: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&record[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

/// Map a BSD `p_stat` byte to a [`ProcessState`]
pub fn state_from_p_stat(stat: u8) -> ProcessState {
    match stat {
        SRUN => ProcessState::Running,
        SSLEEP => ProcessState::Sleeping,
        SSTOP => ProcessState::Stopped,
        SZOMB => ProcessState::Dead,
        SIDL => ProcessState::Unknown,
        _ => ProcessState::Unknown,
    }
}

/// Decode one `kinfo_proc` record
pub fn decode_record(record: &[u8]) -> Option<RuntimeProcessInfo> {
    if record.len() < KINFO_PROC_SIZE {
        return None;
    }

    let pid = read_i32_le(record, P_PID_OFFSET);
    let parent_pid = read_i32_le(record, E_PPID_OFFSET);

    Some(RuntimeProcessInfo {
        pid: u32::try_from(pid).ok()?,
        parent_pid: u32::try_from(parent_pid).unwrap_or(0),
        executable: c_name(&record[P_COMM_OFFSET..P_COMM_OFFSET + P_COMM_LEN]),
        state: state_from_p_stat(record[P_STAT_OFFSET]),
    })
}

/// Decode a whole `KERN_PROC_ALL` buffer
///
/// An empty buffer is a valid, empty table.
pub fn decode_records(buf: &[u8]) -> Result<Vec<RuntimeProcessInfo>> {
    if buf.len() % KINFO_PROC_SIZE != 0 {
        return Err(ProcessError::Enumeration(format!(
            "process table of {} bytes is not a whole number of {}-byte records",
            buf.len(),
            KINFO_PROC_SIZE
        )));
    }

    Ok(buf
        .chunks_exact(KINFO_PROC_SIZE)
        .filter_map(decode_record)
        .collect())
}

#[cfg(test)]
pub(crate) fn encode_record(pid: i32, ppid: i32, stat: u8, comm: &[u8]) -> Vec<u8> {
    let mut record = vec![0xAAu8; KINFO_PROC_SIZE];
    record[P_STAT_OFFSET] = stat;
    record[P_PID_OFFSET..P_PID_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
    record[E_PPID_OFFSET..E_PPID_OFFSET + 4].copy_from_slice(&ppid.to_le_bytes());
    let comm_field = &mut record[P_COMM_OFFSET..P_COMM_OFFSET + P_COMM_LEN];
    let n = comm.len().min(P_COMM_LEN);
    comm_field[..n].copy_from_slice(&comm[..n]);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_name_stops_at_first_zero() {
        assert_eq!(c_name(b"sleep\0garbage\0\0"), "sleep");
        assert_eq!(c_name(b"\0sleep"), "");
        assert_eq!(c_name(b"exactly16bytes!!"), "exactly16bytes!!");
        assert_eq!(c_name(b""), "");
    }

    #[test]
    fn test_decode_record_fields() {
        // 0xAA filler stands in for stale bytes after the terminator
        let record = encode_record(4242, 1, SRUN, b"launchd\0");
        let info = decode_record(&record).unwrap();

        assert_eq!(info.pid, 4242);
        assert_eq!(info.parent_pid, 1);
        assert_eq!(info.executable, "launchd");
        assert_eq!(info.state, ProcessState::Running);
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(state_from_p_stat(SSLEEP), ProcessState::Sleeping);
        assert_eq!(state_from_p_stat(SSTOP), ProcessState::Stopped);
        assert_eq!(state_from_p_stat(SZOMB), ProcessState::Dead);
        assert_eq!(state_from_p_stat(SIDL), ProcessState::Unknown);
        assert_eq!(state_from_p_stat(99), ProcessState::Unknown);
    }

    #[test]
    fn test_decode_records() {
        let mut buf = encode_record(1, 0, SRUN, b"init\0");
        buf.extend(encode_record(77, 1, SZOMB, b"defunct\0"));

        let procs = decode_records(&buf).unwrap();
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[1].pid, 77);
        assert_eq!(procs[1].state, ProcessState::Dead);
    }

    #[test]
    fn test_decode_empty_and_ragged() {
        assert!(decode_records(&[]).unwrap().is_empty());
        assert!(decode_records(&[0u8; KINFO_PROC_SIZE + 3]).is_err());
    }

    #[test]
    fn test_negative_pid_is_skipped() {
        let buf = encode_record(-1, 0, SRUN, b"bogus\0");
        assert!(decode_records(&buf).unwrap().is_empty());
    }
}
