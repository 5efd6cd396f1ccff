//! Process table queries: listing versus by-pid lookups, record decoding

use procvisor_process::find::layout::{
    c_name, decode_records, E_PPID_OFFSET, KINFO_PROC_SIZE, P_COMM_LEN, P_COMM_OFFSET,
    P_PID_OFFSET, P_STAT_OFFSET,
};
use procvisor_process::{all_processes, process_by_pid, ProcessError, ProcessState};
use proptest::prelude::*;

fn record(pid: i32, ppid: i32, stat: u8, comm: &[u8], filler: u8) -> Vec<u8> {
    let mut buf = vec![filler; KINFO_PROC_SIZE];
    buf[P_STAT_OFFSET] = stat;
    buf[P_PID_OFFSET..P_PID_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
    buf[E_PPID_OFFSET..E_PPID_OFFSET + 4].copy_from_slice(&ppid.to_le_bytes());
    buf[P_COMM_OFFSET..P_COMM_OFFSET + P_COMM_LEN].copy_from_slice(comm);
    buf
}

#[test]
fn test_listing_agrees_with_lookup() {
    let listing = all_processes().unwrap();
    assert!(!listing.is_empty());

    let mut compared = 0;
    for listed in &listing {
        // Processes come and go between the two queries
        let Ok(found) = process_by_pid(listed.pid) else {
            continue;
        };
        assert_eq!(found.pid, listed.pid);
        if found.executable == listed.executable && found.parent_pid == listed.parent_pid {
            compared += 1;
        }
    }

    // The bulk of a process table is stable over a few milliseconds
    assert!(compared * 2 >= listing.len());
}

#[test]
fn test_own_process_matches_exactly() {
    let me = std::process::id();
    let listed = all_processes()
        .unwrap()
        .into_iter()
        .find(|p| p.pid == me)
        .expect("own pid listed");
    let found = process_by_pid(me).unwrap();

    // State may flip between running and sleeping across the two queries
    assert_eq!(found.pid, listed.pid);
    assert_eq!(found.parent_pid, listed.parent_pid);
    assert_eq!(found.executable, listed.executable);
    assert!(found.state.is_alive());
}

#[cfg(unix)]
#[test]
fn test_zombie_is_present_and_dead() {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();

    // Not reaped yet: it must stay visible, as a zombie, once it exits
    let mut state = ProcessState::Running;
    for _ in 0..500 {
        state = process_by_pid(pid).unwrap().state;
        if state == ProcessState::Dead {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(state, ProcessState::Dead);
    assert!(all_processes().unwrap().iter().any(|p| p.pid == pid));

    child.wait().unwrap();
    assert!(matches!(
        process_by_pid(pid),
        Err(ProcessError::NotFound { .. })
    ));
}

#[test]
fn test_decode_table_of_records() {
    let mut comm = [0u8; P_COMM_LEN];
    comm[..5].copy_from_slice(b"sleep");
    comm[6..9].copy_from_slice(b"old");

    let mut table = record(300, 1, 3, &comm, 0x55);
    table.extend(record(301, 300, 2, &[b'x'; P_COMM_LEN], 0x00));

    let procs = decode_records(&table).unwrap();
    assert_eq!(procs.len(), 2);
    assert_eq!(procs[0].executable, "sleep");
    assert_eq!(procs[0].state, ProcessState::Sleeping);
    assert_eq!(procs[1].executable, "x".repeat(P_COMM_LEN));
    assert_eq!(procs[1].parent_pid, 300);
}

proptest! {
    #[test]
    fn prop_c_name_stops_at_first_zero(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let name = c_name(&bytes);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());

        prop_assert!(!name.contains('\0'));
        prop_assert_eq!(name, String::from_utf8_lossy(&bytes[..end]).into_owned());
    }

    #[test]
    fn prop_ascii_names_survive_garbage_tail(
        name in "[a-z0-9_.-]{0,16}",
        garbage in prop::collection::vec(any::<u8>(), P_COMM_LEN),
        pid in 1i32..i32::MAX,
        ppid in 0i32..i32::MAX,
    ) {
        let mut comm = garbage;
        comm[..name.len()].copy_from_slice(name.as_bytes());
        comm[name.len()] = 0;

        let procs = decode_records(&record(pid, ppid, 2, &comm, 0xEE)).unwrap();
        prop_assert_eq!(procs.len(), 1);
        prop_assert_eq!(&procs[0].executable, &name);
        prop_assert_eq!(procs[0].pid, pid as u32);
        prop_assert_eq!(procs[0].parent_pid, ppid as u32);
    }
}
