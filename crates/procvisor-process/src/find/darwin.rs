//! `sysctl(KERN_PROC_ALL)` backed process table

// sysctl has no safe wrapper in nix
#![allow(unsafe_code)]

use std::io;
use std::ptr;

use nix::libc;

use super::layout::decode_records;
use super::RuntimeProcessInfo;
use crate::error::{ProcessError, Result};

/// The table can grow between the size probe and the read
const MAX_READ_ATTEMPTS: usize = 8;

fn read_kern_proc_all() -> Result<Vec<u8>> {
    let mut mib = [libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_ALL, 0];
    let mut last_err = io::Error::from(io::ErrorKind::Other);

    for _ in 0..MAX_READ_ATTEMPTS {
        let mut size: libc::size_t = 0;
        // SAFETY: a null old pointer asks the kernel only for the size
        let rc = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                mib.len() as libc::c_uint,
                ptr::null_mut(),
                &mut size,
                ptr::null_mut(),
                0,
            )
        };
        if rc != 0 {
            return Err(ProcessError::enumeration(
                "sysctl size probe failed",
                io::Error::last_os_error(),
            ));
        }

        size += size / 8;
        let mut buf = vec![0u8; size];
        // SAFETY: buf is `size` bytes long and outlives the call
        let rc = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                mib.len() as libc::c_uint,
                buf.as_mut_ptr().cast(),
                &mut size,
                ptr::null_mut(),
                0,
            )
        };
        if rc == 0 {
            buf.truncate(size);
            return Ok(buf);
        }

        last_err = io::Error::last_os_error();
        if last_err.raw_os_error() != Some(libc::ENOMEM) {
            break;
        }
    }

    Err(ProcessError::enumeration("sysctl read failed", last_err))
}

pub(super) fn list_all() -> Result<Vec<RuntimeProcessInfo>> {
    decode_records(&read_kern_proc_all()?)
}

pub(super) fn by_pid(pid: u32) -> Result<Option<RuntimeProcessInfo>> {
    Ok(list_all()?.into_iter().find(|p| p.pid == pid))
}
