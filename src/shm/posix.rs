//! POSIX shared memory backend (`shm_open()` + `mmap()`, via `memmap2`).
//!
//! Grounded in `shm-posix.c`: the segment name gets the `_p_shm_object`
//! suffix before key derivation (so it never collides with a semaphore
//! created from the same caller name), `shm_open(O_CREAT | O_EXCL)` decides
//! who creates versus attaches, and an attaching process discovers the
//! segment's real size via `fstat` rather than trusting the `size` it
//! passed in.
//!
//! [`Access::ReadOnly`] is advisory in this safe wrapper, same as in the
//! original: the underlying `mmap()` is always requested read-write so a
//! single `MmapMut` can back both [`SharedMemory::as_slice`] and
//! [`SharedMemory::as_mut_slice`], and callers that asked for read-only are
//! expected not to call the latter, exactly as C callers are expected to
//! respect `shm_access_t` without the type system enforcing it.

use std::ffi::CString;
use std::fs::File;
use std::os::unix::io::FromRawFd;

use memmap2::MmapMut;

use super::Access;
use crate::error::{Error, IpcKind, Result};
use crate::ipc::{key, AccessMode};
use crate::sema::Semaphore;

const SUFFIX: &str = "_p_shm_object";

pub struct SharedMemory {
    map: MmapMut,
    name: CString,
    created: bool,
}

impl SharedMemory {
    pub fn new(name: &str, size: usize, _perms: Access) -> Result<(Self, Semaphore)> {
        let platform_key = key::derive(&format!("{name}{SUFFIX}"), true);
        let c_name = CString::new(platform_key.clone())
            .map_err(|_| Error::ipc(IpcKind::InvalidArgument, 0, "segment name contains a NUL byte"))?;

        let mut created = false;
        let mut fd = loop {
            let f = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, 0o660) };
            if f != -1 || crate::error::get_last_system() != libc::EINTR {
                break f;
            }
        };

        let mut actual_size = size;
        if fd == -1 && crate::error::get_last_system() == libc::EEXIST {
            fd = loop {
                let f = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o660) };
                if f != -1 || crate::error::get_last_system() != libc::EINTR {
                    break f;
                }
            };
            if fd == -1 {
                return Err(Error::ipc_last_system("shm_open() failed to attach to existing segment"));
            }
            let mut stat: libc::stat = unsafe { std::mem::zeroed() };
            if unsafe { libc::fstat(fd, &mut stat) } == -1 {
                let err = Error::ipc_last_system("fstat() failed on shared memory segment");
                unsafe { libc::close(fd) };
                return Err(err);
            }
            actual_size = stat.st_size as usize;
        } else if fd == -1 {
            return Err(Error::ipc_last_system("shm_open() failed to create memory segment"));
        } else {
            created = true;
            if unsafe { libc::ftruncate(fd, actual_size as libc::off_t) } == -1 {
                let err = Error::ipc_last_system("ftruncate() failed on shared memory segment");
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(err);
            }
        }

        // SAFETY: `fd` is a just-opened, uniquely owned descriptor; `File`
        // takes ownership and will close it on drop.
        let file = unsafe { File::from_raw_fd(fd) };
        let map = unsafe { memmap2::MmapOptions::new().len(actual_size).map_mut(&file) }.map_err(|e| {
            unsafe {
                if created {
                    libc::shm_unlink(c_name.as_ptr());
                }
            }
            Error::ipc(IpcKind::Failed, e.raw_os_error().unwrap_or(0), "mmap() failed on shared memory segment")
        })?;

        let sem_mode = if created { AccessMode::Create } else { AccessMode::Open };
        let sem = Semaphore::new(&platform_key, 1, sem_mode)?;

        Ok((SharedMemory { map, name: c_name, created }, sem))
    }

    pub fn take_ownership(&mut self) {
        self.created = true;
    }

    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        if self.created && unsafe { libc::shm_unlink(self.name.as_ptr()) } != 0 {
            crate::log_error!("shm_unlink() failed while dropping owned shared memory segment: {}", crate::error::get_last_system());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_reports_creator_size() {
        let name = format!("unisys-test-posixshm-{}", std::process::id());
        let (_first, _sem1) = SharedMemory::new(&name, 256, Access::ReadWrite).unwrap();
        let (second, _sem2) = SharedMemory::new(&name, 99999, Access::ReadWrite).unwrap();
        assert_eq!(second.as_slice().len(), 256);
    }
}
