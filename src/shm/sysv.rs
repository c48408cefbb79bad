//! System V shared memory backend (`shmget()`/`shmat()`).
//!
//! Grounded in `shm-sysv.c`. As with [`super::posix`], [`super::Access`] is
//! advisory: the original requests `SHM_RDONLY` at `shmat()` time for
//! read-only segments, but since nothing else in this crate's safe API
//! distinguishes a read-only view, we always attach read-write and leave
//! respecting `Access::ReadOnly` to the caller.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::slice;

use super::Access;
use crate::error::{Error, IpcKind, Result};
use crate::ipc::{key, AccessMode};
use crate::sema::Semaphore;

pub struct SharedMemory {
    shmid: libc::c_int,
    addr: *mut libc::c_void,
    size: usize,
    key_file: PathBuf,
    file_created: bool,
    segment_created: bool,
}

unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    pub fn new(name: &str, size: usize, _perms: Access) -> Result<(Self, Semaphore)> {
        let key_file = PathBuf::from(key::derive(&format!("{name}_p_shm_object"), false));

        let mut file_created = false;
        match OpenOptions::new().create_new(true).read(true).mode(0o640).open(&key_file) {
            Ok(_) => file_created = true,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(Error::ipc(
                    IpcKind::NoResources,
                    e.raw_os_error().unwrap_or(0),
                    "failed to create System V key file",
                ))
            }
        }

        let path = CString::new(key_file.to_string_lossy().into_owned())
            .map_err(|_| Error::ipc(IpcKind::InvalidArgument, 0, "key file path contains a NUL byte"))?;
        let unix_key = unsafe { libc::ftok(path.as_ptr(), b'P' as libc::c_int) };
        if unix_key == -1 {
            if file_created {
                let _ = std::fs::remove_file(&key_file);
            }
            return Err(Error::ipc_last_system("ftok() failed"));
        }

        let mut shmid = unsafe { libc::shmget(unix_key, size, libc::IPC_CREAT | libc::IPC_EXCL | 0o660) };
        let mut segment_size = size;
        let is_exists = shmid == -1 && crate::error::get_last_system() == libc::EEXIST;
        if is_exists {
            shmid = unsafe { libc::shmget(unix_key, 0, 0o660) };
        }
        if shmid == -1 {
            if file_created {
                let _ = std::fs::remove_file(&key_file);
            }
            return Err(Error::ipc_last_system("shmget() failed"));
        }

        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(shmid, libc::IPC_STAT, &mut stat) } == -1 {
            let err = Error::ipc_last_system("shmctl(IPC_STAT) failed");
            if file_created {
                let _ = std::fs::remove_file(&key_file);
            }
            return Err(err);
        }
        segment_size = stat.shm_segsz as usize;

        let addr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
        if addr == usize::MAX as *mut libc::c_void {
            let err = Error::ipc_last_system("shmat() failed");
            if file_created {
                let _ = std::fs::remove_file(&key_file);
            }
            return Err(err);
        }

        let sem_mode = if is_exists { AccessMode::Open } else { AccessMode::Create };
        let sem = Semaphore::new(&key_file.to_string_lossy(), 1, sem_mode)?;

        Ok((
            SharedMemory {
                shmid,
                addr,
                size: segment_size,
                key_file,
                file_created,
                segment_created: !is_exists,
            },
            sem,
        ))
    }

    pub fn take_ownership(&mut self) {
        self.file_created = true;
    }

    pub fn was_created(&self) -> bool {
        self.segment_created
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.addr as *const u8, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.addr as *mut u8, self.size) }
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        unsafe { libc::shmdt(self.addr) };
        if self.file_created {
            let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
            let still_attached =
                unsafe { libc::shmctl(self.shmid, libc::IPC_STAT, &mut stat) } == 0 && stat.shm_nattch > 0;
            if !still_attached {
                unsafe { libc::shmctl(self.shmid, libc::IPC_RMID, std::ptr::null_mut()) };
            }
            let _ = std::fs::remove_file(&self.key_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_readwrite() {
        let name = format!("unisys-test-sysvshm-{}", std::process::id());
        let (mut shm, _sem) = SharedMemory::new(&name, 128, Access::ReadWrite).unwrap();
        shm.as_mut_slice()[0] = 9;
        assert_eq!(shm.as_slice()[0], 9);
    }
}
