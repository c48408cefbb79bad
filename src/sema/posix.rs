//! POSIX named semaphore backend (`sem_open()` family).
//!
//! Grounded in the original library's `sema-posix.c`: the object name is
//! suffixed with `_p_sem_object` before key derivation (so a semaphore and a
//! shared-memory segment created from the same caller-chosen name never
//! collide on the same platform key), created with `O_CREAT | O_EXCL`, and
//! on `EEXIST` either unlinked-and-recreated (when the caller asked to
//! [`AccessMode::Create`]) or simply reopened.

use std::ffi::CString;

use crate::error::{Error, IpcKind, Result};
use crate::ipc::{key, AccessMode};

const SUFFIX: &str = "_p_sem_object";

pub struct Semaphore {
    handle: *mut libc::sem_t,
    name: CString,
    created: bool,
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub fn new(name: &str, init_val: u32, mode: AccessMode) -> Result<Self> {
        let platform_key = key::derive(&format!("{name}{SUFFIX}"), true);
        let c_name = CString::new(platform_key)
            .map_err(|_| Error::ipc(IpcKind::InvalidArgument, 0, "semaphore name contains a NUL byte"))?;

        let mut created = false;
        let mut handle = loop {
            let h = unsafe {
                libc::sem_open(
                    c_name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL,
                    0o660,
                    init_val as libc::c_uint,
                )
            };
            if h != libc::SEM_FAILED {
                created = true;
                break h;
            }
            if crate::error::get_last_system() != libc::EINTR {
                break h;
            }
        };

        if handle == libc::SEM_FAILED && crate::error::get_last_system() == libc::EEXIST {
            if matches!(mode, AccessMode::Create) {
                unsafe { libc::sem_unlink(c_name.as_ptr()) };
            }
            handle = loop {
                let h = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
                if h != libc::SEM_FAILED || crate::error::get_last_system() != libc::EINTR {
                    break h;
                }
            };
        }

        if handle == libc::SEM_FAILED {
            return Err(Error::ipc_last_system("sem_open() failed to create semaphore"));
        }

        Ok(Semaphore { handle, name: c_name, created })
    }

    /// Marks this process as the semaphore's owner: [`Drop`] will
    /// `sem_unlink()` it even if this handle attached to an
    /// already-existing semaphore rather than creating it.
    pub fn take_ownership(&mut self) {
        self.created = true;
    }

    pub fn acquire(&self) -> Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.handle) } == 0 {
                return Ok(());
            }
            if crate::error::get_last_system() != libc::EINTR {
                return Err(Error::ipc_last_system("sem_wait() failed"));
            }
        }
    }

    pub fn try_acquire(&self) -> Result<bool> {
        loop {
            if unsafe { libc::sem_trywait(self.handle) } == 0 {
                return Ok(true);
            }
            let errno = crate::error::get_last_system();
            if errno == libc::EINTR {
                continue;
            }
            if errno == libc::EAGAIN {
                return Ok(false);
            }
            return Err(Error::ipc_last_system("sem_trywait() failed"));
        }
    }

    pub fn release(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.handle) } == 0 {
            Ok(())
        } else {
            Err(Error::ipc_last_system("sem_post() failed"))
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { libc::sem_close(self.handle) };
        }
        if self.created {
            unsafe { libc::sem_unlink(self.name.as_ptr()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_existing_attaches_rather_than_fails() {
        let name = format!("unisys-test-posix-open-{}", std::process::id());
        let first = Semaphore::new(&name, 1, AccessMode::CreateOrOpen).unwrap();
        let second = Semaphore::new(&name, 0, AccessMode::Open).unwrap();
        first.release().unwrap();
        assert!(second.try_acquire().unwrap());
    }
}
