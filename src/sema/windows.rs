//! Win32 named semaphore backend (`CreateSemaphoreW`/`ReleaseSemaphore`).
//!
//! Ported from the teacher crate's `windows.rs`, generalized to accept an
//! [`AccessMode`] and to report failures as [`Error`] instead of panicking.

use std::ptr;

use winapi::um::handleapi::CloseHandle;
use winapi::um::synchapi::{CreateSemaphoreW, OpenSemaphoreW, ReleaseSemaphore, WaitForSingleObject};
use winapi::um::winbase::{WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT};
use winapi::um::winnt::{HANDLE, SEMAPHORE_ALL_ACCESS};

use crate::error::{Error, IpcKind, Result};
use crate::ipc::{key, AccessMode};

pub struct Semaphore {
    handle: HANDLE,
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub fn new(name: &str, init_val: u32, mode: AccessMode) -> Result<Self> {
        let platform_key = key::derive(name, false);
        let object_name = format!(r"Global\{platform_key}");
        let mut wide: Vec<u16> = object_name.encode_utf16().collect();
        wide.push(0);

        let handle = match mode {
            AccessMode::Open => unsafe { OpenSemaphoreW(SEMAPHORE_ALL_ACCESS, 0, wide.as_ptr()) },
            AccessMode::Create | AccessMode::CreateOrOpen => unsafe {
                CreateSemaphoreW(ptr::null_mut(), init_val as i32, i32::MAX, wide.as_ptr())
            },
        };

        if handle.is_null() {
            return Err(Error::ipc_last_system("failed to open named semaphore"));
        }
        Ok(Semaphore { handle })
    }

    /// No-op: Win32 kernel semaphores are reference-counted by the OS and
    /// are removed automatically once every handle to them closes, so
    /// there is no separate ownership transfer to perform.
    pub fn take_ownership(&mut self) {}

    pub fn acquire(&self) -> Result<()> {
        match unsafe { WaitForSingleObject(self.handle, winapi::um::winbase::INFINITE) } {
            WAIT_OBJECT_0 => Ok(()),
            WAIT_FAILED => Err(Error::ipc_last_system("WaitForSingleObject() failed")),
            n => Err(Error::ipc(IpcKind::Failed, n as i32, "unexpected WaitForSingleObject() result")),
        }
    }

    pub fn try_acquire(&self) -> Result<bool> {
        match unsafe { WaitForSingleObject(self.handle, 0) } {
            WAIT_OBJECT_0 => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            WAIT_FAILED => Err(Error::ipc_last_system("WaitForSingleObject() failed")),
            n => Err(Error::ipc(IpcKind::Failed, n as i32, "unexpected WaitForSingleObject() result")),
        }
    }

    pub fn release(&self) -> Result<()> {
        let ok = unsafe { ReleaseSemaphore(self.handle, 1, ptr::null_mut()) };
        if ok == 0 {
            Err(Error::ipc_last_system("ReleaseSemaphore() failed"))
        } else {
            Ok(())
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
