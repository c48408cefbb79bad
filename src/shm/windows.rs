//! Win32 shared memory backend (`CreateFileMappingW` + `MapViewOfFile`).
//!
//! Win32 file mappings fold create-vs-attach into a single call:
//! `CreateFileMappingW` succeeds either way and signals which case it was
//! via `GetLastError() == ERROR_ALREADY_EXISTS` after the fact, rather than
//! an up-front `O_EXCL`-style flag -- this backend follows `shm-win.c`'s
//! `pp_shm_create_handle` exactly on that point.

use std::ptr;
use std::slice;

use winapi::shared::minwindef::DWORD;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::memoryapi::{CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP_ALL_ACCESS, FILE_MAP_READ};
use winapi::um::winbase::VirtualQuery;
use winapi::um::winnt::{HANDLE, MEMORY_BASIC_INFORMATION, PAGE_READONLY, PAGE_READWRITE};
use winapi::shared::winerror::ERROR_ALREADY_EXISTS;

use super::Access;
use crate::error::{Error, Result};
use crate::ipc::{key, AccessMode};
use crate::sema::Semaphore;

pub struct SharedMemory {
    handle: HANDLE,
    addr: *mut u8,
    size: usize,
    created: bool,
}

unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    pub fn new(name: &str, size: usize, perms: Access) -> Result<(Self, Semaphore)> {
        let platform_key = key::derive(name, false);
        let mut wide: Vec<u16> = platform_key.encode_utf16().collect();
        wide.push(0);

        let protect = if perms == Access::ReadOnly { PAGE_READONLY } else { PAGE_READWRITE };
        let handle = unsafe {
            CreateFileMappingW(INVALID_HANDLE_VALUE, ptr::null_mut(), protect, 0, size as DWORD, wide.as_ptr())
        };
        if handle.is_null() {
            return Err(Error::ipc_last_system("CreateFileMappingW() failed"));
        }

        let is_exists = unsafe { GetLastError() } == ERROR_ALREADY_EXISTS;
        let map_access = if protect == PAGE_READONLY { FILE_MAP_READ } else { FILE_MAP_ALL_ACCESS };
        let addr = unsafe { MapViewOfFile(handle, map_access, 0, 0, 0) };
        if addr.is_null() {
            let err = Error::ipc_last_system("MapViewOfFile() failed");
            unsafe { CloseHandle(handle) };
            return Err(err);
        }

        let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
        let queried = unsafe { VirtualQuery(addr, &mut info, std::mem::size_of::<MEMORY_BASIC_INFORMATION>()) };
        if queried == 0 {
            let err = Error::ipc_last_system("VirtualQuery() failed");
            unsafe {
                UnmapViewOfFile(addr);
                CloseHandle(handle);
            }
            return Err(err);
        }

        let sem_mode = if is_exists { AccessMode::Open } else { AccessMode::Create };
        let sem = Semaphore::new(&platform_key, 1, sem_mode)?;

        Ok((SharedMemory { handle, addr: addr as *mut u8, size: info.RegionSize, created: !is_exists }, sem))
    }

    pub fn take_ownership(&mut self) {
        // Win32 file mappings have no separate "owner unlinks on drop"
        // concept: the kernel object lives as long as any handle is open
        // and is reclaimed automatically once the last one closes.
        // `u_shm_take_ownership` is a documented no-op on this backend for
        // the same reason.
    }

    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.addr, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.addr, self.size) }
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        unsafe {
            UnmapViewOfFile(self.addr as *mut winapi::ctypes::c_void);
            CloseHandle(self.handle);
        }
    }
}
