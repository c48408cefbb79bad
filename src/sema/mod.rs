//! Named semaphores.
//!
//! A [`Semaphore`] is a counting semaphore identified by name rather than by
//! a handle inherited from a parent process, so unrelated processes can
//! rendezvous on it. Three backends exist on top of the platform's native
//! primitive:
//!
//! - [`posix`]: POSIX `sem_open()` family. Simple, but on most systems a
//!   semaphore whose owning process dies without calling `sem_unlink()`
//!   survives as an orphaned kernel object.
//! - [`sysv`]: System V `semget()`/`semop()` family, the original teacher's
//!   only backend. Needs an on-disk key file for `ftok()`, and recreates
//!   itself on `EIDRM`/`EINVAL` the way the original's `u_sema_acquire`
//!   does.
//! - [`windows`]: Win32 `CreateSemaphoreW`/`ReleaseSemaphore`.
//!
//! Unix picks a default backend at compile time via the `posix-sema` /
//! `sysv-sema` Cargo features (`posix-sema` is the default); both backends
//! are always compiled on Unix so [`Semaphore::with_posix`] and
//! [`Semaphore::with_sysv`] can select either one explicitly, which the
//! integration tests use to exercise both.

#[cfg(unix)]
pub mod posix;
#[cfg(unix)]
pub mod sysv;
#[cfg(windows)]
pub mod windows;

use crate::error::Result;
use crate::ipc::AccessMode;

#[cfg(unix)]
enum Inner {
    Posix(posix::Semaphore),
    SysV(sysv::Semaphore),
}

#[cfg(windows)]
enum Inner {
    Windows(windows::Semaphore),
}

/// A named counting semaphore, portable across POSIX, System V, and Win32
/// backends.
pub struct Semaphore {
    inner: Inner,
}

impl Semaphore {
    /// Opens or creates a named semaphore with `name`, an initial count of
    /// `init_val`, under `mode`. On Unix the backend compiled as default
    /// (`posix-sema` unless `sysv-sema` is selected) is used; to pick a
    /// specific backend use [`Semaphore::with_posix`] or
    /// [`Semaphore::with_sysv`].
    pub fn new(name: &str, init_val: u32, mode: AccessMode) -> Result<Self> {
        #[cfg(all(unix, feature = "posix-sema"))]
        {
            Self::with_posix(name, init_val, mode)
        }
        #[cfg(all(unix, not(feature = "posix-sema"), feature = "sysv-sema"))]
        {
            Self::with_sysv(name, init_val, mode)
        }
        #[cfg(windows)]
        {
            Ok(Semaphore { inner: Inner::Windows(windows::Semaphore::new(name, init_val, mode)?) })
        }
    }

    /// Opens or creates a named semaphore using the POSIX `sem_open()`
    /// backend explicitly.
    #[cfg(unix)]
    pub fn with_posix(name: &str, init_val: u32, mode: AccessMode) -> Result<Self> {
        Ok(Semaphore { inner: Inner::Posix(posix::Semaphore::new(name, init_val, mode)?) })
    }

    /// Opens or creates a named semaphore using the System V `semget()`
    /// backend explicitly.
    #[cfg(unix)]
    pub fn with_sysv(name: &str, init_val: u32, mode: AccessMode) -> Result<Self> {
        Ok(Semaphore { inner: Inner::SysV(sysv::Semaphore::new(name, init_val, mode)?) })
    }

    /// Marks this process as the owner: the underlying object will be
    /// removed, not just closed, when this `Semaphore` is dropped. Use
    /// after opening with [`AccessMode::Open`] semantics when this
    /// process should still be the one responsible for cleanup, mirroring
    /// [`crate::shm::SharedMemory::take_ownership`].
    pub fn take_ownership(&mut self) {
        match &mut self.inner {
            #[cfg(unix)]
            Inner::Posix(s) => s.take_ownership(),
            #[cfg(unix)]
            Inner::SysV(s) => s.take_ownership(),
            #[cfg(windows)]
            Inner::Windows(s) => s.take_ownership(),
        }
    }

    /// Blocks until the semaphore's count is positive, then decrements it.
    pub fn acquire(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            Inner::Posix(s) => s.acquire(),
            #[cfg(unix)]
            Inner::SysV(s) => s.acquire(),
            #[cfg(windows)]
            Inner::Windows(s) => s.acquire(),
        }
    }

    /// Decrements the count without blocking. Returns `Ok(false)` instead of
    /// blocking if the count is currently zero.
    pub fn try_acquire(&self) -> Result<bool> {
        match &self.inner {
            #[cfg(unix)]
            Inner::Posix(s) => s.try_acquire(),
            #[cfg(unix)]
            Inner::SysV(s) => s.try_acquire(),
            #[cfg(windows)]
            Inner::Windows(s) => s.try_acquire(),
        }
    }

    /// Increments the count, waking one waiter if any is blocked in
    /// [`Semaphore::acquire`].
    pub fn release(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            Inner::Posix(s) => s.release(),
            #[cfg(unix)]
            Inner::SysV(s) => s.release(),
            #[cfg(windows)]
            Inner::Windows(s) => s.release(),
        }
    }

    /// Runs `f` while holding the semaphore, releasing it (even on panic via
    /// an RAII guard) before returning.
    pub fn access<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        self.acquire()?;
        let _guard = Guard { sem: self };
        Ok(f())
    }
}

/// Releases its semaphore when dropped. Used internally by
/// [`Semaphore::access`] to guarantee release on panic.
struct Guard<'a> {
    sem: &'a Semaphore,
}

impl<'a> Drop for Guard<'a> {
    fn drop(&mut self) {
        let _ = self.sem.release();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn posix_acquire_release_roundtrip() {
        let name = format!("unisys-test-sema-{}", std::process::id());
        let sem = Semaphore::with_posix(&name, 1, AccessMode::CreateOrOpen).unwrap();
        sem.acquire().unwrap();
        assert!(!sem.try_acquire().unwrap());
        sem.release().unwrap();
        assert!(sem.try_acquire().unwrap());
    }

    #[test]
    fn sysv_acquire_release_roundtrip() {
        let name = format!("unisys-test-sema-sysv-{}", std::process::id());
        let sem = Semaphore::with_sysv(&name, 1, AccessMode::CreateOrOpen).unwrap();
        sem.acquire().unwrap();
        assert!(!sem.try_acquire().unwrap());
        sem.release().unwrap();
        assert!(sem.try_acquire().unwrap());
    }

    #[test]
    fn access_releases_on_normal_return() {
        let name = format!("unisys-test-sema-access-{}", std::process::id());
        let sem = Semaphore::with_posix(&name, 1, AccessMode::CreateOrOpen).unwrap();
        let result = sem.access(|| 42).unwrap();
        assert_eq!(result, 42);
        assert!(sem.try_acquire().unwrap());
    }
}
