//! Named shared memory segments.
//!
//! A [`SharedMemory`] segment is identified by name, like [`crate::sema`],
//! and comes with its own companion [`Semaphore`](crate::sema::Semaphore)
//! (keyed off the same platform key) so callers get a ready-made
//! lock/unlock pair around the mapped region instead of having to create
//! one themselves -- the same pairing `u_shm_lock`/`u_shm_unlock` delegate
//! to `u_sema_acquire`/`u_sema_release` for in the original.
//!
//! Backends: [`posix`] (`shm_open` + `mmap`, via the `memmap2` crate),
//! [`sysv`] (`shmget`/`shmat`), [`windows`] (`CreateFileMappingW` +
//! `MapViewOfFile`). Unix defaults to the POSIX backend; System V is
//! available for parity with the original's IRIX/Tru64 branch, which this
//! crate exposes as [`SharedMemory::with_sysv`] rather than a separate
//! Cargo feature since shared memory (unlike semaphores) isn't expected to
//! need a global default switch.

#[cfg(unix)]
pub mod posix;
#[cfg(unix)]
pub mod sysv;
#[cfg(windows)]
pub mod windows;

use crate::error::Result;
use crate::ipc::AccessMode;
use crate::sema::Semaphore;

/// Access permissions requested for a mapped segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[cfg(unix)]
enum Inner {
    Posix(posix::SharedMemory),
    SysV(sysv::SharedMemory),
}

#[cfg(windows)]
enum Inner {
    Windows(windows::SharedMemory),
}

/// A named shared memory segment with a companion lock.
pub struct SharedMemory {
    inner: Inner,
    sem: Semaphore,
}

impl SharedMemory {
    /// Opens or creates a segment named `name` of at least `size` bytes.
    /// `size` is ignored if a segment with this name already exists; the
    /// existing segment's size is reported by [`SharedMemory::size`]
    /// instead, matching `u_shm_new`.
    pub fn new(name: &str, size: usize, perms: Access) -> Result<Self> {
        #[cfg(unix)]
        {
            Self::with_posix(name, size, perms)
        }
        #[cfg(windows)]
        {
            let (inner, sem) = windows::SharedMemory::new(name, size, perms)?;
            Ok(SharedMemory { inner: Inner::Windows(inner), sem })
        }
    }

    #[cfg(unix)]
    pub fn with_posix(name: &str, size: usize, perms: Access) -> Result<Self> {
        let (inner, sem) = posix::SharedMemory::new(name, size, perms)?;
        Ok(SharedMemory { inner: Inner::Posix(inner), sem })
    }

    #[cfg(unix)]
    pub fn with_sysv(name: &str, size: usize, perms: Access) -> Result<Self> {
        let (inner, sem) = sysv::SharedMemory::new(name, size, perms)?;
        Ok(SharedMemory { inner: Inner::SysV(inner), sem })
    }

    /// Marks this process as the owner: the underlying object (and its
    /// companion semaphore) will be removed, not just detached, when this
    /// `SharedMemory` is dropped. Use after attaching with [`AccessMode::Open`]
    /// semantics when this process should still be the one responsible for
    /// cleanup, mirroring `u_shm_take_ownership`.
    pub fn take_ownership(&mut self) {
        match &mut self.inner {
            #[cfg(unix)]
            Inner::Posix(s) => s.take_ownership(),
            #[cfg(unix)]
            Inner::SysV(s) => s.take_ownership(),
            #[cfg(windows)]
            Inner::Windows(s) => s.take_ownership(),
        }
        self.sem.take_ownership();
    }

    /// Acquires the companion lock.
    pub fn lock(&self) -> Result<()> {
        self.sem.acquire()
    }

    /// Releases the companion lock.
    pub fn unlock(&self) -> Result<()> {
        self.sem.release()
    }

    /// The mapped region. Valid for the lifetime of this `SharedMemory`.
    pub fn as_slice(&self) -> &[u8] {
        match &self.inner {
            #[cfg(unix)]
            Inner::Posix(s) => s.as_slice(),
            #[cfg(unix)]
            Inner::SysV(s) => s.as_slice(),
            #[cfg(windows)]
            Inner::Windows(s) => s.as_slice(),
        }
    }

    /// The mapped region, mutably. Callers sharing this segment with other
    /// processes are responsible for serializing access, e.g. via
    /// [`SharedMemory::lock`]/[`SharedMemory::unlock`].
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.inner {
            #[cfg(unix)]
            Inner::Posix(s) => s.as_mut_slice(),
            #[cfg(unix)]
            Inner::SysV(s) => s.as_mut_slice(),
            #[cfg(windows)]
            Inner::Windows(s) => s.as_mut_slice(),
        }
    }

    /// Size of the mapped region in bytes.
    pub fn size(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether this call created the underlying segment, as opposed to
    /// attaching to one that already existed.
    pub fn was_created(&self) -> bool {
        match &self.inner {
            #[cfg(unix)]
            Inner::Posix(s) => s.was_created(),
            #[cfg(unix)]
            Inner::SysV(s) => s.was_created(),
            #[cfg(windows)]
            Inner::Windows(s) => s.was_created(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn new_segment_is_readwrite_by_default_size() {
        let name = format!("unisys-test-shm-{}", std::process::id());
        let mut shm = SharedMemory::new(&name, 4096, Access::ReadWrite).unwrap();
        assert_eq!(shm.size(), 4096);
        shm.as_mut_slice()[0] = 7;
        assert_eq!(shm.as_slice()[0], 7);
    }

    #[test]
    fn lock_unlock_roundtrip() {
        let name = format!("unisys-test-shm-lock-{}", std::process::id());
        let shm = SharedMemory::new(&name, 64, Access::ReadWrite).unwrap();
        shm.lock().unwrap();
        shm.unlock().unwrap();
    }
}
