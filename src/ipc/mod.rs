//! Shared IPC plumbing: platform key derivation and object-lifetime modes.

pub mod key;

/// Whether a named IPC primitive's constructor should create the
/// underlying object or attach to one that must already exist.
///
/// Mirrors the original library's distinction between `U_IPC_ACCESS_CREATE`
/// semantics threaded implicitly through `u_sema_new`/`u_shm_new` and the
/// explicit "open if it exists" path traced out by
/// `pp_sema_create_handle`/`pp_shm_create_handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Create the object; fail if this process also needs to know whether
    /// it pre-existed, use [`AccessMode::CreateOrOpen`].
    Create,
    /// Create the object if absent, otherwise attach to the existing one.
    CreateOrOpen,
    /// Attach to an object that must already exist.
    Open,
}
