//! Portable systems-programming foundation.
//!
//! This crate is a Rust rendition of a small C systems library: named
//! semaphores and shared memory (POSIX, System V and Win32 backends), a
//! shared-memory ring buffer built on top of them, BSD-style sockets with
//! blocking emulated over always-nonblocking descriptors, a dynamic-library
//! loader, an INI-file parser, and a generic singly-linked list, all
//! dispatched at compile time from a small platform-feature map.
//!
//! Every fallible operation returns [`error::Result`]; there is no panicking
//! API surface outside of tests.

#![allow(non_camel_case_types)]

mod macros;
pub(crate) use macros::{log_error, log_warn};

pub mod dl;
pub mod error;
pub mod inifile;
pub mod ipc;
pub mod list;
pub mod platform;
pub mod sema;
pub mod shm;
pub mod shmbuf;
pub mod socket;
pub mod socketaddr;

/// Common error type, re-exported at the crate root for convenience.
pub use error::Error;
/// `Result` alias used throughout this crate's public API.
pub use error::Result;

/// Re-exports of the types most programs reach for first, the way the
/// original's single `unic.h` umbrella header gathered every module's
/// public surface in one place.
pub mod prelude {
    pub use crate::dl::{Library, SymbolAddress};
    pub use crate::error::{Error, Result};
    pub use crate::inifile::{IniFile, Parameter, Section};
    pub use crate::ipc::AccessMode;
    pub use crate::list::List;
    pub use crate::sema::Semaphore;
    pub use crate::shm::{Access as ShmAccess, SharedMemory};
    pub use crate::shmbuf::ShmBuffer;
    pub use crate::socket::{Protocol, ShutdownDir, Socket, Type as SocketType};
    pub use crate::socketaddr::{Family, SocketAddr};
}
