//! Error report system.
//!
//! Every fallible call in this crate returns `Result<T, Error>`. An [`Error`]
//! carries a domain-tagged [`Kind`], the native error code that produced it
//! (`errno`, `GetLastError`, ...), and a short human-readable message that is
//! always English and never localized.
//!
//! Errors are partitioned into two domains: I/O ([`IoKind`]) and IPC
//! ([`IpcKind`]). The domain is derived from the numeric range of the
//! underlying code, not stored separately, mirroring the original C
//! library's `err_domain_t` split at 500 and 600.

use std::fmt;

/// Error domain, derived from an error code's numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// No domain could be determined for the code.
    None,
    /// Input/output domain (socket, file, generic OS failures).
    Io,
    /// Interprocess communication domain (semaphores, shared memory).
    Ipc,
}

/// I/O domain error kinds.
///
/// Discriminants intentionally match the original library's `500..=522`
/// numbering so `Error::code()` reproduces the same wire-visible values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum IoKind {
    None = 500,
    NoResources = 501,
    NotAvailable = 502,
    AccessDenied = 503,
    Connected = 504,
    InProgress = 505,
    Aborted = 506,
    InvalidArgument = 507,
    NotSupported = 508,
    TimedOut = 509,
    WouldBlock = 510,
    AddressInUse = 511,
    ConnectionRefused = 512,
    NotConnected = 513,
    Quota = 514,
    IsDirectory = 515,
    NotDirectory = 516,
    NameTooLong = 517,
    Exists = 518,
    NotExists = 519,
    NoMore = 520,
    NotImplemented = 521,
    Failed = 522,
}

/// IPC domain error kinds.
///
/// Discriminants match the original's `600..=610` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum IpcKind {
    None = 600,
    Access = 601,
    Exists = 602,
    NotExists = 603,
    NoResources = 604,
    Overflow = 605,
    NameTooLong = 606,
    InvalidArgument = 607,
    NotImplemented = 608,
    Deadlock = 609,
    Failed = 610,
}

/// A reported failure: domain-tagged kind, native code, and message.
///
/// `Error` owns its message exclusively; cloning an `Error` clones the
/// string. Construction happens at the failure site, ownership transfers to
/// the caller via `Result::Err`, and it is dropped like any other value --
/// there is no separate free call, unlike the C original's `u_err_free`.
#[derive(Debug, Clone)]
pub struct Error {
    code: i32,
    native_code: i32,
    message: String,
}

impl Error {
    /// Builds an error from an already-known domain code.
    pub fn new(code: i32, native_code: i32, message: impl Into<String>) -> Self {
        Error { code, native_code, message: message.into() }
    }

    /// Builds an I/O-domain error.
    pub fn io(kind: IoKind, native_code: i32, message: impl Into<String>) -> Self {
        Error::new(kind as i32, native_code, message)
    }

    /// Builds an IPC-domain error.
    pub fn ipc(kind: IpcKind, native_code: i32, message: impl Into<String>) -> Self {
        Error::new(kind as i32, native_code, message)
    }

    /// Builds an I/O-domain error from the current platform's last system
    /// error code, translating it to a [`IoKind`] first.
    pub fn io_last_system(message: impl Into<String>) -> Self {
        let native = get_last_system();
        Error::io(io_kind_from_system(native), native, message)
    }

    /// Builds an IPC-domain error from the current platform's last system
    /// error code, translating it to a [`IpcKind`] first.
    pub fn ipc_last_system(message: impl Into<String>) -> Self {
        let native = get_last_system();
        Error::ipc(ipc_kind_from_system(native), native, message)
    }

    /// The raw numeric code (500-522 for I/O, 600-610 for IPC).
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The platform-native code that produced this error, if any. A value of
    /// `0` means no native code was involved (e.g. an internal invariant
    /// check failed before any system call was made).
    pub fn native_code(&self) -> i32 {
        self.native_code
    }

    /// The human-readable message. Always English, never localized.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The domain this error's code falls into.
    pub fn domain(&self) -> Domain {
        match self.code {
            500..=599 => Domain::Io,
            600..=699 => Domain::Ipc,
            _ => Domain::None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.native_code != 0 {
            write!(f, "{} (code {}, native {})", self.message, self.code, self.native_code)
        } else {
            write!(f, "{} (code {})", self.message, self.code)
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Gets the last system native error code for the calling thread
/// (`errno` on Unix, `GetLastError()` on Windows).
pub fn get_last_system() -> i32 {
    #[cfg(windows)]
    {
        unsafe { winapi::um::errhandlingapi::GetLastError() as i32 }
    }
    #[cfg(not(windows))]
    {
        errno::errno().0
    }
}

/// Sets the last system native error code for the calling thread.
pub fn set_last_system(code: i32) {
    #[cfg(windows)]
    {
        unsafe { winapi::um::errhandlingapi::SetLastError(code as u32) }
    }
    #[cfg(not(windows))]
    {
        errno::set_errno(errno::Errno(code));
    }
}

/// Formats the calling thread's last `GetLastError()` code via
/// `FormatMessageA`, for backends (the dynamic-library loader) that don't
/// have their own native string API on this platform. Returns `None` if
/// there is no message text available.
#[cfg(windows)]
pub fn format_last_system_message() -> Option<String> {
    use std::ptr;
    use winapi::um::winbase::{
        FormatMessageA, FORMAT_MESSAGE_ALLOCATE_BUFFER, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
    };

    let code = get_last_system() as u32;
    let mut buf: *mut i8 = ptr::null_mut();
    let len = unsafe {
        FormatMessageA(
            FORMAT_MESSAGE_ALLOCATE_BUFFER | FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            ptr::null(),
            code,
            0,
            &mut buf as *mut *mut i8 as *mut i8,
            0,
            ptr::null_mut(),
        )
    };
    if len == 0 || buf.is_null() {
        return None;
    }
    let message = unsafe { std::ffi::CStr::from_ptr(buf) }.to_string_lossy().into_owned();
    unsafe { winapi::um::winbase::LocalFree(buf as *mut winapi::ctypes::c_void) };
    Some(message.trim_end().to_string())
}

/// Gets the last network-related native error code. Diverges from
/// [`get_last_system`] only on Windows, where socket errors are stashed in a
/// separate `WSAGetLastError()` register.
pub fn get_last_net() -> i32 {
    #[cfg(windows)]
    {
        unsafe { winapi::um::winsock2::WSAGetLastError() }
    }
    #[cfg(not(windows))]
    {
        get_last_system()
    }
}

/// Sets the last network-related native error code.
pub fn set_last_net(code: i32) {
    #[cfg(windows)]
    {
        unsafe { winapi::um::winsock2::WSASetLastError(code) }
    }
    #[cfg(not(windows))]
    {
        set_last_system(code);
    }
}

/// Translates a native error code into an [`IoKind`].
///
/// This is a large, mostly mechanical match table conditionally compiled on
/// host, mirroring the original library's `u_err_get_io_from_system`.
/// Unknown codes collapse to [`IoKind::Failed`].
#[cfg(not(windows))]
pub fn io_kind_from_system(code: i32) -> IoKind {
    use libc::*;
    match code {
        0 => IoKind::None,
        libc::EACCES | libc::EPERM => IoKind::AccessDenied,
        libc::EADDRINUSE => IoKind::AddressInUse,
        libc::ECONNREFUSED => IoKind::ConnectionRefused,
        libc::EISCONN => IoKind::Connected,
        libc::ENOTCONN => IoKind::NotConnected,
        libc::ECONNABORTED | libc::ECONNRESET => IoKind::Aborted,
        libc::EINPROGRESS | libc::EALREADY => IoKind::InProgress,
        libc::EINVAL | libc::EBADF | libc::ENOTSOCK | libc::EFAULT => IoKind::InvalidArgument,
        libc::EOPNOTSUPP | libc::EPROTONOSUPPORT | libc::EAFNOSUPPORT | libc::EPFNOSUPPORT
        | libc::ESOCKTNOSUPPORT => IoKind::NotSupported,
        libc::ETIMEDOUT => IoKind::TimedOut,
        EAGAIN => IoKind::WouldBlock,
        libc::EDQUOT => IoKind::Quota,
        libc::EISDIR => IoKind::IsDirectory,
        libc::ENOTDIR => IoKind::NotDirectory,
        libc::ENAMETOOLONG => IoKind::NameTooLong,
        libc::EEXIST => IoKind::Exists,
        libc::ENOENT => IoKind::NotExists,
        libc::ENOSYS => IoKind::NotImplemented,
        libc::ENETUNREACH | libc::ENETDOWN | libc::EHOSTDOWN | libc::EHOSTUNREACH
        | libc::EADDRNOTAVAIL => IoKind::NotAvailable,
        libc::ENOMEM | libc::ENOBUFS => IoKind::NoResources,
        _ => IoKind::Failed,
    }
}

/// Translates a native error code into an [`IoKind`] (Windows / Winsock
/// variant).
#[cfg(windows)]
pub fn io_kind_from_system(code: i32) -> IoKind {
    use winapi::shared::winerror::*;
    let code = code as u32;
    match code {
        0 => IoKind::None,
        WSAEADDRINUSE => IoKind::AddressInUse,
        WSAEWOULDBLOCK => IoKind::WouldBlock,
        WSAEACCES => IoKind::AccessDenied,
        WSA_INVALID_HANDLE | WSA_INVALID_PARAMETER | WSAEBADF | WSAENOTSOCK | WSAEINVAL => {
            IoKind::InvalidArgument
        }
        WSAESOCKTNOSUPPORT | WSAEOPNOTSUPP | WSAEPFNOSUPPORT | WSAEAFNOSUPPORT
        | WSAEPROTONOSUPPORT => IoKind::NotSupported,
        WSAECANCELLED => IoKind::Aborted,
        ERROR_ALREADY_EXISTS => IoKind::Exists,
        ERROR_FILE_NOT_FOUND => IoKind::NotExists,
        ERROR_NO_MORE_FILES => IoKind::NoMore,
        ERROR_ACCESS_DENIED => IoKind::AccessDenied,
        ERROR_OUTOFMEMORY | ERROR_NOT_ENOUGH_MEMORY => IoKind::NoResources,
        WSAEADDRNOTAVAIL | WSAENETUNREACH | WSAENETDOWN | WSAEHOSTDOWN | WSAEHOSTUNREACH => {
            IoKind::NotAvailable
        }
        WSAEINPROGRESS | WSAEALREADY => IoKind::InProgress,
        WSAEISCONN => IoKind::Connected,
        WSAECONNREFUSED => IoKind::ConnectionRefused,
        WSAENOTCONN => IoKind::NotConnected,
        WSAECONNABORTED | WSAECONNRESET => IoKind::Aborted,
        WSAETIMEDOUT => IoKind::TimedOut,
        ERROR_DISK_QUOTA_EXCEEDED => IoKind::Quota,
        ERROR_DIRECTORY => IoKind::NotDirectory,
        ERROR_FILENAME_EXCED_RANGE => IoKind::NameTooLong,
        ERROR_CALL_NOT_IMPLEMENTED => IoKind::NotImplemented,
        _ => IoKind::Failed,
    }
}

/// Translates a native error code into an [`IpcKind`].
#[cfg(not(windows))]
pub fn ipc_kind_from_system(code: i32) -> IpcKind {
    match code {
        0 => IpcKind::None,
        libc::EEXIST => IpcKind::Exists,
        libc::ENOENT | libc::EIDRM => IpcKind::NotExists,
        libc::ENOMEM | libc::ENOSPC => IpcKind::NoResources,
        libc::EACCES | libc::EPERM => IpcKind::Access,
        libc::E2BIG | libc::EOVERFLOW => IpcKind::Overflow,
        libc::ENAMETOOLONG => IpcKind::NameTooLong,
        libc::EINVAL => IpcKind::InvalidArgument,
        libc::ENOSYS => IpcKind::NotImplemented,
        libc::EDEADLK => IpcKind::Deadlock,
        _ => IpcKind::Failed,
    }
}

/// Translates a native error code into an [`IpcKind`] (Windows variant).
#[cfg(windows)]
pub fn ipc_kind_from_system(code: i32) -> IpcKind {
    use winapi::shared::winerror::*;
    let code = code as u32;
    match code {
        0 => IpcKind::None,
        ERROR_ALREADY_EXISTS => IpcKind::Exists,
        ERROR_SEM_OWNER_DIED | ERROR_SEM_NOT_FOUND | ERROR_FILE_NOT_FOUND => IpcKind::NotExists,
        ERROR_SEM_USER_LIMIT | ERROR_TOO_MANY_SEMAPHORES | ERROR_TOO_MANY_SEM_REQUESTS
        | ERROR_TOO_MANY_POSTS | ERROR_OUTOFMEMORY | ERROR_NOT_ENOUGH_MEMORY => {
            IpcKind::NoResources
        }
        ERROR_ACCESS_DENIED | ERROR_EXCL_SEM_ALREADY_OWNED => IpcKind::Access,
        ERROR_INVALID_PARAMETER | ERROR_INVALID_HANDLE => IpcKind::InvalidArgument,
        ERROR_CALL_NOT_IMPLEMENTED => IpcKind::NotImplemented,
        _ => IpcKind::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_ranges() {
        let io = Error::io(IoKind::NotExists, 2, "missing");
        assert_eq!(io.domain(), Domain::Io);
        assert_eq!(io.code(), 519);

        let ipc = Error::ipc(IpcKind::Exists, 17, "already there");
        assert_eq!(ipc.domain(), Domain::Ipc);
        assert_eq!(ipc.code(), 602);
    }

    #[test]
    fn unknown_code_collapses_to_failed() {
        assert_eq!(io_kind_from_system(i32::MAX), IoKind::Failed);
        assert_eq!(ipc_kind_from_system(i32::MAX), IpcKind::Failed);
    }

    #[test]
    fn display_includes_native_code_when_present() {
        let e = Error::io(IoKind::TimedOut, 110, "timed out");
        let s = e.to_string();
        assert!(s.contains("timed out"));
        assert!(s.contains("110"));
    }
}
