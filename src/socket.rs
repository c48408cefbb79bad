//! BSD-style sockets with blocking emulation over an always-nonblocking
//! descriptor.
//!
//! Grounded in `original_source/src/socket.c`: every descriptor this module
//! hands out is put into non-blocking mode immediately after creation
//! (`pp_socket_set_fd_blocking`), and the user-facing `blocking` flag on
//! [`Socket`] drives an emulation layer built on top of that, rather than
//! ever toggling the kernel mode back and forth. Any call that would
//! otherwise return `EWOULDBLOCK`/`EAGAIN`/`EINPROGRESS` waits on
//! [`Socket::io_condition_wait`] for the relevant direction and retries,
//! up to `timeout_ms` (`0` = wait forever), mirroring `u_socket_io_condition_wait`.
//!
//! `EINTR` is always retried transparently, matching the original's retry
//! loops around `poll`/`select`/`send`/`recv`.

use std::mem;
use std::time::{Duration, Instant};

use crate::error::{self, Error, IoKind, Result};
use crate::socketaddr::SocketAddr;

/// Socket address family.
pub use crate::socketaddr::Family;

/// Socket type (spec.md calls this "kind" to avoid colliding with the
/// native `SOCK_*` naming, but the meaning is the same).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Stream,
    Datagram,
    /// Sequenced, reliable, message-oriented -- the SCTP association type.
    SeqPacket,
}

/// Protocol hint passed to `socket()`. `Default` lets the kernel pick based
/// on `Type` (TCP for `Stream`, UDP for `Datagram`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Default,
    Tcp,
    Udp,
    Sctp,
}

/// IANA protocol number for SCTP. Not every `libc` target defines
/// `IPPROTO_SCTP`, so it is named here directly; it is only ever used as an
/// opaque integer passed to `socket()`.
const IPPROTO_SCTP: i32 = 132;

fn native_type(t: Type) -> i32 {
    match t {
        Type::Stream => libc::SOCK_STREAM,
        Type::Datagram => libc::SOCK_DGRAM,
        Type::SeqPacket => libc::SOCK_SEQPACKET,
    }
}

fn native_protocol(p: Protocol) -> i32 {
    match p {
        Protocol::Default => 0,
        Protocol::Tcp => libc::IPPROTO_TCP,
        Protocol::Udp => libc::IPPROTO_UDP,
        Protocol::Sctp => IPPROTO_SCTP,
    }
}

fn native_family(f: Family) -> i32 {
    match f {
        Family::Inet => libc::AF_INET,
        Family::Inet6 => libc::AF_INET6,
    }
}

/// Direction a caller is waiting to become ready in
/// [`Socket::io_condition_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCondition {
    /// Readable: pending `read`/`accept`.
    PollIn,
    /// Writable: pending `write`/`connect` completion.
    PollOut,
}

/// Which half(s) of the connection [`Socket::shutdown`] should close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownDir {
    pub read: bool,
    pub write: bool,
}

/// Direction for [`Socket::set_buffer_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferDir {
    Receive,
    Send,
}

#[cfg(unix)]
type RawSocket = libc::c_int;
#[cfg(windows)]
type RawSocket = winapi::um::winsock2::SOCKET;

#[cfg(unix)]
const INVALID_SOCKET: RawSocket = -1;
#[cfg(windows)]
const INVALID_SOCKET: RawSocket = winapi::um::winsock2::INVALID_SOCKET;

/// A family/type/protocol-parameterized endpoint. The underlying OS
/// descriptor is always non-blocking; `blocking` (true by default) drives
/// whether the public API emulates blocking semantics above it.
pub struct Socket {
    fd: RawSocket,
    family: Family,
    kind: Type,
    protocol: Protocol,
    listen_backlog: i32,
    timeout_ms: u32,
    blocking: bool,
    keepalive: bool,
    closed: bool,
    connected: bool,
    listening: bool,
    #[cfg(windows)]
    event: winapi::um::winsock2::WSAEVENT,
}

unsafe impl Send for Socket {}

impl Socket {
    /// Creates a new socket. The kernel descriptor is immediately switched
    /// to non-blocking mode; `blocking` starts `true` so the public API
    /// emulates blocking by default, `listen_backlog` defaults to `5`, and
    /// `timeout_ms` defaults to `0` (wait forever).
    pub fn new(family: Family, kind: Type, protocol: Protocol) -> Result<Self> {
        #[cfg(windows)]
        ensure_wsa_started();

        let fd = create_fd(family, kind, protocol)?;
        let mut socket = Socket {
            fd,
            family,
            kind,
            protocol,
            listen_backlog: 5,
            timeout_ms: 0,
            blocking: true,
            keepalive: false,
            closed: false,
            connected: false,
            listening: false,
            #[cfg(windows)]
            event: unsafe { winapi::um::winsock2::WSACreateEvent() },
        };
        set_fd_nonblocking(socket.fd)?;
        apply_no_sigpipe(socket.fd);
        if let Err(e) = set_cloexec(socket.fd) {
            close_fd(socket.fd);
            return Err(e);
        }
        Ok(socket)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::io(IoKind::NotAvailable, 0, "socket is closed"));
        }
        Ok(())
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn kind(&self) -> Type {
        self.kind
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `true` by default: the public API waits on [`Socket::io_condition_wait`]
    /// instead of surfacing `WOULD_BLOCK`/`IN_PROGRESS` to the caller.
    pub fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Applies to subsequent blocking calls. `0` means wait indefinitely.
    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    pub fn timeout(&self) -> u32 {
        self.timeout_ms
    }

    /// Backlog used by a subsequent [`Socket::listen`]. Default `5`.
    pub fn set_listen_backlog(&mut self, backlog: i32) {
        self.listen_backlog = backlog;
    }

    /// Toggles `SO_KEEPALIVE`.
    pub fn set_keepalive(&mut self, enable: bool) -> Result<()> {
        self.check_open()?;
        let val: libc::c_int = if enable { 1 } else { 0 };
        setsockopt_int(self.fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, val)?;
        self.keepalive = enable;
        Ok(())
    }

    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    /// Writes `SO_RCVBUF`/`SO_SNDBUF`.
    pub fn set_buffer_size(&mut self, dir: BufferDir, bytes: i32) -> Result<()> {
        self.check_open()?;
        let opt = match dir {
            BufferDir::Receive => libc::SO_RCVBUF,
            BufferDir::Send => libc::SO_SNDBUF,
        };
        setsockopt_int(self.fd, libc::SOL_SOCKET, opt, bytes)
    }

    /// Applies `SO_REUSEADDR` (always, on non-Windows hosts -- Windows
    /// semantics differ enough that it is only applied there for datagram
    /// sockets) and `SO_REUSEPORT` where the host defines it (datagram
    /// only), then binds.
    pub fn bind(&mut self, addr: &SocketAddr, allow_reuse: bool) -> Result<()> {
        self.check_open()?;
        if allow_reuse {
            let apply_reuseaddr = {
                #[cfg(windows)]
                {
                    matches!(self.kind, Type::Datagram)
                }
                #[cfg(not(windows))]
                {
                    true
                }
            };
            if apply_reuseaddr {
                setsockopt_int(self.fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1)?;
            }
            #[cfg(not(windows))]
            if crate::platform::HAS_SO_REUSEPORT && matches!(self.kind, Type::Datagram) {
                let _ = setsockopt_int(self.fd, libc::SOL_SOCKET, libc::SO_REUSEPORT, 1);
            }
        }
        let mut buf = [0u8; 128];
        let native = addr.to_native(&mut buf)?;
        let ret = unsafe { raw_bind(self.fd, native) };
        if ret != 0 {
            return Err(last_io_error("bind() failed"));
        }
        Ok(())
    }

    /// Applies `listen_backlog` and marks this socket as listening.
    pub fn listen(&mut self) -> Result<()> {
        self.check_open()?;
        let ret = unsafe { raw_listen(self.fd, self.listen_backlog) };
        if ret != 0 {
            return Err(last_io_error("listen() failed"));
        }
        self.listening = true;
        Ok(())
    }

    /// Accepts one pending connection. In blocking mode, waits on
    /// [`IoCondition::PollIn`] first if none is immediately pending.
    pub fn accept(&self) -> Result<Socket> {
        self.check_open()?;
        loop {
            match unsafe { raw_accept(self.fd) } {
                Ok(new_fd) => {
                    set_fd_nonblocking(new_fd)?;
                    apply_no_sigpipe(new_fd);
                    let _ = set_cloexec(new_fd);
                    return Ok(Socket {
                        fd: new_fd,
                        family: self.family,
                        kind: self.kind,
                        protocol: self.protocol,
                        listen_backlog: 5,
                        timeout_ms: 0,
                        blocking: true,
                        keepalive: false,
                        closed: false,
                        connected: true,
                        listening: false,
                        #[cfg(windows)]
                        event: unsafe { winapi::um::winsock2::WSACreateEvent() },
                    });
                }
                Err(errno) => {
                    if errno == libc::EINTR as i32 {
                        continue;
                    }
                    if is_would_block(errno) {
                        if self.blocking {
                            self.io_condition_wait(IoCondition::PollIn)?;
                            continue;
                        }
                        return Err(Error::io(IoKind::WouldBlock, errno, "accept() would block"));
                    }
                    return Err(Error::io(error::io_kind_from_system(errno), errno, "accept() failed"));
                }
            }
        }
    }

    /// Connects to `addr`. For connectionless sockets this binds a default
    /// peer for subsequent [`Socket::send`]. In blocking mode, an
    /// `EINPROGRESS`/`EWOULDBLOCK` result waits on [`IoCondition::PollOut`]
    /// then checks the result via `SO_ERROR`.
    pub fn connect(&mut self, addr: &SocketAddr) -> Result<()> {
        self.check_open()?;
        let mut buf = [0u8; 128];
        let native = addr.to_native(&mut buf)?;
        let ret = unsafe { raw_connect(self.fd, native) };
        if ret == 0 {
            self.connected = true;
            return Ok(());
        }
        let errno = error::get_last_net();
        if errno == libc::EINPROGRESS as i32 || is_would_block(errno) {
            if self.blocking {
                self.io_condition_wait(IoCondition::PollOut)?;
                return self.check_connect_result();
            }
            return Err(Error::io(IoKind::InProgress, errno, "connect() in progress"));
        }
        Err(Error::io(error::io_kind_from_system(errno), errno, "connect() failed"))
    }

    /// Reads `SO_ERROR` to learn whether a non-blocking `connect()` that
    /// returned `EINPROGRESS` has since completed.
    pub fn check_connect_result(&mut self) -> Result<()> {
        self.check_open()?;
        let code = getsockopt_int(self.fd, libc::SOL_SOCKET, libc::SO_ERROR)?;
        if code == 0 {
            self.connected = true;
            Ok(())
        } else {
            Err(Error::io(error::io_kind_from_system(code), code, "connect() did not complete successfully"))
        }
    }

    /// The address this socket is bound to.
    pub fn local_address(&self) -> Result<SocketAddr> {
        self.check_open()?;
        let mut buf = [0u8; 128];
        let len = unsafe { raw_getsockname(self.fd, &mut buf)? };
        SocketAddr::new_from_native(&buf[..len])
    }

    /// The address of the connected peer. Only meaningful once
    /// [`Socket::is_connected`] is `true`.
    pub fn remote_address(&self) -> Result<SocketAddr> {
        self.check_open()?;
        let mut buf = [0u8; 128];
        let len = unsafe { raw_getpeername(self.fd, &mut buf)? };
        SocketAddr::new_from_native(&buf[..len])
    }

    /// Waits until `condition` is satisfied or `timeout_ms` elapses.
    /// `timeout_ms == 0` waits indefinitely. Always reports [`IoKind::TimedOut`]
    /// on expiry, never a partial/spurious success.
    pub fn io_condition_wait(&self, condition: IoCondition) -> Result<()> {
        self.check_open()?;
        io_wait(self.fd, condition, self.timeout_ms, wait_handle(self))
    }

    /// Sends on a connected socket.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        self.check_open()?;
        self.retry_io(IoCondition::PollOut, || unsafe { raw_send(self.fd, buf) })
    }

    /// Sends to `addr` on a connectionless socket.
    pub fn send_to(&self, addr: &SocketAddr, buf: &[u8]) -> Result<usize> {
        self.check_open()?;
        let mut native_buf = [0u8; 128];
        let native = addr.to_native(&mut native_buf)?;
        self.retry_io(IoCondition::PollOut, || unsafe { raw_sendto(self.fd, buf, native) })
    }

    /// Receives on a connected socket.
    pub fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        self.retry_io(IoCondition::PollIn, || unsafe { raw_recv(self.fd, buf) })
    }

    /// Receives one datagram, returning its size and sender address.
    pub fn receive_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.check_open()?;
        let mut native = [0u8; 128];
        let mut native_len = native.len() as u32;
        let n = self.retry_io(IoCondition::PollIn, || unsafe { raw_recvfrom(self.fd, buf, &mut native, &mut native_len) })?;
        let addr = SocketAddr::new_from_native(&native[..native_len as usize])?;
        Ok((n, addr))
    }

    fn retry_io(&self, dir: IoCondition, mut call: impl FnMut() -> std::result::Result<usize, i32>) -> Result<usize> {
        loop {
            match call() {
                Ok(n) => return Ok(n),
                Err(errno) => {
                    if errno == libc::EINTR as i32 {
                        continue;
                    }
                    if is_would_block(errno) {
                        if self.blocking {
                            self.io_condition_wait(dir)?;
                            continue;
                        }
                        return Err(Error::io(IoKind::WouldBlock, errno, "operation would block"));
                    }
                    return Err(Error::io(error::io_kind_from_system(errno), errno, "socket I/O failed"));
                }
            }
        }
    }

    /// Shuts down the read and/or write half. A full bidirectional
    /// shutdown clears [`Socket::is_connected`]; the socket is not
    /// [`Socket::is_closed`] until [`Socket::close`] is called.
    pub fn shutdown(&mut self, dir: ShutdownDir) -> Result<()> {
        self.check_open()?;
        let how = match (dir.read, dir.write) {
            (true, true) => libc::SHUT_RDWR,
            (true, false) => libc::SHUT_RD,
            (false, true) => libc::SHUT_WR,
            (false, false) => return Ok(()),
        };
        let ret = unsafe { raw_shutdown(self.fd, how) };
        if ret != 0 {
            return Err(last_io_error("shutdown() failed"));
        }
        if dir.read && dir.write {
            self.connected = false;
        }
        Ok(())
    }

    /// Closes the descriptor. After this, every other operation fails with
    /// [`IoKind::NotAvailable`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        close_fd(self.fd);
        self.closed = true;
        self.connected = false;
        self.listening = false;
        Ok(())
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if !self.closed {
            close_fd(self.fd);
        }
        #[cfg(windows)]
        if !self.event.is_null() {
            unsafe { winapi::um::winsock2::WSACloseEvent(self.event) };
        }
    }
}

#[cfg(windows)]
fn wait_handle(s: &Socket) -> winapi::um::winsock2::WSAEVENT {
    s.event
}
#[cfg(not(windows))]
fn wait_handle(_: &Socket) -> () {}

fn last_io_error(message: &str) -> Error {
    let native = error::get_last_net();
    Error::io(error::io_kind_from_system(native), native, message)
}

#[cfg(unix)]
fn is_would_block(errno: i32) -> bool {
    errno == libc::EWOULDBLOCK || errno == libc::EAGAIN
}
#[cfg(windows)]
fn is_would_block(errno: i32) -> bool {
    errno as u32 == winapi::shared::winerror::WSAEWOULDBLOCK
}

// ---------------------------------------------------------------------
// Unix backend: socket()/fcntl()/poll() (or select() on Darwin).
// ---------------------------------------------------------------------

#[cfg(unix)]
fn create_fd(family: Family, kind: Type, protocol: Protocol) -> Result<RawSocket> {
    let mut native_type_flags = native_type(kind);
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly"))]
    {
        native_type_flags |= libc::SOCK_CLOEXEC;
    }
    let fd = unsafe { libc::socket(native_family(family), native_type_flags, native_protocol(protocol)) };
    if fd < 0 {
        return Err(last_io_error("socket() failed"));
    }
    Ok(fd)
}

#[cfg(unix)]
fn set_fd_nonblocking(fd: RawSocket) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(last_io_error("fcntl(F_GETFL) failed"));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(last_io_error("fcntl(F_SETFL, O_NONBLOCK) failed"));
    }
    Ok(())
}

/// Sets `FD_CLOEXEC` explicitly where `SOCK_CLOEXEC` was unavailable at
/// creation time (always a no-op on hosts where it was already requested
/// atomically, harmless to repeat).
#[cfg(unix)]
fn set_cloexec(fd: RawSocket) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD, 0) };
    if flags < 0 {
        return Err(last_io_error("fcntl(F_GETFD) failed"));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(last_io_error("fcntl(F_SETFD, FD_CLOEXEC) failed"));
    }
    Ok(())
}

#[cfg(unix)]
fn apply_no_sigpipe(fd: RawSocket) {
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly"))]
    {
        let val: libc::c_int = 1;
        unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_NOSIGPIPE,
                &val as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
        }
    }
    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly")))]
    {
        let _ = fd;
    }
}

#[cfg(unix)]
unsafe fn raw_bind(fd: RawSocket, addr: &[u8]) -> i32 {
    unsafe { libc::bind(fd, addr.as_ptr() as *const libc::sockaddr, addr.len() as libc::socklen_t) }
}

#[cfg(unix)]
unsafe fn raw_listen(fd: RawSocket, backlog: i32) -> i32 {
    unsafe { libc::listen(fd, backlog) }
}

#[cfg(unix)]
unsafe fn raw_accept(fd: RawSocket) -> std::result::Result<RawSocket, i32> {
    let new_fd = unsafe { libc::accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) };
    if new_fd >= 0 {
        Ok(new_fd)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(unix)]
unsafe fn raw_connect(fd: RawSocket, addr: &[u8]) -> i32 {
    unsafe { libc::connect(fd, addr.as_ptr() as *const libc::sockaddr, addr.len() as libc::socklen_t) }
}

#[cfg(unix)]
unsafe fn raw_shutdown(fd: RawSocket, how: i32) -> i32 {
    unsafe { libc::shutdown(fd, how) }
}

#[cfg(unix)]
unsafe fn raw_getsockname(fd: RawSocket, buf: &mut [u8]) -> Result<usize> {
    let mut len = buf.len() as libc::socklen_t;
    let ret = unsafe { libc::getsockname(fd, buf.as_mut_ptr() as *mut libc::sockaddr, &mut len) };
    if ret == 0 {
        Ok(len as usize)
    } else {
        Err(last_io_error("getsockname() failed"))
    }
}

#[cfg(unix)]
unsafe fn raw_getpeername(fd: RawSocket, buf: &mut [u8]) -> Result<usize> {
    let mut len = buf.len() as libc::socklen_t;
    let ret = unsafe { libc::getpeername(fd, buf.as_mut_ptr() as *mut libc::sockaddr, &mut len) };
    if ret == 0 {
        Ok(len as usize)
    } else {
        Err(last_io_error("getpeername() failed"))
    }
}

#[cfg(target_os = "linux")]
const MSG_NOSIGNAL_FLAG: i32 = libc::MSG_NOSIGNAL;
#[cfg(all(unix, not(target_os = "linux")))]
const MSG_NOSIGNAL_FLAG: i32 = 0;

#[cfg(unix)]
unsafe fn raw_send(fd: RawSocket, buf: &[u8]) -> std::result::Result<usize, i32> {
    let ret = unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), MSG_NOSIGNAL_FLAG) };
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(unix)]
unsafe fn raw_sendto(fd: RawSocket, buf: &[u8], addr: &[u8]) -> std::result::Result<usize, i32> {
    let ret = unsafe {
        libc::sendto(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            MSG_NOSIGNAL_FLAG,
            addr.as_ptr() as *const libc::sockaddr,
            addr.len() as libc::socklen_t,
        )
    };
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(unix)]
unsafe fn raw_recv(fd: RawSocket, buf: &mut [u8]) -> std::result::Result<usize, i32> {
    let ret = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(unix)]
unsafe fn raw_recvfrom(fd: RawSocket, buf: &mut [u8], addr: &mut [u8], addr_len: &mut u32) -> std::result::Result<usize, i32> {
    let ret = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            addr.as_mut_ptr() as *mut libc::sockaddr,
            addr_len as *mut u32 as *mut libc::socklen_t,
        )
    };
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(all(unix, not(target_os = "macos"), not(target_os = "ios")))]
fn close_fd(fd: RawSocket) {
    unsafe { libc::close(fd) };
}

/// Darwin's plain `close()` can silently drop the descriptor out from under
/// a concurrent `EINTR`-interrupted call to it (the "EINTR-leak hazard"
/// `spec.md` §4.6 names); `close$NOCANCEL` is the variant that avoids it.
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn close_fd(fd: RawSocket) {
    extern "C" {
        #[link_name = "close$NOCANCEL"]
        fn close_nocancel(fd: libc::c_int) -> libc::c_int;
    }
    unsafe { close_nocancel(fd) };
}

#[cfg(unix)]
fn setsockopt_int(fd: RawSocket, level: i32, name: i32, value: i32) -> Result<()> {
    let ret = unsafe {
        libc::setsockopt(fd, level, name, &value as *const _ as *const libc::c_void, mem::size_of::<i32>() as libc::socklen_t)
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_io_error("setsockopt() failed"))
    }
}

#[cfg(unix)]
fn getsockopt_int(fd: RawSocket, level: i32, name: i32) -> Result<i32> {
    let mut value: i32 = 0;
    let mut len = mem::size_of::<i32>() as libc::socklen_t;
    let ret = unsafe { libc::getsockopt(fd, level, name, &mut value as *mut _ as *mut libc::c_void, &mut len) };
    if ret == 0 {
        Ok(value)
    } else {
        Err(last_io_error("getsockopt() failed"))
    }
}

/// `poll()`-based wait on every Unix target except Darwin, which instead
/// uses `select()` below, matching the original's `U_SOCKET_USE_POLL`
/// split.
#[cfg(all(unix, not(target_os = "macos"), not(target_os = "ios")))]
fn io_wait(fd: RawSocket, condition: IoCondition, timeout_ms: u32, _handle: ()) -> Result<()> {
    let timeout = if timeout_ms > 0 { timeout_ms as libc::c_int } else { -1 };
    let deadline = if timeout_ms > 0 { Some(Instant::now() + Duration::from_millis(timeout_ms as u64)) } else { None };
    let mut pfd = libc::pollfd {
        fd,
        events: match condition {
            IoCondition::PollIn => libc::POLLIN,
            IoCondition::PollOut => libc::POLLOUT,
        },
        revents: 0,
    };
    loop {
        let remaining = match deadline {
            Some(d) => {
                let now = Instant::now();
                if now >= d {
                    0
                } else {
                    (d - now).as_millis() as libc::c_int
                }
            }
            None => timeout,
        };
        let ret = unsafe { libc::poll(&mut pfd, 1, remaining) };
        if ret == 1 {
            return Ok(());
        } else if ret == 0 {
            return Err(Error::io(IoKind::TimedOut, 0, "timed out while waiting for socket condition"));
        }
        let errno = error::get_last_net();
        if errno == libc::EINTR {
            continue;
        }
        return Err(Error::io(error::io_kind_from_system(errno), errno, "poll() failed on socket"));
    }
}

/// `select()`-based wait for Darwin, mirroring the original's non-`poll`
/// fallback branch.
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn io_wait(fd: RawSocket, condition: IoCondition, timeout_ms: u32, _handle: ()) -> Result<()> {
    loop {
        let mut fds: libc::fd_set = unsafe { mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut fds);
            libc::FD_SET(fd, &mut fds);
        }
        let mut tv = libc::timeval { tv_sec: (timeout_ms / 1000) as _, tv_usec: ((timeout_ms % 1000) * 1000) as _ };
        let tv_ptr = if timeout_ms > 0 { &mut tv as *mut _ } else { std::ptr::null_mut() };
        let ret = unsafe {
            match condition {
                IoCondition::PollIn => libc::select(fd + 1, &mut fds, std::ptr::null_mut(), std::ptr::null_mut(), tv_ptr),
                IoCondition::PollOut => libc::select(fd + 1, std::ptr::null_mut(), &mut fds, std::ptr::null_mut(), tv_ptr),
            }
        };
        if ret == 1 {
            return Ok(());
        } else if ret == 0 {
            return Err(Error::io(IoKind::TimedOut, 0, "timed out while waiting for socket condition"));
        }
        let errno = error::get_last_net();
        if errno == libc::EINTR {
            continue;
        }
        return Err(Error::io(error::io_kind_from_system(errno), errno, "select() failed on socket"));
    }
}

// ---------------------------------------------------------------------
// Windows backend: WSASocketW / ioctlsocket / WSAEventSelect.
// ---------------------------------------------------------------------

#[cfg(windows)]
fn ensure_wsa_started() {
    use std::sync::Once;
    static START: Once = Once::new();
    START.call_once(|| unsafe {
        let mut data: winapi::um::winsock2::WSADATA = mem::zeroed();
        winapi::um::winsock2::WSAStartup(0x0202, &mut data);
    });
}

#[cfg(windows)]
fn create_fd(family: Family, kind: Type, protocol: Protocol) -> Result<RawSocket> {
    let fd = unsafe { winapi::um::winsock2::socket(native_family(family), native_type(kind), native_protocol(protocol)) };
    if fd == INVALID_SOCKET {
        return Err(last_io_error("socket() failed"));
    }
    Ok(fd)
}

#[cfg(windows)]
fn set_fd_nonblocking(fd: RawSocket) -> Result<()> {
    let mut mode: winapi::um::winsock2::u_long = 1;
    if unsafe { winapi::um::winsock2::ioctlsocket(fd, winapi::um::winsock2::FIONBIO, &mut mode) } != 0 {
        return Err(last_io_error("ioctlsocket(FIONBIO) failed"));
    }
    Ok(())
}

#[cfg(windows)]
fn set_cloexec(_fd: RawSocket) -> Result<()> {
    Ok(())
}

#[cfg(windows)]
fn apply_no_sigpipe(_fd: RawSocket) {}

#[cfg(windows)]
unsafe fn raw_bind(fd: RawSocket, addr: &[u8]) -> i32 {
    unsafe { winapi::um::winsock2::bind(fd, addr.as_ptr() as *const winapi::shared::ws2def::SOCKADDR, addr.len() as i32) }
}

#[cfg(windows)]
unsafe fn raw_listen(fd: RawSocket, backlog: i32) -> i32 {
    unsafe { winapi::um::winsock2::listen(fd, backlog) }
}

#[cfg(windows)]
unsafe fn raw_accept(fd: RawSocket) -> std::result::Result<RawSocket, i32> {
    let new_fd = unsafe { winapi::um::winsock2::accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) };
    if new_fd != INVALID_SOCKET {
        Ok(new_fd)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(windows)]
unsafe fn raw_connect(fd: RawSocket, addr: &[u8]) -> i32 {
    unsafe { winapi::um::winsock2::connect(fd, addr.as_ptr() as *const winapi::shared::ws2def::SOCKADDR, addr.len() as i32) }
}

#[cfg(windows)]
unsafe fn raw_shutdown(fd: RawSocket, how: i32) -> i32 {
    unsafe { winapi::um::winsock2::shutdown(fd, how) }
}

#[cfg(windows)]
unsafe fn raw_getsockname(fd: RawSocket, buf: &mut [u8]) -> Result<usize> {
    let mut len = buf.len() as i32;
    let ret = unsafe { winapi::um::winsock2::getsockname(fd, buf.as_mut_ptr() as *mut winapi::shared::ws2def::SOCKADDR, &mut len) };
    if ret == 0 {
        Ok(len as usize)
    } else {
        Err(last_io_error("getsockname() failed"))
    }
}

#[cfg(windows)]
unsafe fn raw_getpeername(fd: RawSocket, buf: &mut [u8]) -> Result<usize> {
    let mut len = buf.len() as i32;
    let ret = unsafe { winapi::um::winsock2::getpeername(fd, buf.as_mut_ptr() as *mut winapi::shared::ws2def::SOCKADDR, &mut len) };
    if ret == 0 {
        Ok(len as usize)
    } else {
        Err(last_io_error("getpeername() failed"))
    }
}

#[cfg(windows)]
unsafe fn raw_send(fd: RawSocket, buf: &[u8]) -> std::result::Result<usize, i32> {
    let ret = unsafe { winapi::um::winsock2::send(fd, buf.as_ptr() as *const i8, buf.len() as i32, 0) };
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(windows)]
unsafe fn raw_sendto(fd: RawSocket, buf: &[u8], addr: &[u8]) -> std::result::Result<usize, i32> {
    let ret = unsafe {
        winapi::um::winsock2::sendto(
            fd,
            buf.as_ptr() as *const i8,
            buf.len() as i32,
            0,
            addr.as_ptr() as *const winapi::shared::ws2def::SOCKADDR,
            addr.len() as i32,
        )
    };
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(windows)]
unsafe fn raw_recv(fd: RawSocket, buf: &mut [u8]) -> std::result::Result<usize, i32> {
    let ret = unsafe { winapi::um::winsock2::recv(fd, buf.as_mut_ptr() as *mut i8, buf.len() as i32, 0) };
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(windows)]
unsafe fn raw_recvfrom(fd: RawSocket, buf: &mut [u8], addr: &mut [u8], addr_len: &mut u32) -> std::result::Result<usize, i32> {
    let mut len = addr_len.clone() as i32;
    let ret = unsafe {
        winapi::um::winsock2::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut i8,
            buf.len() as i32,
            0,
            addr.as_mut_ptr() as *mut winapi::shared::ws2def::SOCKADDR,
            &mut len,
        )
    };
    *addr_len = len as u32;
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(error::get_last_net())
    }
}

#[cfg(windows)]
fn close_fd(fd: RawSocket) {
    unsafe { winapi::um::winsock2::closesocket(fd) };
}

#[cfg(windows)]
fn setsockopt_int(fd: RawSocket, level: i32, name: i32, value: i32) -> Result<()> {
    let ret = unsafe {
        winapi::um::winsock2::setsockopt(fd, level, name, &value as *const _ as *const i8, mem::size_of::<i32>() as i32)
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_io_error("setsockopt() failed"))
    }
}

#[cfg(windows)]
fn getsockopt_int(fd: RawSocket, level: i32, name: i32) -> Result<i32> {
    let mut value: i32 = 0;
    let mut len = mem::size_of::<i32>() as i32;
    let ret = unsafe { winapi::um::winsock2::getsockopt(fd, level, name, &mut value as *mut _ as *mut i8, &mut len) };
    if ret == 0 {
        Ok(value)
    } else {
        Err(last_io_error("getsockopt() failed"))
    }
}

/// `WSAEventSelect`/`WSAWaitForMultipleEvents`-based wait, matching the
/// original's Windows branch of `u_socket_io_condition_wait`.
#[cfg(windows)]
fn io_wait(fd: RawSocket, condition: IoCondition, timeout_ms: u32, handle: winapi::um::winsock2::WSAEVENT) -> Result<()> {
    use winapi::um::winsock2::*;
    let network_events = match condition {
        IoCondition::PollIn => FD_READ | FD_ACCEPT,
        IoCondition::PollOut => FD_WRITE | FD_CONNECT,
    };
    let timeout = if timeout_ms > 0 { timeout_ms } else { WSA_INFINITE };
    unsafe {
        WSAResetEvent(handle);
        WSAEventSelect(fd, handle, network_events as i32);
    }
    let ret = unsafe { WSAWaitForMultipleEvents(1, &handle, winapi::shared::minwindef::TRUE, timeout, winapi::shared::minwindef::FALSE) };
    if ret == WSA_WAIT_EVENT_0 {
        Ok(())
    } else if ret == WSA_WAIT_TIMEOUT {
        Err(Error::io(IoKind::TimedOut, 0, "timed out while waiting for socket condition"))
    } else {
        let native = error::get_last_net();
        Err(Error::io(error::io_kind_from_system(native), native, "WSAWaitForMultipleEvents() failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socketaddr::Family;

    #[test]
    fn udp_loopback_send_receive() {
        let mut receiver = Socket::new(Family::Inet, Type::Datagram, Protocol::Udp).unwrap();
        let bind_addr = SocketAddr::new_loopback(Family::Inet, 0);
        receiver.bind(&bind_addr, true).unwrap();
        let bound = receiver.local_address().unwrap();

        let sender = Socket::new(Family::Inet, Type::Datagram, Protocol::Udp).unwrap();
        let target = SocketAddr::new("127.0.0.1", bound.port()).unwrap();
        let payload = b"This is a socket test data!\0";
        sender.send_to(&target, payload).unwrap();

        let mut buf = [0u8; 64];
        let (n, _from) = receiver.receive_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], payload);
    }

    #[test]
    fn fresh_socket_is_not_connected_or_listening() {
        let s = Socket::new(Family::Inet, Type::Stream, Protocol::Tcp).unwrap();
        assert!(!s.is_connected());
        assert!(!s.is_listening());
        assert!(!s.is_closed());
    }

    #[test]
    fn close_then_operate_fails_not_available() {
        let mut s = Socket::new(Family::Inet, Type::Stream, Protocol::Tcp).unwrap();
        s.close().unwrap();
        assert!(s.is_closed());
        let err = s.listen().unwrap_err();
        assert_eq!(err.code(), crate::error::IoKind::NotAvailable as i32);
    }
}
