//! Platform key derivation.
//!
//! Every named IPC primitive (semaphore, shared memory segment) is looked
//! up by a human-chosen `name`, but the underlying platform object needs a
//! name in a form the kernel accepts: Windows global objects want a short
//! `Local\`/`Global\` string, POSIX named semaphores cap out at roughly 14
//! usable characters, and System V `ftok()` wants an on-disk path. All
//! three are derived the same way the original library does it: hash the
//! caller's name with SHA-1 and reshape the hex digest to fit each
//! backend's constraints.
//!
//! Hashing instead of using the name directly also means arbitrarily long
//! or binary-unsafe names are always reduced to a fixed, filesystem- and
//! API-safe form.

#[cfg(target_env = "musl")]
use std::env;
use std::path::PathBuf;

use sha1::{Digest, Sha1};

/// `P_tmpdir`, as declared in glibc's (and most other libcs') `<stdio.h>`.
/// musl does not define this macro, so on musl targets the constant is
/// treated as absent and `TMPDIR` takes over, mirroring
/// `u_ipc_unix_get_temp_dir`'s `#ifdef P_tmpdir` guard.
#[cfg(not(target_env = "musl"))]
const P_TMPDIR: &str = "/tmp";

/// Directory System V key files live under, mirroring the original's
/// `u_ipc_unix_get_temp_dir`: `P_tmpdir` first if the libc defines it,
/// else `TMPDIR`, else `/tmp`.
pub fn unix_temp_dir() -> PathBuf {
    #[cfg(not(target_env = "musl"))]
    {
        return PathBuf::from(P_TMPDIR);
    }
    #[cfg(target_env = "musl")]
    {
        match env::var_os("TMPDIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from("/tmp"),
        }
    }
}

/// Hex-encoded SHA-1 digest of `name`, lowercase, same alphabet the
/// original's `u_crypto_hash_get_string` produces.
fn hex_digest(name: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Derives the platform key for `name`.
///
/// On Windows this is the raw hex digest, used directly as (part of) a
/// `Global\` object name. On Unix, when `posix` is true the result is a
/// `/`-prefixed name truncated to 14 characters total, fit for
/// `sem_open`/`shm_open`; when `posix` is false the result is a path
/// under the system temp directory, fit for use as a System V `ftok()`
/// key file.
pub fn derive(name: &str, posix: bool) -> String {
    let hash = hex_digest(name);

    #[cfg(any(target_os = "windows", target_os = "os2"))]
    {
        let _ = posix;
        hash
    }

    #[cfg(not(any(target_os = "windows", target_os = "os2")))]
    {
        if posix {
            let mut key = String::with_capacity(14);
            key.push('/');
            key.push_str(&hash[..13.min(hash.len())]);
            key
        } else {
            unix_temp_dir().join(&hash).to_string_lossy().into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_key() {
        assert_eq!(derive("my-object", true), derive("my-object", true));
    }

    #[test]
    fn different_names_different_keys() {
        assert_ne!(derive("object-a", true), derive("object-b", true));
    }

    #[cfg(not(any(target_os = "windows", target_os = "os2")))]
    #[test]
    fn posix_key_is_short_and_slash_prefixed() {
        let key = derive("a-fairly-long-object-name-for-testing", true);
        assert!(key.starts_with('/'));
        assert!(key.len() <= 14);
    }

    #[cfg(not(any(target_os = "windows", target_os = "os2")))]
    #[test]
    fn sysv_key_lives_under_temp_dir() {
        let key = derive("some-object", false);
        assert!(PathBuf::from(&key).starts_with(unix_temp_dir()));
    }
}
