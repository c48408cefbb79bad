//! Shared memory ring buffer.
//!
//! A cyclic, non-overriding buffer built on top of [`SharedMemory`],
//! grounded in `shmbuf.h`'s doc comments (no implementation of this module
//! survived in the filtered original source, only the header and its
//! test). The buffer is process-wide and named like any other IPC
//! primitive here; all read/write operations take the segment's companion
//! lock, so no additional synchronization is required even across
//! processes.
//!
//! Reads never block past an empty buffer (they return `0` bytes read, not
//! an error) and writes never partially succeed: a write either fits
//! entirely in the current free space or writes nothing at all and returns
//! `0`, exactly the all-or-nothing contract `u_shmbuf_write` documents.

use crate::error::Result;
use crate::shm::{Access, SharedMemory};

/// `[capacity: u32][used: u32][read_pos: u32][write_pos: u32]`, all in
/// native byte order since the header never crosses a process boundary
/// running under a different endianness in practice.
const HEADER_LEN: usize = 16;

pub struct ShmBuffer {
    shm: SharedMemory,
    capacity: usize,
}

impl ShmBuffer {
    /// Opens or creates a named ring buffer with `capacity` usable bytes.
    /// As with [`SharedMemory::new`], `capacity` is ignored if a buffer
    /// with this name already exists.
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        let mut shm = SharedMemory::new(name, capacity + HEADER_LEN, Access::ReadWrite)?;
        let actual_capacity = shm.size() - HEADER_LEN;
        if shm.was_created() {
            shm.as_mut_slice()[..HEADER_LEN].fill(0);
            write_header(&mut shm, actual_capacity as u32, 0, 0, 0);
        }
        Ok(ShmBuffer { shm, capacity: actual_capacity })
    }

    /// Marks this process as the buffer's owner, same as
    /// [`SharedMemory::take_ownership`].
    pub fn take_ownership(&mut self) {
        self.shm.take_ownership();
    }

    /// Reads up to `storage.len()` bytes. Returns the number actually read,
    /// `0` if the buffer is currently empty.
    pub fn read(&mut self, storage: &mut [u8]) -> Result<usize> {
        self.shm.lock()?;
        let (capacity, used, read_pos, write_pos) = read_header(&self.shm);
        let _ = (capacity, write_pos);
        let amount = storage.len().min(used as usize);
        if amount > 0 {
            copy_from_ring(&self.shm, self.capacity, read_pos as usize, &mut storage[..amount]);
            let new_read_pos = (read_pos as usize + amount) % self.capacity;
            write_header(&mut self.shm, self.capacity as u32, used - amount as u32, new_read_pos as u32, write_pos);
        }
        self.shm.unlock()?;
        Ok(amount)
    }

    /// Writes `data` only if the buffer currently has room for all of it.
    /// Returns the number of bytes written: either `data.len()` or `0`.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.shm.lock()?;
        let (capacity, used, read_pos, write_pos) = read_header(&self.shm);
        let _ = (capacity, read_pos);
        let free = self.capacity - used as usize;
        if data.len() > free {
            self.shm.unlock()?;
            return Ok(0);
        }
        if !data.is_empty() {
            copy_into_ring(&mut self.shm, self.capacity, write_pos as usize, data);
            let new_write_pos = (write_pos as usize + data.len()) % self.capacity;
            write_header(
                &mut self.shm,
                self.capacity as u32,
                used + data.len() as u32,
                read_pos,
                new_write_pos as u32,
            );
        }
        self.shm.unlock()?;
        Ok(data.len())
    }

    /// Free space in bytes, i.e. how much can be [`ShmBuffer::write`]ten
    /// right now without the call returning `0`.
    pub fn free_space(&self) -> Result<usize> {
        self.shm.lock()?;
        let (_, used, _, _) = read_header(&self.shm);
        self.shm.unlock()?;
        Ok(self.capacity - used as usize)
    }

    /// Used space in bytes, i.e. how much [`ShmBuffer::read`] can return
    /// right now.
    pub fn used_space(&self) -> Result<usize> {
        self.shm.lock()?;
        let (_, used, _, _) = read_header(&self.shm);
        self.shm.unlock()?;
        Ok(used as usize)
    }

    /// Discards all buffered data without reading it.
    pub fn clear(&mut self) -> Result<()> {
        self.shm.lock()?;
        write_header(&mut self.shm, self.capacity as u32, 0, 0, 0);
        self.shm.unlock()
    }
}

fn read_header(shm: &SharedMemory) -> (u32, u32, u32, u32) {
    let bytes = shm.as_slice();
    (
        u32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
        u32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
        u32::from_ne_bytes(bytes[8..12].try_into().unwrap()),
        u32::from_ne_bytes(bytes[12..16].try_into().unwrap()),
    )
}

fn write_header(shm: &mut SharedMemory, capacity: u32, used: u32, read_pos: u32, write_pos: u32) {
    let bytes = shm.as_mut_slice();
    bytes[0..4].copy_from_slice(&capacity.to_ne_bytes());
    bytes[4..8].copy_from_slice(&used.to_ne_bytes());
    bytes[8..12].copy_from_slice(&read_pos.to_ne_bytes());
    bytes[12..16].copy_from_slice(&write_pos.to_ne_bytes());
}

fn copy_from_ring(shm: &SharedMemory, capacity: usize, start: usize, dst: &mut [u8]) {
    let data = &shm.as_slice()[HEADER_LEN..HEADER_LEN + capacity];
    let first = (capacity - start).min(dst.len());
    dst[..first].copy_from_slice(&data[start..start + first]);
    if first < dst.len() {
        dst[first..].copy_from_slice(&data[..dst.len() - first]);
    }
}

fn copy_into_ring(shm: &mut SharedMemory, capacity: usize, start: usize, src: &[u8]) {
    let data = &mut shm.as_mut_slice()[HEADER_LEN..HEADER_LEN + capacity];
    let first = (capacity - start).min(src.len());
    data[start..start + first].copy_from_slice(&src[..first]);
    if first < src.len() {
        data[..src.len() - first].copy_from_slice(&src[first..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_reports_full_free_space() {
        let name = format!("unisys-test-shmbuf-{}", std::process::id());
        let buf = ShmBuffer::new(&name, 1024).unwrap();
        assert_eq!(buf.free_space().unwrap(), 1024);
        assert_eq!(buf.used_space().unwrap(), 0);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let name = format!("unisys-test-shmbuf-rw-{}", std::process::id());
        let mut buf = ShmBuffer::new(&name, 1024).unwrap();
        let msg = b"This is a test string!";
        assert_eq!(buf.write(msg).unwrap(), msg.len());
        assert_eq!(buf.free_space().unwrap(), 1024 - msg.len());
        assert_eq!(buf.used_space().unwrap(), msg.len());

        let mut storage = vec![0u8; msg.len()];
        assert_eq!(buf.read(&mut storage).unwrap(), msg.len());
        assert_eq!(&storage, msg);
        assert_eq!(buf.read(&mut storage).unwrap(), 0);
        assert_eq!(buf.free_space().unwrap(), 1024);
    }

    #[test]
    fn oversized_write_is_rejected_wholesale() {
        let name = format!("unisys-test-shmbuf-big-{}", std::process::id());
        let mut buf = ShmBuffer::new(&name, 1024).unwrap();
        let big = vec![1u8; 2048];
        assert_eq!(buf.write(&big).unwrap(), 0);
        assert_eq!(buf.used_space().unwrap(), 0);
    }

    #[test]
    fn clear_resets_counters() {
        let name = format!("unisys-test-shmbuf-clear-{}", std::process::id());
        let mut buf = ShmBuffer::new(&name, 128).unwrap();
        buf.write(b"hello").unwrap();
        buf.clear().unwrap();
        assert_eq!(buf.used_space().unwrap(), 0);
        assert_eq!(buf.free_space().unwrap(), 128);
    }

    #[test]
    fn wraps_around_ring_boundary() {
        let name = format!("unisys-test-shmbuf-wrap-{}", std::process::id());
        let mut buf = ShmBuffer::new(&name, 16).unwrap();
        assert_eq!(buf.write(&[1; 12]).unwrap(), 12);
        let mut drain = [0u8; 12];
        assert_eq!(buf.read(&mut drain).unwrap(), 12);
        assert_eq!(buf.write(&[2; 10]).unwrap(), 10);
        let mut out = [0u8; 10];
        assert_eq!(buf.read(&mut out).unwrap(), 10);
        assert_eq!(out, [2; 10]);
    }
}
