//! A cursor over an instance's linear memory.
//!
//! Every access is bounds-checked against the memory's current size and
//! fails with [`KernelError::MemoryOutOfBounds`] rather than panicking.

use numkern_types::abi::PAGE_SIZE;
use numkern_types::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};
use wasmi::{Memory, Store};

use crate::bridge::HostState;

/// Declared and current memory sizes, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub min: u64,
    pub max: Option<u64>,
    pub current: u64,
}

/// Declared memory limits, in pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLimits {
    pub min_pages: u64,
    pub max_pages: Option<u64>,
}

impl MemoryLimits {
    /// Declared minimum in bytes, saturating at `u64::MAX`.
    pub fn min_bytes(&self) -> u64 {
        self.min_pages.saturating_mul(PAGE_SIZE)
    }

    pub fn max_bytes(&self) -> Option<u64> {
        self.max_pages.map(|p| p.saturating_mul(PAGE_SIZE))
    }
}

/// Stream access to linear memory.
///
/// The cursor lives in the store, so it survives between borrows of the
/// stream.
pub struct WasmMemory<'a> {
    store: &'a mut Store<HostState>,
    memory: Memory,
    limits: MemoryLimits,
}

impl<'a> WasmMemory<'a> {
    pub(crate) fn new(store: &'a mut Store<HostState>, memory: Memory, limits: MemoryLimits) -> Self {
        Self {
            store,
            memory,
            limits,
        }
    }

    /// Current size in bytes.
    pub fn len(&self) -> u64 {
        self.memory.data(&*self.store).len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inspect(&self) -> MemoryInfo {
        MemoryInfo {
            min: self.limits.min_bytes(),
            max: self.limits.max_bytes(),
            current: self.len(),
        }
    }

    pub fn position(&self) -> u64 {
        self.store.data().memory_position
    }

    /// Move the cursor.  Seeking to the end is allowed.
    pub fn seek(&mut self, position: u64) -> KernelResult<()> {
        let size = self.len();
        if position > size {
            return Err(KernelError::MemoryOutOfBounds {
                offset: position,
                len: 0,
                size,
            });
        }
        self.store.data_mut().memory_position = position;
        Ok(())
    }

    /// Read `len` bytes at the cursor and advance it.
    pub fn get_data(&mut self, len: usize) -> KernelResult<Vec<u8>> {
        let position = self.position();
        let data = self.memory.data(&*self.store);
        let range = checked_range(position, len, data.len())?;
        let buf = data[range].to_vec();
        self.store.data_mut().memory_position = position + len as u64;
        Ok(buf)
    }

    /// Write `bytes` at the cursor and advance it.
    pub fn put_data(&mut self, bytes: &[u8]) -> KernelResult<()> {
        let position = self.position();
        self.write(position, bytes)?;
        self.store.data_mut().memory_position = position + bytes.len() as u64;
        Ok(())
    }

    /// Random-access read; the cursor does not move.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> KernelResult<()> {
        let data = self.memory.data(&*self.store);
        let range = checked_range(offset, buf.len(), data.len())?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    /// Random-access write; the cursor does not move.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> KernelResult<()> {
        let data = self.memory.data_mut(&mut *self.store);
        let range = checked_range(offset, bytes.len(), data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Read a little-endian `i64` at `offset`.
    pub fn read_i64(&self, offset: u64) -> KernelResult<i64> {
        let mut word = [0u8; 8];
        self.read(offset, &mut word)?;
        Ok(i64::from_le_bytes(word))
    }

    /// Write a little-endian `i64` at `offset`.
    pub fn write_i64(&mut self, offset: u64, value: i64) -> KernelResult<()> {
        self.write(offset, &value.to_le_bytes())
    }
}

fn checked_range(offset: u64, len: usize, size: usize) -> KernelResult<std::ops::Range<usize>> {
    let out_of_bounds = || KernelError::MemoryOutOfBounds {
        offset,
        len: len as u64,
        size: size as u64,
    };
    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    if end > size {
        return Err(out_of_bounds());
    }
    Ok(start..end)
}
