//! Host-owned linear memory for the reference registry.

use numkern_types::abi::PAGE_SIZE;
use numkern_types::{KernelError, KernelResult};

/// A flat, byte-addressable buffer owned by the host.
///
/// The registry only ever reads from it; every write goes through the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearMemory {
    bytes: Vec<u8>,
}

impl LinearMemory {
    /// Zeroed memory of `pages` WebAssembly pages.
    pub fn with_pages(pages: u64) -> Self {
        Self {
            bytes: vec![0; (pages * PAGE_SIZE) as usize],
        }
    }

    /// Memory holding exactly `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> KernelResult<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    /// Copy `data` into memory starting at `offset`.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> KernelResult<()> {
        let range = self.range(offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn range(&self, offset: usize, len: usize) -> KernelResult<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(offset..end),
            _ => Err(KernelError::MemoryOutOfBounds {
                offset: offset as u64,
                len: len as u64,
                size: self.bytes.len() as u64,
            }),
        }
    }
}
