use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::prelude::{CfarError, CfarResult};

pub const DEFAULT_NUM_BANKS: usize = 4;
pub const DEFAULT_BANK_SIZE: usize = 16 * 1024;

/// Byte range inside accelerator scratch memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemRegion {
    pub address: usize,
    pub len: usize,
}

impl MemRegion {
    pub fn new(address: usize, len: usize) -> Self {
        Self { address, len }
    }

    pub fn end(&self) -> usize {
        self.address.saturating_add(self.len)
    }

    pub fn banks(&self, bank_size: usize) -> RangeInclusive<usize> {
        let last = self.end().saturating_sub(1).max(self.address);
        self.address / bank_size..=last / bank_size
    }

    pub fn shares_bank_with(&self, other: &MemRegion, bank_size: usize) -> bool {
        let (a, b) = (self.banks(bank_size), other.banks(bank_size));
        a.start() <= b.end() && b.start() <= a.end()
    }

    /// Sub-region starting `offset` bytes in, clamped to this region.
    pub fn slice(&self, offset: usize, len: usize) -> MemRegion {
        let start = offset.min(self.len);
        MemRegion::new(self.address + start, len.min(self.len - start))
    }
}

/// Banked scratch memory visible to the accelerator.
#[derive(Debug, Clone)]
pub struct HwaMemory {
    bank_size: usize,
    data: Vec<u8>,
}

impl HwaMemory {
    pub fn new(num_banks: usize, bank_size: usize) -> Self {
        Self {
            bank_size,
            data: vec![0; num_banks * bank_size],
        }
    }

    pub fn bank_size(&self) -> usize {
        self.bank_size
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn contains(&self, region: &MemRegion) -> bool {
        region.address <= self.data.len() && region.len <= self.data.len() - region.address
    }

    fn bytes(&self, region: MemRegion) -> CfarResult<&[u8]> {
        if !self.contains(&region) {
            return Err(out_of_bounds(region));
        }
        Ok(&self.data[region.address..region.end()])
    }

    fn bytes_mut(&mut self, region: MemRegion) -> CfarResult<&mut [u8]> {
        if !self.contains(&region) {
            return Err(out_of_bounds(region));
        }
        Ok(&mut self.data[region.address..region.end()])
    }

    pub fn write_u16s(&mut self, address: usize, values: &[u16]) -> CfarResult<()> {
        let dest = self.bytes_mut(MemRegion::new(address, values.len() * 2))?;
        for (chunk, value) in dest.chunks_exact_mut(2).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    pub fn read_u16s(&self, region: MemRegion) -> CfarResult<Vec<u16>> {
        Ok(self
            .bytes(region)?
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect())
    }

    pub fn write_u32(&mut self, address: usize, value: u32) -> CfarResult<()> {
        self.bytes_mut(MemRegion::new(address, 4))?
            .copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_u32(&self, address: usize) -> CfarResult<u32> {
        let b = self.bytes(MemRegion::new(address, 4))?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl Default for HwaMemory {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_BANKS, DEFAULT_BANK_SIZE)
    }
}

fn out_of_bounds(region: MemRegion) -> CfarError {
    CfarError::Internal(format!(
        "scratch access 0x{:x}..0x{:x} outside accelerator memory",
        region.address,
        region.end()
    ))
}
