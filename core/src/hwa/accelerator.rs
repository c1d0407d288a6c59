//! Averaging-accelerator capability and its output record format.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::dpif::config::{AveragingMode, CfarConfig, Direction};
use crate::hwa::memory::{HwaMemory, MemRegion};
use crate::prelude::CfarResult;

/// Bytes per packed output record: noise word followed by the index word.
pub const CFAR_DET_RECORD_BYTES: usize = 8;

/// Cell and iteration indices are 12-bit fields of the index word.
pub const MAX_INDEX: usize = 1 << 12;

const INDEX_MASK: u32 = (MAX_INDEX as u32) - 1;

/// Candidate cell reported by one accelerator pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntermediateDetection {
    pub noise: u32,
    /// Index along the scan line.
    pub cell_idx: u16,
    /// Index of the scan line.
    pub iter_num: u16,
}

impl IntermediateDetection {
    pub fn encode(&self) -> [u32; 2] {
        let index = (self.cell_idx as u32 & INDEX_MASK) | ((self.iter_num as u32 & INDEX_MASK) << 12);
        [self.noise, index]
    }

    pub fn decode(words: [u32; 2]) -> Self {
        Self {
            noise: words[0],
            cell_idx: (words[1] & INDEX_MASK) as u16,
            iter_num: ((words[1] >> 12) & INDEX_MASK) as u16,
        }
    }

    /// `(range_idx, doppler_idx)` of the record for a pass in `direction`.
    pub fn cell(&self, direction: Direction) -> (usize, usize) {
        match direction {
            Direction::Doppler => (self.iter_num as usize, self.cell_idx as usize),
            Direction::Range => (self.cell_idx as usize, self.iter_num as usize),
        }
    }
}

pub fn write_record(
    memory: &mut HwaMemory,
    region: &MemRegion,
    slot: usize,
    record: &IntermediateDetection,
) -> CfarResult<()> {
    let address = region.address + slot * CFAR_DET_RECORD_BYTES;
    let [noise, index] = record.encode();
    memory.write_u32(address, noise)?;
    memory.write_u32(address + 4, index)
}

pub fn read_record(
    memory: &HwaMemory,
    region: &MemRegion,
    slot: usize,
) -> CfarResult<IntermediateDetection> {
    let address = region.address + slot * CFAR_DET_RECORD_BYTES;
    Ok(IntermediateDetection::decode([
        memory.read_u32(address)?,
        memory.read_u32(address + 4)?,
    ]))
}

/// One accelerator pass description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub direction: Direction,
    pub cfar: CfarConfig,
    pub num_range_bins: usize,
    pub num_doppler_bins: usize,
    pub source: MemRegion,
    pub output: MemRegion,
}

impl ParamSet {
    pub fn output_capacity(&self) -> usize {
        self.output.len / CFAR_DET_RECORD_BYTES
    }
}

/// Completion report of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassReport {
    pub records: usize,
    /// More candidates were found than the output region could hold.
    pub overflowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwaCapabilities {
    pub num_param_sets: usize,
    pub averaging_modes: Vec<AveragingMode>,
    pub supports_cyclic: bool,
}

impl HwaCapabilities {
    pub fn supports(&self, cfar: &CfarConfig) -> bool {
        self.averaging_modes.contains(&cfar.averaging) && (!cfar.cyclic || self.supports_cyclic)
    }
}

/// Fixed-function CFAR accelerator.
///
/// Implementations own the banked scratch memory. `start` returns a receiver
/// that fires once the pass has written its records into the param set's
/// output region.
pub trait CfarAccelerator: Send {
    fn capabilities(&self) -> HwaCapabilities;

    fn memory(&self) -> &HwaMemory;

    fn memory_mut(&mut self) -> &mut HwaMemory;

    /// Loads `sets` into the param-set table starting at `start_idx`.
    fn configure(&mut self, start_idx: usize, sets: &[ParamSet]) -> CfarResult<()>;

    fn start(&mut self, param_set_idx: usize) -> CfarResult<oneshot::Receiver<PassReport>>;
}
