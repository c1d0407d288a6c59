use serde::{Deserialize, Serialize};

use crate::dpif::bitmask::Bitmask;
use crate::dpif::config::{Direction, StaticConfig};
use crate::dpif::detection::FinalDetection;
use crate::dpif::detmatrix::{DetMatrix, DetMatrixFormat};
use crate::hwa::memory::MemRegion;
use crate::prelude::{CfarError, CfarResult, Region};

/// Transfer-engine channels used to page the matrix and trigger the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferChannels {
    pub data_in: u8,
    pub signature: u8,
}

/// Slice of the accelerator's param-set table reserved for this unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSetWindow {
    pub start_idx: usize,
    pub count: usize,
}

/// Caller-declared memory and channel assignments.
///
/// Scratch regions are addresses in accelerator memory. The system-side
/// buffers (matrix, bitmask, detection list) stay with the caller and are
/// lent to each `process` call; only their sizes are declared here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardwareResources {
    pub transfer: TransferChannels,
    pub param_sets: ParamSetWindow,
    pub det_matrix_format: DetMatrixFormat,
    pub hwa_mem_input: MemRegion,
    pub hwa_mem_out_doppler: MemRegion,
    pub hwa_mem_out_range: MemRegion,
    pub bitmask_words: usize,
    pub det_list_capacity: usize,
}

/// Caller-owned buffers for one frame.
pub struct FrameBuffers<'a> {
    pub det_matrix: &'a DetMatrix,
    pub bitmask: &'a mut Bitmask,
    pub det_list: &'a mut [FinalDetection],
}

/// Block of the matrix paged into scratch by one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub first_sample: usize,
    pub num_samples: usize,
    pub dest: MemRegion,
}

/// Validated resources held for the lifetime of a configuration.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    resources: HardwareResources,
    num_range_bins: usize,
    num_doppler_bins: usize,
    pages: Vec<Page>,
}

impl ResourceManager {
    /// Expects resources already accepted by the validator.
    pub fn new(resources: HardwareResources, static_cfg: &StaticConfig, bank_size: usize) -> Self {
        let num_samples = static_cfg.num_cells();
        let page_samples = (bank_size / 2).max(1);
        let pages = (0..num_samples)
            .step_by(page_samples)
            .map(|first_sample| {
                let count = page_samples.min(num_samples - first_sample);
                Page {
                    first_sample,
                    num_samples: count,
                    dest: resources.hwa_mem_input.slice(first_sample * 2, count * 2),
                }
            })
            .collect();
        Self {
            resources,
            num_range_bins: static_cfg.num_range_bins,
            num_doppler_bins: static_cfg.num_doppler_bins,
            pages,
        }
    }

    pub fn resources(&self) -> &HardwareResources {
        &self.resources
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn channels(&self) -> TransferChannels {
        self.resources.transfer
    }

    pub fn input(&self) -> MemRegion {
        self.resources.hwa_mem_input
    }

    pub fn output(&self, direction: Direction) -> MemRegion {
        match direction {
            Direction::Doppler => self.resources.hwa_mem_out_doppler,
            Direction::Range => self.resources.hwa_mem_out_range,
        }
    }

    /// Doppler occupies the first slot of the window, range the second.
    pub fn param_set_idx(&self, direction: Direction) -> usize {
        let start = self.resources.param_sets.start_idx;
        match direction {
            Direction::Doppler => start,
            Direction::Range => start + 1,
        }
    }

    pub fn det_list_capacity(&self) -> usize {
        self.resources.det_list_capacity
    }

    /// Checks the lent buffers against what was declared at configuration.
    pub fn check_frame(&self, frame: &FrameBuffers<'_>) -> CfarResult<()> {
        let matrix = frame.det_matrix;
        if matrix.format != self.resources.det_matrix_format {
            return Err(CfarError::InvalidFormat(format!(
                "frame matrix is {:?}, configured for {:?}",
                matrix.format, self.resources.det_matrix_format
            )));
        }
        let required = self.num_range_bins * self.num_doppler_bins * 2;
        if matrix.size_bytes() < required {
            return Err(CfarError::InsufficientMemory {
                region: Region::DetMatrix,
                required,
                available: matrix.size_bytes(),
            });
        }
        if matrix.num_range_bins() != self.num_range_bins
            || matrix.num_doppler_bins() != self.num_doppler_bins
        {
            return Err(CfarError::InvalidArgument(format!(
                "frame matrix is {}x{}, configured for {}x{}",
                matrix.num_range_bins(),
                matrix.num_doppler_bins(),
                self.num_range_bins,
                self.num_doppler_bins
            )));
        }
        if frame.bitmask.num_words() < self.resources.bitmask_words {
            return Err(CfarError::InsufficientMemory {
                region: Region::DopplerBitMask,
                required: self.resources.bitmask_words * 4,
                available: frame.bitmask.num_words() * 4,
            });
        }
        if frame.det_list.len() < self.resources.det_list_capacity {
            return Err(CfarError::InsufficientMemory {
                region: Region::DetectionList,
                required: self.resources.det_list_capacity,
                available: frame.det_list.len(),
            });
        }
        Ok(())
    }
}
