//! Software backends for the accelerator and transfer capabilities.
//!
//! Both complete synchronously and fire their completion signal before
//! returning, so they run on any runtime and in unit tests.

use log::debug;
use ndarray::{ArrayView2, Axis};
use tokio::sync::oneshot;

use crate::dpif::config::{AveragingMode, Direction};
use crate::hwa::accelerator::{
    write_record, CfarAccelerator, HwaCapabilities, IntermediateDetection, ParamSet, PassReport,
};
use crate::hwa::memory::{HwaMemory, MemRegion};
use crate::hwa::transfer::TransferEngine;
use crate::math::window::scan_line;
use crate::prelude::{CfarError, CfarResult};

pub const SIM_NUM_PARAM_SETS: usize = 16;

/// Cell-averaging CFAR engine running the windowed average on the CPU.
pub struct SoftwareCfarEngine {
    memory: HwaMemory,
    param_sets: Vec<Option<ParamSet>>,
    capabilities: HwaCapabilities,
}

impl SoftwareCfarEngine {
    pub fn new(num_banks: usize, bank_size: usize) -> Self {
        Self::with_memory(HwaMemory::new(num_banks, bank_size))
    }

    pub fn with_memory(memory: HwaMemory) -> Self {
        Self {
            memory,
            param_sets: vec![None; SIM_NUM_PARAM_SETS],
            capabilities: HwaCapabilities {
                num_param_sets: SIM_NUM_PARAM_SETS,
                averaging_modes: vec![
                    AveragingMode::CellAveraging,
                    AveragingMode::GreatestOf,
                    AveragingMode::SmallestOf,
                ],
                supports_cyclic: true,
            },
        }
    }

    /// Restricts the advertised capabilities, e.g. to mimic a smaller device.
    pub fn with_capabilities(mut self, capabilities: HwaCapabilities) -> Self {
        self.param_sets = vec![None; capabilities.num_param_sets];
        self.capabilities = capabilities;
        self
    }

    fn run_pass(&mut self, set: &ParamSet) -> CfarResult<PassReport> {
        let num_cells = set.num_range_bins * set.num_doppler_bins;
        let samples = self
            .memory
            .read_u16s(set.source.slice(0, num_cells * 2))?;
        let matrix = ArrayView2::from_shape((set.num_range_bins, set.num_doppler_bins), &samples)
            .map_err(|e| CfarError::Internal(format!("source region shape: {e}")))?;

        // Lanes along axis 1 are range rows; along axis 0, Doppler columns.
        let axis = match set.direction {
            Direction::Doppler => Axis(1),
            Direction::Range => Axis(0),
        };

        let capacity = set.output_capacity();
        let mut report = PassReport::default();
        'lines: for (iter_num, line) in matrix.lanes(axis).into_iter().enumerate() {
            for hit in scan_line(line, &set.cfar) {
                if report.records == capacity {
                    report.overflowed = true;
                    break 'lines;
                }
                let record = IntermediateDetection {
                    noise: hit.noise.round() as u32,
                    cell_idx: hit.cell as u16,
                    iter_num: iter_num as u16,
                };
                write_record(&mut self.memory, &set.output, report.records, &record)?;
                report.records += 1;
            }
        }
        debug!(
            "software {} pass wrote {} records (overflow {})",
            set.direction, report.records, report.overflowed
        );
        Ok(report)
    }
}

impl Default for SoftwareCfarEngine {
    fn default() -> Self {
        Self::with_memory(HwaMemory::default())
    }
}

impl CfarAccelerator for SoftwareCfarEngine {
    fn capabilities(&self) -> HwaCapabilities {
        self.capabilities.clone()
    }

    fn memory(&self) -> &HwaMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut HwaMemory {
        &mut self.memory
    }

    fn configure(&mut self, start_idx: usize, sets: &[ParamSet]) -> CfarResult<()> {
        let supported = self.param_sets.len();
        if start_idx + sets.len() > supported {
            return Err(CfarError::InvalidParamSetCount {
                requested: start_idx + sets.len(),
                supported,
            });
        }
        for (slot, set) in self.param_sets[start_idx..].iter_mut().zip(sets) {
            *slot = Some(*set);
        }
        Ok(())
    }

    fn start(&mut self, param_set_idx: usize) -> CfarResult<oneshot::Receiver<PassReport>> {
        let set = self
            .param_sets
            .get(param_set_idx)
            .copied()
            .flatten()
            .ok_or_else(|| {
                CfarError::Internal(format!("param set {param_set_idx} not configured"))
            })?;
        let report = self.run_pass(&set)?;
        let (tx, rx) = oneshot::channel();
        // The receiver is still held here, so the send cannot fail.
        let _ = tx.send(report);
        Ok(rx)
    }
}

/// Memory-to-scratch copier. A stalled engine accepts requests but never
/// signals completion, which exercises the caller's timeout path.
pub struct SoftwareTransferEngine {
    num_channels: u8,
    stalled: bool,
    pending: Vec<oneshot::Sender<()>>,
}

impl SoftwareTransferEngine {
    pub fn new(num_channels: u8) -> Self {
        Self {
            num_channels,
            stalled: false,
            pending: Vec::new(),
        }
    }

    pub fn stalled(num_channels: u8) -> Self {
        Self {
            stalled: true,
            ..Self::new(num_channels)
        }
    }

    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
        if !stalled {
            self.pending.clear();
        }
    }

    fn check_channel(&self, channel: u8) -> CfarResult<()> {
        if channel >= self.num_channels {
            return Err(CfarError::InvalidArgument(format!(
                "transfer channel {channel} not available ({} channels)",
                self.num_channels
            )));
        }
        Ok(())
    }

    fn complete(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if self.stalled {
            // Senders whose caller already gave up are released.
            self.pending.retain(|pending| !pending.is_closed());
            self.pending.push(tx);
        } else {
            let _ = tx.send(());
        }
        rx
    }
}

impl Default for SoftwareTransferEngine {
    fn default() -> Self {
        Self::new(64)
    }
}

impl TransferEngine for SoftwareTransferEngine {
    fn num_channels(&self) -> u8 {
        self.num_channels
    }

    fn submit(
        &mut self,
        channel: u8,
        source: &[u16],
        dest: MemRegion,
        memory: &mut HwaMemory,
    ) -> CfarResult<oneshot::Receiver<()>> {
        self.check_channel(channel)?;
        if source.len() * 2 > dest.len {
            return Err(CfarError::Internal(format!(
                "transfer of {} bytes exceeds destination of {} bytes",
                source.len() * 2,
                dest.len
            )));
        }
        if !self.stalled {
            memory.write_u16s(dest.address, source)?;
        }
        Ok(self.complete())
    }

    fn signal(&mut self, channel: u8) -> CfarResult<oneshot::Receiver<()>> {
        self.check_channel(channel)?;
        Ok(self.complete())
    }
}
