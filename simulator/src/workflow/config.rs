use anyhow::{ensure, Context};
use cfarcore::dpif::{
    Bitmask, CfarConfig, DetMatrixFormat, DynamicConfig, FovConfig, StaticConfig,
};
use cfarcore::hwa::memory::{MemRegion, DEFAULT_BANK_SIZE, DEFAULT_NUM_BANKS};
use cfarcore::processing::{CfarProcConfig, HardwareResources, ParamSetWindow, TransferChannels};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::generator::scene::GeneratorConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub range_bins: usize,
    pub doppler_bins: usize,
    pub range_step: f32,
    pub doppler_step: f32,
    pub cfar_range: CfarConfig,
    pub cfar_doppler: CfarConfig,
    /// Defaults to the full range extent.
    pub fov_range: Option<FovConfig>,
    /// Defaults to the full signed velocity extent.
    pub fov_doppler: Option<FovConfig>,
    pub det_list_capacity: usize,
    pub num_banks: usize,
    pub bank_size: usize,
    pub wait_timeout_ms: u64,
    pub scene: GeneratorConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from_args(64, 32)
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(range_bins: usize, doppler_bins: usize) -> Self {
        Self {
            range_bins,
            doppler_bins,
            range_step: 0.5,
            doppler_step: 0.25,
            cfar_range: CfarConfig::new(1, 2, 3.0),
            cfar_doppler: CfarConfig::new(1, 2, 3.0),
            fov_range: None,
            fov_doppler: None,
            det_list_capacity: 64,
            num_banks: DEFAULT_NUM_BANKS,
            bank_size: DEFAULT_BANK_SIZE,
            wait_timeout_ms: 100,
            scene: GeneratorConfig::default(),
        }
    }

    pub fn static_config(&self) -> StaticConfig {
        StaticConfig::new(
            self.range_bins,
            self.doppler_bins,
            self.range_step,
            self.doppler_step,
        )
    }

    pub fn dynamic_config(&self) -> DynamicConfig {
        let static_cfg = self.static_config();
        let half = (self.doppler_bins / 2) as f32 * self.doppler_step;
        DynamicConfig {
            cfar_range: self.cfar_range,
            cfar_doppler: self.cfar_doppler,
            fov_range: self.fov_range.unwrap_or_else(|| {
                FovConfig::new(0.0, static_cfg.range_meters(self.range_bins))
            }),
            fov_doppler: self
                .fov_doppler
                .unwrap_or_else(|| FovConfig::new(-half, half)),
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Places the input at bank 0 and each output region on the next free
    /// bank boundary, so no two regions ever share a bank.
    pub fn to_proc_config(&self) -> anyhow::Result<CfarProcConfig> {
        ensure!(self.bank_size > 0, "bank_size must be non-zero");
        let static_cfg = self.static_config();
        let cells = static_cfg.num_cells();
        let banks_for = |len: usize| len.div_ceil(self.bank_size).max(1);

        let input = MemRegion::new(0, cells * 2);
        let out_len = cells * 8;
        let doppler_address = banks_for(input.len) * self.bank_size;
        let range_address = doppler_address + banks_for(out_len) * self.bank_size;

        Ok(CfarProcConfig {
            static_cfg,
            dynamic: self.dynamic_config(),
            resources: HardwareResources {
                transfer: TransferChannels {
                    data_in: 0,
                    signature: 1,
                },
                param_sets: ParamSetWindow {
                    start_idx: 0,
                    count: 2,
                },
                det_matrix_format: DetMatrixFormat::RangeMajor,
                hwa_mem_input: input,
                hwa_mem_out_doppler: MemRegion::new(doppler_address, out_len),
                hwa_mem_out_range: MemRegion::new(range_address, out_len),
                bitmask_words: Bitmask::words_for(cells),
                det_list_capacity: self.det_list_capacity,
            },
        })
    }
}
