//! Configuration checks run before any transfer or pass is scheduled.

use crate::dpif::bitmask::Bitmask;
use crate::dpif::config::{CfarConfig, Direction, DynamicConfig, FovConfig, StaticConfig};
use crate::dpif::detmatrix::DetMatrixFormat;
use crate::hwa::accelerator::{HwaCapabilities, CFAR_DET_RECORD_BYTES, MAX_INDEX};
use crate::hwa::memory::MemRegion;
use crate::prelude::{CfarError, CfarResult, Region};
use crate::processing::resources::HardwareResources;

/// Param sets per frame: one Doppler pass, one range pass.
pub const NUM_PARAM_SETS: usize = 2;

/// The matrix may occupy at most two contiguous scratch banks.
pub const MAX_INPUT_BANKS: usize = 2;

pub const DET_MATRIX_ALIGNMENT: usize = std::mem::size_of::<u16>();
pub const HWA_MEM_OUT_ALIGNMENT: usize = std::mem::size_of::<u32>();

/// Accelerator-side facts the checks depend on.
#[derive(Debug, Clone)]
pub struct TargetLimits {
    pub capabilities: HwaCapabilities,
    pub memory_size: usize,
    pub bank_size: usize,
    pub num_transfer_channels: u8,
}

pub fn validate_config(
    static_cfg: &StaticConfig,
    dynamic: &DynamicConfig,
    resources: &HardwareResources,
    limits: &TargetLimits,
) -> CfarResult<()> {
    validate_static(static_cfg)?;
    validate_cfar(Direction::Doppler, &dynamic.cfar_doppler, static_cfg, &limits.capabilities)?;
    validate_cfar(Direction::Range, &dynamic.cfar_range, static_cfg, &limits.capabilities)?;
    validate_fov(&dynamic.fov_range)?;
    validate_fov(&dynamic.fov_doppler)?;
    validate_resources(static_cfg, resources, limits)
}

pub fn validate_static(cfg: &StaticConfig) -> CfarResult<()> {
    if cfg.num_range_bins == 0 || cfg.num_range_bins > MAX_INDEX {
        return Err(CfarError::InvalidArgument(format!(
            "num_range_bins {} outside 1..={}",
            cfg.num_range_bins, MAX_INDEX
        )));
    }
    if !cfg.num_doppler_bins.is_power_of_two() || cfg.num_doppler_bins > MAX_INDEX {
        return Err(CfarError::InvalidArgument(format!(
            "num_doppler_bins {} must be a power of two up to {}",
            cfg.num_doppler_bins, MAX_INDEX
        )));
    }
    if 1usize.checked_shl(cfg.log2_num_doppler_bins as u32) != Some(cfg.num_doppler_bins) {
        return Err(CfarError::InvalidArgument(format!(
            "log2_num_doppler_bins {} does not match {} bins",
            cfg.log2_num_doppler_bins, cfg.num_doppler_bins
        )));
    }
    if !(cfg.range_step.is_finite() && cfg.range_step > 0.0)
        || !(cfg.doppler_step.is_finite() && cfg.doppler_step > 0.0)
    {
        return Err(CfarError::InvalidArgument(
            "range and Doppler steps must be positive".into(),
        ));
    }
    Ok(())
}

pub fn validate_cfar(
    direction: Direction,
    cfar: &CfarConfig,
    static_cfg: &StaticConfig,
    capabilities: &HwaCapabilities,
) -> CfarResult<()> {
    if cfar.training_cells == 0 {
        return Err(CfarError::InvalidArgument(format!(
            "{direction} CFAR needs at least one training cell"
        )));
    }
    if !(cfar.threshold_scale.is_finite() && cfar.threshold_scale >= 0.0) {
        return Err(CfarError::InvalidArgument(format!(
            "{direction} threshold scale {} is not a finite non-negative factor",
            cfar.threshold_scale
        )));
    }
    if !capabilities.supports(cfar) {
        return Err(CfarError::NotImplemented(format!(
            "{direction} CFAR with {:?} averaging (cyclic {}) on this accelerator",
            cfar.averaging, cfar.cyclic
        )));
    }
    let line_len = static_cfg.line_len(direction);
    if cfar.cyclic && 2 * cfar.half_span() + 1 > line_len {
        return Err(CfarError::InvalidArgument(format!(
            "cyclic {direction} window of {} cells exceeds line length {line_len}",
            2 * cfar.half_span() + 1
        )));
    }
    Ok(())
}

pub fn validate_fov(fov: &FovConfig) -> CfarResult<()> {
    if !(fov.min.is_finite() && fov.max.is_finite()) || fov.min > fov.max {
        return Err(CfarError::InvalidArgument(format!(
            "field of view [{}, {}] is not a finite ordered interval",
            fov.min, fov.max
        )));
    }
    Ok(())
}

pub fn validate_resources(
    static_cfg: &StaticConfig,
    res: &HardwareResources,
    limits: &TargetLimits,
) -> CfarResult<()> {
    if res.det_matrix_format != DetMatrixFormat::RangeMajor {
        return Err(CfarError::InvalidFormat(format!(
            "{:?} matrices are not supported",
            res.det_matrix_format
        )));
    }

    let supported = limits.capabilities.num_param_sets;
    if res.param_sets.count != NUM_PARAM_SETS || res.param_sets.start_idx + NUM_PARAM_SETS > supported {
        return Err(CfarError::InvalidParamSetCount {
            requested: res.param_sets.start_idx + res.param_sets.count,
            supported: NUM_PARAM_SETS.min(supported),
        });
    }

    for channel in [res.transfer.data_in, res.transfer.signature] {
        if channel >= limits.num_transfer_channels {
            return Err(CfarError::InvalidArgument(format!(
                "transfer channel {channel} not available"
            )));
        }
    }

    let regions = [
        (Region::HwaMemInput, res.hwa_mem_input, DET_MATRIX_ALIGNMENT),
        (Region::HwaMemOutDoppler, res.hwa_mem_out_doppler, HWA_MEM_OUT_ALIGNMENT),
        (Region::HwaMemOutRange, res.hwa_mem_out_range, HWA_MEM_OUT_ALIGNMENT),
    ];
    for (region, mem, alignment) in regions {
        if mem.len == 0 || mem.address > limits.memory_size || mem.len > limits.memory_size - mem.address {
            return Err(CfarError::InvalidArgument(format!(
                "{region} 0x{:x}+{} outside accelerator memory",
                mem.address, mem.len
            )));
        }
        if mem.address % alignment != 0 {
            return Err(CfarError::MisalignedBuffer {
                region,
                address: mem.address,
                alignment,
            });
        }
    }

    for (i, (first, a, _)) in regions.iter().enumerate() {
        for (second, b, _) in &regions[i + 1..] {
            if a.shares_bank_with(b, limits.bank_size) {
                return Err(CfarError::BankConflict {
                    first: *first,
                    second: *second,
                });
            }
        }
    }

    let cells = static_cfg.num_cells();
    let matrix_bytes = cells * DET_MATRIX_ALIGNMENT;
    let input_available = res.hwa_mem_input.len.min(MAX_INPUT_BANKS * limits.bank_size);
    if matrix_bytes > input_available {
        return Err(CfarError::InsufficientMemory {
            region: Region::HwaMemInput,
            required: matrix_bytes,
            available: input_available,
        });
    }

    let worst_case = cells * CFAR_DET_RECORD_BYTES;
    check_output(Region::HwaMemOutDoppler, &res.hwa_mem_out_doppler, worst_case)?;
    check_output(Region::HwaMemOutRange, &res.hwa_mem_out_range, worst_case)?;

    let words = Bitmask::words_for(cells);
    if res.bitmask_words < words {
        return Err(CfarError::InsufficientMemory {
            region: Region::DopplerBitMask,
            required: words * 4,
            available: res.bitmask_words * 4,
        });
    }

    if res.det_list_capacity == 0 {
        return Err(CfarError::InvalidArgument(
            "detection list capacity is zero".into(),
        ));
    }
    Ok(())
}

fn check_output(region: Region, mem: &MemRegion, required: usize) -> CfarResult<()> {
    if mem.len < required {
        return Err(CfarError::InsufficientMemory {
            region,
            required,
            available: mem.len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpif::config::AveragingMode;
    use crate::hwa::memory::{DEFAULT_BANK_SIZE, DEFAULT_NUM_BANKS};
    use crate::processing::resources::tests::layout;

    fn limits() -> TargetLimits {
        TargetLimits {
            capabilities: HwaCapabilities {
                num_param_sets: 16,
                averaging_modes: vec![AveragingMode::CellAveraging],
                supports_cyclic: true,
            },
            memory_size: DEFAULT_NUM_BANKS * DEFAULT_BANK_SIZE,
            bank_size: DEFAULT_BANK_SIZE,
            num_transfer_channels: 4,
        }
    }

    fn dynamic() -> DynamicConfig {
        DynamicConfig {
            cfar_range: CfarConfig::new(1, 2, 3.0),
            cfar_doppler: CfarConfig::new(1, 2, 3.0),
            fov_range: FovConfig::new(0.0, 50.0),
            fov_doppler: FovConfig::new(-5.0, 5.0),
        }
    }

    fn check(res: &HardwareResources) -> CfarResult<()> {
        let cfg = StaticConfig::new(64, 16, 0.5, 0.1);
        validate_config(&cfg, &dynamic(), res, &limits())
    }

    fn base() -> HardwareResources {
        layout(&StaticConfig::new(64, 16, 0.5, 0.1), 32)
    }

    #[test]
    fn default_layout_is_accepted() {
        assert!(check(&base()).is_ok());
    }

    #[test]
    fn misaligned_outputs_fail_with_region_codes() {
        let mut res = base();
        res.hwa_mem_out_doppler.address += 2;
        let err = check(&res).unwrap_err();
        assert_eq!(err.code(), -14);
        // Deterministic: the same violation yields the same code again.
        assert_eq!(check(&res).unwrap_err(), err);

        let mut res = base();
        res.hwa_mem_out_range.address += 1;
        assert_eq!(check(&res).unwrap_err().code(), -15);

        let mut res = base();
        res.hwa_mem_input.address += 1;
        assert_eq!(check(&res).unwrap_err().code(), -12);
    }

    #[test]
    fn undersized_regions_fail_with_region_codes() {
        let mut res = base();
        res.hwa_mem_input.len -= 2;
        assert_eq!(check(&res).unwrap_err().code(), -11);

        let mut res = base();
        res.hwa_mem_out_range.len -= 8;
        assert_eq!(check(&res).unwrap_err().code(), -19);

        let mut res = base();
        res.bitmask_words -= 1;
        assert_eq!(check(&res).unwrap_err().code(), -16);

        let mut res = base();
        res.hwa_mem_out_doppler.len -= 8;
        assert_eq!(check(&res).unwrap_err().code(), -18);
    }

    #[test]
    fn input_sharing_a_bank_with_output_is_rejected() {
        let mut res = base();
        res.hwa_mem_out_doppler.address = 0x1000;
        let err = check(&res).unwrap_err();
        assert_eq!(err.code(), -4);
        assert_eq!(
            err,
            CfarError::BankConflict {
                first: Region::HwaMemInput,
                second: Region::HwaMemOutDoppler
            }
        );
    }

    #[test]
    fn missing_transfer_channel_is_rejected() {
        let mut res = base();
        res.transfer.signature = 4;
        assert!(matches!(
            check(&res),
            Err(CfarError::InvalidArgument(msg)) if msg.contains("channel 4")
        ));
    }

    #[test]
    fn overlapping_banks_are_rejected() {
        let mut res = base();
        res.hwa_mem_out_range.address = res.hwa_mem_out_doppler.address + 0x2000;
        assert_eq!(
            check(&res).unwrap_err(),
            CfarError::BankConflict {
                first: Region::HwaMemOutDoppler,
                second: Region::HwaMemOutRange
            }
        );
    }

    #[test]
    fn param_set_count_must_be_two() {
        let mut res = base();
        res.param_sets.count = 3;
        assert_eq!(check(&res).unwrap_err().code(), -3);
        let mut res = base();
        res.param_sets.start_idx = 15;
        assert_eq!(check(&res).unwrap_err().code(), -3);
    }

    #[test]
    fn doppler_major_matrix_is_unsupported() {
        let mut res = base();
        res.det_matrix_format = DetMatrixFormat::DopplerMajor;
        assert_eq!(check(&res).unwrap_err().code(), -2);
    }

    #[test]
    fn static_and_dynamic_errors() {
        let mut cfg = StaticConfig::new(64, 16, 0.5, 0.1);
        cfg.num_doppler_bins = 12;
        assert!(validate_static(&cfg).is_err());

        let caps = limits().capabilities;
        let mut cfar = CfarConfig::new(1, 2, 3.0);
        cfar.averaging = AveragingMode::GreatestOf;
        let cfg = StaticConfig::new(64, 16, 0.5, 0.1);
        assert_eq!(
            validate_cfar(Direction::Range, &cfar, &cfg, &caps).unwrap_err().code(),
            -30
        );

        let mut cfar = CfarConfig::new(4, 4, 3.0);
        cfar.cyclic = true;
        assert_eq!(
            validate_cfar(Direction::Doppler, &cfar, &cfg, &caps).unwrap_err().code(),
            -1
        );
        assert!(validate_fov(&FovConfig::new(2.0, 1.0)).is_err());
    }
}
