use std::time::{Duration, Instant};

use crate::dpif::config::{Direction, DynamicConfig, StaticConfig};
use crate::hwa::accelerator::{
    read_record, CfarAccelerator, IntermediateDetection, ParamSet, CFAR_DET_RECORD_BYTES,
};
use crate::prelude::{CfarError, CfarResult};
use crate::processing::orchestrator::wait_for;
use crate::processing::resources::ResourceManager;
use crate::telemetry::log::LogManager;

/// Decoded records of one completed pass.
#[derive(Debug, Clone, Default)]
pub struct PassOutput {
    pub records: Vec<IntermediateDetection>,
    pub wait: Duration,
}

/// Programs and drives the Doppler and range passes on the accelerator.
pub struct AcceleratorAdapter {
    timeout: Duration,
    logger: LogManager,
}

impl AcceleratorAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            logger: LogManager::new("accelerator"),
        }
    }

    /// Pass descriptions in table order: Doppler first, then range.
    pub fn param_sets(
        static_cfg: &StaticConfig,
        dynamic: &DynamicConfig,
        resources: &ResourceManager,
    ) -> [ParamSet; 2] {
        let source = resources.input().slice(0, static_cfg.num_cells() * 2);
        [Direction::Doppler, Direction::Range].map(|direction| ParamSet {
            direction,
            cfar: *dynamic.cfar(direction),
            num_range_bins: static_cfg.num_range_bins,
            num_doppler_bins: static_cfg.num_doppler_bins,
            source,
            output: resources.output(direction),
        })
    }

    pub fn configure<A: CfarAccelerator>(
        &self,
        accelerator: &mut A,
        static_cfg: &StaticConfig,
        dynamic: &DynamicConfig,
        resources: &ResourceManager,
    ) -> CfarResult<()> {
        let sets = Self::param_sets(static_cfg, dynamic, resources);
        accelerator.configure(resources.param_set_idx(Direction::Doppler), &sets)
    }

    /// Starts the pass, waits for completion and decodes its output region.
    pub async fn run_pass<A: CfarAccelerator>(
        &self,
        accelerator: &mut A,
        resources: &ResourceManager,
        direction: Direction,
    ) -> CfarResult<PassOutput> {
        let done = accelerator.start(resources.param_set_idx(direction))?;
        let started = Instant::now();
        let report = wait_for(done, self.timeout, || CfarError::PassTimeout {
            direction,
            timeout_ms: self.timeout.as_millis() as u64,
        })
        .await?;
        let wait = started.elapsed();

        let output = resources.output(direction);
        let capacity = output.len / CFAR_DET_RECORD_BYTES;
        if report.overflowed || report.records > capacity {
            return Err(CfarError::Internal(format!(
                "{direction} pass produced {} records{} for a capacity of {capacity}",
                report.records,
                if report.overflowed { " and overflowed" } else { "" }
            )));
        }

        let records = (0..report.records)
            .map(|slot| read_record(accelerator.memory(), &output, slot))
            .collect::<CfarResult<Vec<_>>>()?;
        self.logger
            .detail(&format!("{direction} pass: {} candidates", records.len()));
        Ok(PassOutput { records, wait })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpif::config::{CfarConfig, FovConfig};
    use crate::hwa::memory::DEFAULT_BANK_SIZE;
    use crate::hwa::sim::SoftwareCfarEngine;
    use crate::processing::resources::tests::layout;

    fn dynamic() -> DynamicConfig {
        DynamicConfig {
            cfar_range: CfarConfig::new(0, 1, 0.5),
            cfar_doppler: CfarConfig::new(1, 1, 2.0),
            fov_range: FovConfig::new(0.0, 10.0),
            fov_doppler: FovConfig::new(-10.0, 10.0),
        }
    }

    #[test]
    fn param_sets_follow_direction_order() {
        let cfg = StaticConfig::new(4, 4, 1.0, 1.0);
        let manager = ResourceManager::new(layout(&cfg, 4), &cfg, DEFAULT_BANK_SIZE);
        let [doppler, range] = AcceleratorAdapter::param_sets(&cfg, &dynamic(), &manager);
        assert_eq!(doppler.direction, Direction::Doppler);
        assert_eq!(doppler.cfar.threshold_scale, 2.0);
        assert_eq!(range.cfar.threshold_scale, 0.5);
        assert_eq!(range.output, manager.output(Direction::Range));
        assert_eq!(doppler.source.len, 32);
    }

    #[tokio::test]
    async fn range_pass_records_are_decoded() {
        let cfg = StaticConfig::new(4, 4, 1.0, 1.0);
        let manager = ResourceManager::new(layout(&cfg, 4), &cfg, DEFAULT_BANK_SIZE);
        let mut engine = SoftwareCfarEngine::default();
        let mut samples = vec![10u16; 16];
        samples[2 * 4 + 1] = 100;
        engine.memory_mut().write_u16s(0, &samples).unwrap();

        let adapter = AcceleratorAdapter::new(Duration::from_millis(50));
        let mut dynamic = dynamic();
        dynamic.cfar_range = CfarConfig::new(1, 1, 2.0);
        adapter.configure(&mut engine, &cfg, &dynamic, &manager).unwrap();
        let out = adapter
            .run_pass(&mut engine, &manager, Direction::Range)
            .await
            .unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].cell(Direction::Range), (2, 1));
    }
}
