//! Lifecycle facade of the CFAR unit.
//!
//! `init` takes ownership of the accelerator and transfer engine, `config`
//! validates and stores a configuration, `process` runs one frame, `control`
//! adjusts thresholds or field of view between frames and `deinit` hands the
//! hardware back. `process` and `control` take `&mut self`, so a frame can
//! never overlap another frame or a control command on the same session.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::dpif::config::{ControlCommand, Direction, DynamicConfig, StaticConfig};
use crate::hwa::accelerator::CfarAccelerator;
use crate::hwa::transfer::TransferEngine;
use crate::prelude::{CfarError, CfarResult};
use crate::processing::adapter::AcceleratorAdapter;
use crate::processing::fusion::{confirm_range_hits, mark_doppler_hits};
use crate::processing::orchestrator::TransferOrchestrator;
use crate::processing::resources::{FrameBuffers, HardwareResources, ResourceManager};
use crate::processing::validator::{
    validate_cfar, validate_config, validate_fov, TargetLimits, NUM_PARAM_SETS,
};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

pub struct InitParams<A, T> {
    pub accelerator: A,
    pub transfer: T,
    /// Deadline applied to each transfer and pass completion.
    pub wait_timeout: Duration,
}

impl<A, T> InitParams<A, T> {
    pub fn new(accelerator: A, transfer: T) -> Self {
        Self {
            accelerator,
            transfer,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CfarProcConfig {
    pub static_cfg: StaticConfig,
    pub dynamic: DynamicConfig,
    pub resources: HardwareResources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initialized,
    Configured,
    /// An internal error occurred; only `deinit` is meaningful.
    Faulted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub num_process: u32,
    pub processing_time: Duration,
    pub wait_time: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutParams {
    pub stats: FrameStats,
    pub num_detections: usize,
}

struct ActiveConfig {
    static_cfg: StaticConfig,
    dynamic: DynamicConfig,
    resources: ResourceManager,
}

/// One CFAR processing session.
pub struct CfarProc<A: CfarAccelerator, T: TransferEngine> {
    accelerator: A,
    transfer: T,
    state: SessionState,
    active: Option<ActiveConfig>,
    num_process: u32,
    orchestrator: TransferOrchestrator,
    adapter: AcceleratorAdapter,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl<A: CfarAccelerator, T: TransferEngine> CfarProc<A, T> {
    pub fn init(params: InitParams<A, T>) -> CfarResult<Self> {
        if params.wait_timeout.is_zero() {
            return Err(CfarError::InvalidArgument("wait timeout is zero".into()));
        }
        let supported = params.accelerator.capabilities().num_param_sets;
        if supported < NUM_PARAM_SETS {
            return Err(CfarError::InvalidParamSetCount {
                requested: NUM_PARAM_SETS,
                supported,
            });
        }
        Ok(Self {
            accelerator: params.accelerator,
            transfer: params.transfer,
            state: SessionState::Initialized,
            active: None,
            num_process: 0,
            orchestrator: TransferOrchestrator::new(params.wait_timeout),
            adapter: AcceleratorAdapter::new(params.wait_timeout),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new("cfarproc"),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn target_limits(&self) -> TargetLimits {
        let memory = self.accelerator.memory();
        TargetLimits {
            capabilities: self.accelerator.capabilities(),
            memory_size: memory.size(),
            bank_size: memory.bank_size(),
            num_transfer_channels: self.transfer.num_channels(),
        }
    }

    fn ensure_usable(&self) -> CfarResult<()> {
        if self.state == SessionState::Faulted {
            return Err(CfarError::Internal(
                "session faulted; deinit and init again".into(),
            ));
        }
        Ok(())
    }

    /// Validates and stores a configuration. Callable again between frames.
    pub fn config(&mut self, cfg: CfarProcConfig) -> CfarResult<()> {
        self.ensure_usable()?;
        let limits = self.target_limits();
        validate_config(&cfg.static_cfg, &cfg.dynamic, &cfg.resources, &limits)?;

        self.active = Some(ActiveConfig {
            static_cfg: cfg.static_cfg,
            dynamic: cfg.dynamic,
            resources: ResourceManager::new(cfg.resources, &cfg.static_cfg, limits.bank_size),
        });
        self.state = SessionState::Configured;
        self.logger.record(&format!(
            "configured {}x{} matrix, {} page(s), list capacity {}",
            cfg.static_cfg.num_range_bins,
            cfg.static_cfg.num_doppler_bins,
            self.active.as_ref().map_or(0, |a| a.resources.pages().len()),
            cfg.resources.det_list_capacity
        ));
        Ok(())
    }

    fn active_mut(&mut self) -> CfarResult<&mut ActiveConfig> {
        self.active
            .as_mut()
            .ok_or_else(|| CfarError::InvalidArgument("session not configured".into()))
    }

    /// Applies a runtime command; it takes effect on the next `process`.
    pub fn control(&mut self, command: ControlCommand) -> CfarResult<()> {
        self.ensure_usable()?;
        let capabilities = self.accelerator.capabilities();
        let active = self.active_mut()?;
        match command {
            ControlCommand::CfarRangeCfg(cfar) => {
                validate_cfar(Direction::Range, &cfar, &active.static_cfg, &capabilities)?;
                active.dynamic.cfar_range = cfar;
            }
            ControlCommand::CfarDopplerCfg(cfar) => {
                validate_cfar(Direction::Doppler, &cfar, &active.static_cfg, &capabilities)?;
                active.dynamic.cfar_doppler = cfar;
            }
            ControlCommand::FovRangeCfg(fov) => {
                validate_fov(&fov)?;
                active.dynamic.fov_range = fov;
            }
            ControlCommand::FovDopplerCfg(fov) => {
                validate_fov(&fov)?;
                active.dynamic.fov_doppler = fov;
            }
        }
        self.logger.detail(&format!("applied {command:?}"));
        Ok(())
    }

    /// Runs one frame. On error the caller's detection list is untouched.
    pub async fn process(&mut self, frame: FrameBuffers<'_>) -> CfarResult<OutParams> {
        self.ensure_usable()?;
        if self.active.is_none() {
            return Err(CfarError::InvalidArgument("session not configured".into()));
        }

        let started = Instant::now();
        match self.run_frame(frame).await {
            Ok((num_detections, wait_time)) => {
                self.num_process += 1;
                let stats = FrameStats {
                    num_process: self.num_process,
                    processing_time: started.elapsed(),
                    wait_time,
                };
                self.metrics
                    .record_frame(num_detections, stats.processing_time, wait_time);
                self.logger.detail(&format!(
                    "frame {} -> {} detection(s) in {:?}",
                    stats.num_process, num_detections, stats.processing_time
                ));
                Ok(OutParams {
                    stats,
                    num_detections,
                })
            }
            Err(err) => {
                self.metrics.record_error(&err);
                if err.is_fatal() {
                    self.state = SessionState::Faulted;
                }
                self.logger.alert(&format!("frame failed ({}): {err}", err.code()));
                Err(err)
            }
        }
    }

    async fn run_frame(&mut self, frame: FrameBuffers<'_>) -> CfarResult<(usize, Duration)> {
        let Self {
            accelerator,
            transfer,
            active,
            orchestrator,
            adapter,
            logger,
            ..
        } = self;
        let active = active
            .as_ref()
            .ok_or_else(|| CfarError::InvalidArgument("session not configured".into()))?;
        let FrameBuffers {
            det_matrix,
            bitmask,
            det_list,
        } = frame;
        active.resources.check_frame(&FrameBuffers {
            det_matrix,
            bitmask: &mut *bitmask,
            det_list: &mut *det_list,
        })?;

        adapter.configure(accelerator, &active.static_cfg, &active.dynamic, &active.resources)?;
        let mut wait = orchestrator
            .page_in(transfer, accelerator, &active.resources, det_matrix)
            .await?;

        bitmask.clear(active.static_cfg.num_cells());
        let doppler = adapter
            .run_pass(accelerator, &active.resources, Direction::Doppler)
            .await?;
        wait += doppler.wait;
        mark_doppler_hits(bitmask, &active.static_cfg, &doppler.records)?;

        let range = adapter
            .run_pass(accelerator, &active.resources, Direction::Range)
            .await?;
        wait += range.wait;
        let capacity = active.resources.det_list_capacity();
        let outcome = confirm_range_hits(
            bitmask,
            &active.static_cfg,
            &active.dynamic,
            det_matrix,
            &range.records,
            capacity,
        )?;

        let count = outcome.detections.len();
        det_list[..count].copy_from_slice(&outcome.detections);
        logger.detail(&format!(
            "confirmed {}, grouped out {}, out of view {}, reported {count}",
            outcome.confirmed, outcome.grouped_out, outcome.out_of_view
        ));
        if outcome.dropped > 0 {
            logger.alert(&format!(
                "detection list full at {capacity}; {} detection(s) dropped",
                outcome.dropped
            ));
        }
        Ok((count, wait))
    }

    /// Cumulative statistics since `init`.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn dynamic_config(&self) -> Option<&DynamicConfig> {
        self.active.as_ref().map(|a| &a.dynamic)
    }

    /// Ends the session and returns the hardware handed over at `init`.
    pub fn deinit(self) -> (A, T) {
        self.logger
            .record(&format!("deinit after {} frame(s)", self.num_process));
        (self.accelerator, self.transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpif::bitmask::Bitmask;
    use crate::dpif::config::{AveragingMode, CfarConfig, FovConfig};
    use crate::dpif::detection::FinalDetection;
    use crate::dpif::detmatrix::DetMatrix;
    use crate::hwa::accelerator::{HwaCapabilities, ParamSet, PassReport};
    use crate::hwa::memory::HwaMemory;
    use crate::hwa::sim::{SoftwareCfarEngine, SoftwareTransferEngine};
    use crate::processing::resources::tests::layout;
    use tokio::sync::oneshot;

    type SimProc = CfarProc<SoftwareCfarEngine, SoftwareTransferEngine>;

    fn dynamic() -> DynamicConfig {
        DynamicConfig {
            cfar_range: CfarConfig::new(1, 1, 2.0),
            cfar_doppler: CfarConfig::new(1, 1, 2.0),
            fov_range: FovConfig::new(0.0, 3.0),
            fov_doppler: FovConfig::new(-2.0, 1.0),
        }
    }

    fn proc_config(static_cfg: StaticConfig, capacity: usize) -> CfarProcConfig {
        CfarProcConfig {
            static_cfg,
            dynamic: dynamic(),
            resources: layout(&static_cfg, capacity),
        }
    }

    fn configured(static_cfg: StaticConfig, capacity: usize) -> SimProc {
        let mut session = CfarProc::init(InitParams::new(
            SoftwareCfarEngine::default(),
            SoftwareTransferEngine::new(4),
        ))
        .unwrap();
        session.config(proc_config(static_cfg, capacity)).unwrap();
        session
    }

    fn single_target() -> DetMatrix {
        let mut matrix = DetMatrix::filled(4, 4, 10);
        matrix.set(2, 1, 100);
        matrix
    }

    struct Buffers {
        bitmask: Bitmask,
        list: Vec<FinalDetection>,
    }

    impl Buffers {
        fn new(cells: usize, list_len: usize) -> Self {
            Self {
                bitmask: Bitmask::for_cells(cells),
                list: vec![FinalDetection::default(); list_len],
            }
        }

        fn frame<'a>(&'a mut self, matrix: &'a DetMatrix) -> FrameBuffers<'a> {
            FrameBuffers {
                det_matrix: matrix,
                bitmask: &mut self.bitmask,
                det_list: &mut self.list,
            }
        }
    }

    #[tokio::test]
    async fn single_injected_target_is_reported_once() {
        let mut session = configured(StaticConfig::new(4, 4, 1.0, 1.0), 8);
        let matrix = single_target();
        let mut buffers = Buffers::new(16, 8);

        let out = session.process(buffers.frame(&matrix)).await.unwrap();
        assert_eq!(out.num_detections, 1);
        assert_eq!(out.stats.num_process, 1);
        let det = buffers.list[0];
        assert_eq!(det.cell(), (2, 1));
        assert_eq!(det.range, 2.0);
        assert_eq!(det.velocity, 1.0);
        assert_eq!(det.noise, 10.0);
        assert_eq!(det.snr, 10.0);
        assert_eq!(session.metrics().detections, 1);
    }

    #[tokio::test]
    async fn range_fov_below_target_excludes_it() {
        let mut session = configured(StaticConfig::new(4, 4, 1.0, 1.0), 8);
        session
            .control(ControlCommand::FovRangeCfg(FovConfig::new(0.0, 1.5)))
            .unwrap();
        let matrix = single_target();
        let mut buffers = Buffers::new(16, 8);
        let out = session.process(buffers.frame(&matrix)).await.unwrap();
        assert_eq!(out.num_detections, 0);
    }

    #[tokio::test]
    async fn doppler_only_hits_are_not_reported() {
        let mut session = configured(StaticConfig::new(4, 4, 1.0, 1.0), 8);
        // A stripe along range: every row peaks at Doppler bin 1, columns are flat.
        let mut matrix = DetMatrix::filled(4, 4, 10);
        for r in 0..4 {
            matrix.set(r, 1, 100);
        }
        let mut buffers = Buffers::new(16, 8);
        let out = session.process(buffers.frame(&matrix)).await.unwrap();
        assert_eq!(out.num_detections, 0);
        // The unconfirmed Doppler hits remain in the scratch mask.
        assert_eq!(buffers.bitmask.count_ones(), 4);
    }

    #[tokio::test]
    async fn detection_list_saturates_without_error() {
        let static_cfg = StaticConfig::new(16, 8, 1.0, 1.0);
        let mut session = configured(static_cfg, 3);
        session
            .control(ControlCommand::FovRangeCfg(FovConfig::new(0.0, 20.0)))
            .unwrap();
        session
            .control(ControlCommand::FovDopplerCfg(FovConfig::new(-4.0, 4.0)))
            .unwrap();

        let mut matrix = DetMatrix::filled(16, 8, 10);
        for (r, d) in [(2, 2), (5, 5), (8, 2), (11, 5), (14, 2)] {
            matrix.set(r, d, 100);
        }
        let sentinel = FinalDetection {
            range_idx: 999,
            ..Default::default()
        };
        let mut buffers = Buffers::new(128, 4);
        buffers.list[3] = sentinel;

        let out = session.process(buffers.frame(&matrix)).await.unwrap();
        assert_eq!(out.num_detections, 3);
        assert_eq!(buffers.list[3], sentinel);
        assert!(buffers.list[..3].iter().all(|d| matrix.get(d.cell().0, d.cell().1) == Some(100)));
    }

    #[tokio::test]
    async fn process_before_config_is_rejected() {
        let mut session: SimProc = CfarProc::init(InitParams::new(
            SoftwareCfarEngine::default(),
            SoftwareTransferEngine::new(4),
        ))
        .unwrap();
        let matrix = single_target();
        let mut buffers = Buffers::new(16, 8);
        let err = session.process(buffers.frame(&matrix)).await.unwrap_err();
        assert_eq!(err.code(), -1);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn invalid_resources_keep_the_session_unconfigured() {
        let mut session: SimProc = CfarProc::init(InitParams::new(
            SoftwareCfarEngine::default(),
            SoftwareTransferEngine::new(4),
        ))
        .unwrap();
        let mut cfg = proc_config(StaticConfig::new(4, 4, 1.0, 1.0), 8);
        cfg.resources.hwa_mem_out_doppler.address += 2;
        assert_eq!(session.config(cfg).unwrap_err().code(), -14);
        assert_eq!(session.config(cfg).unwrap_err().code(), -14);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[tokio::test]
    async fn transfer_timeout_fails_the_frame_only() {
        let mut session = CfarProc::init(InitParams {
            accelerator: SoftwareCfarEngine::default(),
            transfer: SoftwareTransferEngine::stalled(4),
            wait_timeout: Duration::from_millis(10),
        })
        .unwrap();
        let static_cfg = StaticConfig::new(4, 4, 1.0, 1.0);
        session.config(proc_config(static_cfg, 8)).unwrap();

        let matrix = single_target();
        let mut buffers = Buffers::new(16, 8);
        let err = session.process(buffers.frame(&matrix)).await.unwrap_err();
        assert!(matches!(err, CfarError::TransferTimeout { .. }));
        assert_eq!(session.state(), SessionState::Configured);
        assert!(buffers.list.iter().all(|d| *d == FinalDetection::default()));
        assert_eq!(session.metrics().timeouts, 1);

        // Hand the hardware back, unstick the engine and start over.
        let (accelerator, mut transfer) = session.deinit();
        transfer.set_stalled(false);
        let mut session = CfarProc::init(InitParams::new(accelerator, transfer)).unwrap();
        session.config(proc_config(static_cfg, 8)).unwrap();
        let out = session.process(buffers.frame(&matrix)).await.unwrap();
        assert_eq!(out.num_detections, 1);
    }

    /// Delegates to the software engine but claims every pass overflowed.
    struct OverflowingEngine(SoftwareCfarEngine);

    impl CfarAccelerator for OverflowingEngine {
        fn capabilities(&self) -> HwaCapabilities {
            self.0.capabilities()
        }
        fn memory(&self) -> &HwaMemory {
            self.0.memory()
        }
        fn memory_mut(&mut self) -> &mut HwaMemory {
            self.0.memory_mut()
        }
        fn configure(&mut self, start_idx: usize, sets: &[ParamSet]) -> CfarResult<()> {
            self.0.configure(start_idx, sets)
        }
        fn start(&mut self, _param_set_idx: usize) -> CfarResult<oneshot::Receiver<PassReport>> {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(PassReport {
                records: 0,
                overflowed: true,
            });
            Ok(rx)
        }
    }

    /// Accepts every pass but never signals completion.
    struct StuckEngine {
        inner: SoftwareCfarEngine,
        held: Vec<oneshot::Sender<PassReport>>,
    }

    impl CfarAccelerator for StuckEngine {
        fn capabilities(&self) -> HwaCapabilities {
            self.inner.capabilities()
        }
        fn memory(&self) -> &HwaMemory {
            self.inner.memory()
        }
        fn memory_mut(&mut self) -> &mut HwaMemory {
            self.inner.memory_mut()
        }
        fn configure(&mut self, start_idx: usize, sets: &[ParamSet]) -> CfarResult<()> {
            self.inner.configure(start_idx, sets)
        }
        fn start(&mut self, _param_set_idx: usize) -> CfarResult<oneshot::Receiver<PassReport>> {
            let (tx, rx) = oneshot::channel();
            self.held.push(tx);
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn pass_timeout_fails_the_frame_only() {
        let engine = StuckEngine {
            inner: SoftwareCfarEngine::default(),
            held: Vec::new(),
        };
        let mut session = CfarProc::init(InitParams {
            accelerator: engine,
            transfer: SoftwareTransferEngine::new(4),
            wait_timeout: Duration::from_millis(10),
        })
        .unwrap();
        session
            .config(proc_config(StaticConfig::new(4, 4, 1.0, 1.0), 8))
            .unwrap();

        let matrix = single_target();
        let mut buffers = Buffers::new(16, 8);
        let err = session.process(buffers.frame(&matrix)).await.unwrap_err();
        assert!(matches!(
            err,
            CfarError::PassTimeout {
                direction: Direction::Doppler,
                ..
            }
        ));
        assert_eq!(err.code(), -41);
        assert_eq!(session.state(), SessionState::Configured);
        assert!(buffers.list.iter().all(|d| *d == FinalDetection::default()));
        assert_eq!(session.metrics().timeouts, 1);
    }

    #[tokio::test]
    async fn internal_error_latches_the_session() {
        let mut session = CfarProc::init(InitParams::new(
            OverflowingEngine(SoftwareCfarEngine::default()),
            SoftwareTransferEngine::new(4),
        ))
        .unwrap();
        session
            .config(proc_config(StaticConfig::new(4, 4, 1.0, 1.0), 8))
            .unwrap();

        let matrix = single_target();
        let mut buffers = Buffers::new(16, 8);
        let err = session.process(buffers.frame(&matrix)).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(session.state(), SessionState::Faulted);

        let again = session.process(buffers.frame(&matrix)).await.unwrap_err();
        assert_eq!(again.code(), -20);
        let control = session
            .control(ControlCommand::FovRangeCfg(FovConfig::new(0.0, 1.0)))
            .unwrap_err();
        assert_eq!(control.code(), -20);
    }

    #[test]
    fn unsupported_averaging_mode_is_not_implemented() {
        let engine = SoftwareCfarEngine::default().with_capabilities(HwaCapabilities {
            num_param_sets: 4,
            averaging_modes: vec![AveragingMode::CellAveraging],
            supports_cyclic: false,
        });
        let mut session =
            CfarProc::init(InitParams::new(engine, SoftwareTransferEngine::new(4))).unwrap();
        session
            .config(proc_config(StaticConfig::new(4, 4, 1.0, 1.0), 8))
            .unwrap();

        let mut cfar = CfarConfig::new(1, 1, 2.0);
        cfar.averaging = AveragingMode::SmallestOf;
        let err = session.control(ControlCommand::CfarRangeCfg(cfar)).unwrap_err();
        assert_eq!(err.code(), -30);
        assert_eq!(
            session.dynamic_config().map(|d| d.cfar_range.averaging),
            Some(AveragingMode::CellAveraging)
        );
    }

    #[tokio::test]
    async fn raised_threshold_takes_effect_next_frame() {
        let mut session = configured(StaticConfig::new(4, 4, 1.0, 1.0), 8);
        let matrix = single_target();
        let mut buffers = Buffers::new(16, 8);
        assert_eq!(
            session.process(buffers.frame(&matrix)).await.unwrap().num_detections,
            1
        );

        session
            .control(ControlCommand::CfarDopplerCfg(CfarConfig::new(1, 1, 20.0)))
            .unwrap();
        let out = session.process(buffers.frame(&matrix)).await.unwrap();
        assert_eq!(out.num_detections, 0);
        assert_eq!(out.stats.num_process, 2);
    }
}
