use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use cfarcore::dpif::{Bitmask, ControlCommand, DetMatrix, FinalDetection};
use cfarcore::hwa::{SoftwareCfarEngine, SoftwareTransferEngine};
use cfarcore::processing::{CfarProc, FrameBuffers, FrameStats, InitParams};
use cfarcore::telemetry::MetricsSnapshot;
use std::sync::Arc;
use tokio::sync::Mutex;

type SoftwareProc = CfarProc<SoftwareCfarEngine, SoftwareTransferEngine>;

pub struct WorkflowResult {
    pub frame: u32,
    pub detections: Vec<FinalDetection>,
    pub stats: FrameStats,
    pub metrics: MetricsSnapshot,
}

/// Session plus the buffers it borrows each frame.
struct SessionSlot {
    session: SoftwareProc,
    bitmask: Bitmask,
    det_list: Vec<FinalDetection>,
}

/// Drives one CFAR session on the software backends. Frames and control
/// commands are serialized through the slot lock.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    slot: Arc<Mutex<SessionSlot>>,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> anyhow::Result<Self> {
        let proc_config = config.to_proc_config()?;
        let accelerator = SoftwareCfarEngine::new(config.num_banks, config.bank_size);
        let params = InitParams {
            accelerator,
            transfer: SoftwareTransferEngine::default(),
            wait_timeout: config.wait_timeout(),
        };
        let mut session = CfarProc::init(params).context("initializing CFAR session")?;
        session
            .config(proc_config)
            .context("configuring CFAR session")?;

        let slot = SessionSlot {
            session,
            bitmask: Bitmask::with_words(proc_config.resources.bitmask_words),
            det_list: vec![FinalDetection::default(); config.det_list_capacity],
        };
        Ok(Self {
            config,
            slot: Arc::new(Mutex::new(slot)),
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub async fn execute(&self, matrix: &DetMatrix) -> anyhow::Result<WorkflowResult> {
        let mut slot = self.slot.lock().await;
        let SessionSlot {
            session,
            bitmask,
            det_list,
        } = &mut *slot;
        let out = session
            .process(FrameBuffers {
                det_matrix: matrix,
                bitmask,
                det_list: det_list.as_mut_slice(),
            })
            .await
            .context("processing detection matrix")?;

        Ok(WorkflowResult {
            frame: out.stats.num_process,
            detections: det_list[..out.num_detections].to_vec(),
            stats: out.stats,
            metrics: session.metrics(),
        })
    }

    pub async fn control(&self, command: ControlCommand) -> anyhow::Result<()> {
        let mut slot = self.slot.lock().await;
        slot.session
            .control(command)
            .with_context(|| format!("applying {command:?}"))
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.slot.lock().await.session.metrics()
    }
}
