use cfarcore::dpif::FinalDetection;
use cfarcore::telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};

use crate::workflow::runner::WorkflowResult;

/// Latest frame as served on `GET /payload`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DetectionModel {
    pub frame: u32,
    pub detections: Vec<FinalDetection>,
    pub processing_time_us: u64,
    pub wait_time_us: u64,
    pub metrics: MetricsSnapshot,
    pub scenario: Option<String>,
}

impl DetectionModel {
    pub fn from_result(result: &WorkflowResult, scenario: Option<String>) -> Self {
        Self {
            frame: result.frame,
            detections: result.detections.clone(),
            processing_time_us: result.stats.processing_time.as_micros() as u64,
            wait_time_us: result.stats.wait_time.as_micros() as u64,
            metrics: result.metrics,
            scenario,
        }
    }
}
