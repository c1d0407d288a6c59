use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::prelude::CfarError;

/// Cumulative per-session counters.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Default)]
struct Metrics {
    frames: u64,
    errors: u64,
    timeouts: u64,
    detections: u64,
    processing_time: Duration,
    wait_time: Duration,
}

/// Point-in-time copy of the counters, suitable for export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub frames: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub detections: u64,
    pub processing_time_us: u64,
    pub wait_time_us: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_frame(&self, detections: usize, processing_time: Duration, wait_time: Duration) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames += 1;
            metrics.detections += detections as u64;
            metrics.processing_time += processing_time;
            metrics.wait_time += wait_time;
        }
    }

    pub fn record_error(&self, error: &CfarError) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
            if error.is_recoverable() {
                metrics.timeouts += 1;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            MetricsSnapshot {
                frames: metrics.frames,
                errors: metrics.errors,
                timeouts: metrics.timeouts,
                detections: metrics.detections,
                processing_time_us: metrics.processing_time.as_micros() as u64,
                wait_time_us: metrics.wait_time.as_micros() as u64,
            }
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
