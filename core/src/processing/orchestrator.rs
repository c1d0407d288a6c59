use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::dpif::detmatrix::DetMatrix;
use crate::hwa::accelerator::CfarAccelerator;
use crate::hwa::transfer::TransferEngine;
use crate::prelude::{CfarError, CfarResult};
use crate::processing::resources::ResourceManager;
use crate::telemetry::log::LogManager;

/// Suspends until `done` fires or `limit` elapses. A completion source that
/// goes away without firing is an internal fault, not a timeout.
pub(crate) async fn wait_for<T>(
    done: oneshot::Receiver<T>,
    limit: Duration,
    on_timeout: impl FnOnce() -> CfarError,
) -> CfarResult<T> {
    match timeout(limit, done).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(CfarError::Internal(
            "completion signal dropped before firing".into(),
        )),
        Err(_) => Err(on_timeout()),
    }
}

/// Pages the detection matrix into accelerator scratch and triggers the accelerator.
pub struct TransferOrchestrator {
    timeout: Duration,
    logger: LogManager,
}

impl TransferOrchestrator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            logger: LogManager::new("transfer"),
        }
    }

    /// Issues every page back to back, then waits for each to land in order
    /// and fires the signature channel. Returns the time spent waiting.
    pub async fn page_in<A, T>(
        &self,
        transfer: &mut T,
        accelerator: &mut A,
        resources: &ResourceManager,
        matrix: &DetMatrix,
    ) -> CfarResult<Duration>
    where
        A: CfarAccelerator,
        T: TransferEngine,
    {
        let samples = matrix.as_slice().ok_or_else(|| {
            CfarError::InvalidFormat("detection matrix storage is not contiguous".into())
        })?;
        let channels = resources.channels();

        let mut in_flight = Vec::with_capacity(resources.pages().len());
        for page in resources.pages() {
            let block = samples
                .get(page.first_sample..page.first_sample + page.num_samples)
                .ok_or_else(|| {
                    CfarError::Internal(format!(
                        "page at sample {} runs past the matrix",
                        page.first_sample
                    ))
                })?;
            in_flight.push(transfer.submit(
                channels.data_in,
                block,
                page.dest,
                accelerator.memory_mut(),
            )?);
        }

        let limit_ms = self.timeout.as_millis() as u64;
        let started = Instant::now();
        for done in in_flight {
            wait_for(done, self.timeout, || CfarError::TransferTimeout {
                channel: channels.data_in,
                timeout_ms: limit_ms,
            })
            .await?;
        }
        let trigger = transfer.signal(channels.signature)?;
        wait_for(trigger, self.timeout, || CfarError::TransferTimeout {
            channel: channels.signature,
            timeout_ms: limit_ms,
        })
        .await?;

        let waited = started.elapsed();
        self.logger.detail(&format!(
            "paged {} block(s) into scratch, waited {:?}",
            resources.pages().len(),
            waited
        ));
        Ok(waited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpif::config::StaticConfig;
    use crate::hwa::memory::{MemRegion, DEFAULT_BANK_SIZE};
    use crate::hwa::sim::{SoftwareCfarEngine, SoftwareTransferEngine};
    use crate::processing::resources::tests::layout;

    #[tokio::test]
    async fn matrix_lands_in_input_region() {
        let cfg = StaticConfig::new(8, 4, 1.0, 1.0);
        let mut res = layout(&cfg, 4);
        res.hwa_mem_input = MemRegion::new(64, 64);
        let manager = ResourceManager::new(res, &cfg, DEFAULT_BANK_SIZE);
        let mut matrix = DetMatrix::filled(8, 4, 3);
        matrix.set(7, 3, 99);

        let mut engine = SoftwareCfarEngine::default();
        let mut transfer = SoftwareTransferEngine::new(2);
        TransferOrchestrator::new(Duration::from_millis(50))
            .page_in(&mut transfer, &mut engine, &manager, &matrix)
            .await
            .unwrap();

        let landed = engine.memory().read_u16s(MemRegion::new(64, 64)).unwrap();
        assert_eq!(landed.len(), 32);
        assert_eq!(landed[31], 99);
        assert!(landed[..31].iter().all(|&v| v == 3));
    }

    #[tokio::test]
    async fn stalled_transfer_times_out() {
        let cfg = StaticConfig::new(4, 4, 1.0, 1.0);
        let manager = ResourceManager::new(layout(&cfg, 4), &cfg, DEFAULT_BANK_SIZE);
        let matrix = DetMatrix::filled(4, 4, 1);
        let mut engine = SoftwareCfarEngine::default();
        let mut transfer = SoftwareTransferEngine::stalled(2);

        let err = TransferOrchestrator::new(Duration::from_millis(10))
            .page_in(&mut transfer, &mut engine, &manager, &matrix)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CfarError::TransferTimeout {
                channel: 0,
                timeout_ms: 10
            }
        );
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn dropped_completion_is_internal() {
        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);
        let err = wait_for(rx, Duration::from_millis(10), || CfarError::TransferTimeout {
            channel: 0,
            timeout_ms: 10,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CfarError::Internal(_)));
        assert!(err.is_fatal());
    }
}
