use tokio::sync::oneshot;

use crate::hwa::memory::{HwaMemory, MemRegion};
use crate::prelude::CfarResult;

/// Block-transfer engine paging data into accelerator scratch.
///
/// Each submission returns a receiver that fires when the copy has landed.
/// Dropping the sender without firing counts as a failed transfer.
pub trait TransferEngine: Send {
    fn num_channels(&self) -> u8;

    fn submit(
        &mut self,
        channel: u8,
        source: &[u16],
        dest: MemRegion,
        memory: &mut HwaMemory,
    ) -> CfarResult<oneshot::Receiver<()>>;

    /// Fires the signature transfer that hands the landed data to the accelerator.
    fn signal(&mut self, channel: u8) -> CfarResult<oneshot::Receiver<()>>;
}
