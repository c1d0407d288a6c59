pub mod accelerator;
pub mod memory;
pub mod sim;
pub mod transfer;

pub use accelerator::{
    CfarAccelerator, HwaCapabilities, IntermediateDetection, ParamSet, PassReport,
    CFAR_DET_RECORD_BYTES,
};
pub use memory::{HwaMemory, MemRegion};
pub use sim::{SoftwareCfarEngine, SoftwareTransferEngine};
pub use transfer::TransferEngine;
