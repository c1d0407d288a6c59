//! Two-pass CFAR detection unit for range/Doppler detection matrices.
//!
//! A frame is paged into accelerator scratch memory, scanned along Doppler
//! and then along range, and only cells flagged by both passes that fall in
//! the configured field of view are reported. The accelerator and transfer
//! engine sit behind traits so the same session drives hardware or the
//! software backends in [`hwa::sim`].

pub mod dpif;
pub mod hwa;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{CfarError, CfarResult};
pub use processing::{
    CfarProc, CfarProcConfig, FrameBuffers, HardwareResources, InitParams, OutParams,
    SessionState,
};
