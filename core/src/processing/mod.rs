pub mod adapter;
pub mod fusion;
pub mod orchestrator;
pub mod resources;
pub mod session;
pub mod validator;

pub use adapter::{AcceleratorAdapter, PassOutput};
pub use fusion::{confirm_range_hits, mark_doppler_hits, FusionOutcome};
pub use orchestrator::TransferOrchestrator;
pub use resources::{
    FrameBuffers, HardwareResources, Page, ParamSetWindow, ResourceManager, TransferChannels,
};
pub use session::{
    CfarProc, CfarProcConfig, FrameStats, InitParams, OutParams, SessionState,
    DEFAULT_WAIT_TIMEOUT,
};
pub use validator::{validate_config, TargetLimits};
