pub mod bitmask;
pub mod config;
pub mod detection;
pub mod detmatrix;

pub use bitmask::Bitmask;
pub use config::{
    AveragingMode, CfarConfig, ControlCommand, Direction, DynamicConfig, FovConfig, StaticConfig,
};
pub use detection::FinalDetection;
pub use detmatrix::{DetMatrix, DetMatrixFormat};
