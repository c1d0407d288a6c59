pub mod stats;
pub mod window;

pub use stats::StatsHelper;
pub use window::{noise_estimate, scan_line, LineHit};
