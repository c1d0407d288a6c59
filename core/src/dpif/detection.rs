use serde::{Deserialize, Serialize};

/// Confirmed target written to the caller's detection list.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalDetection {
    pub range_idx: u16,
    pub doppler_idx: u16,
    /// Noise estimate from the range-direction pass.
    pub noise: f32,
    /// Linear ratio of the cell magnitude to its noise estimate.
    pub snr: f32,
    pub range: f32,
    pub velocity: f32,
}

impl FinalDetection {
    pub fn cell(&self) -> (usize, usize) {
        (self.range_idx as usize, self.doppler_idx as usize)
    }
}
