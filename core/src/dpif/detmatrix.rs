use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Memory layout declared by the matrix producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetMatrixFormat {
    /// Each range bin holds all of its Doppler bins contiguously.
    #[default]
    RangeMajor,
    DopplerMajor,
}

/// Range-Doppler magnitude matrix produced upstream, read-only for a frame.
///
/// Stored as `num_range_bins x num_doppler_bins` 16-bit samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DetMatrix {
    pub format: DetMatrixFormat,
    data: Array2<u16>,
}

impl DetMatrix {
    pub fn new(format: DetMatrixFormat, data: Array2<u16>) -> Self {
        Self { format, data }
    }

    /// Uniform matrix, convenient for building synthetic scenes.
    pub fn filled(num_range_bins: usize, num_doppler_bins: usize, value: u16) -> Self {
        Self::new(
            DetMatrixFormat::RangeMajor,
            Array2::from_elem((num_range_bins, num_doppler_bins), value),
        )
    }

    pub fn num_range_bins(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_doppler_bins(&self) -> usize {
        self.data.ncols()
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<u16>()
    }

    pub fn get(&self, range_idx: usize, doppler_idx: usize) -> Option<u16> {
        self.data.get((range_idx, doppler_idx)).copied()
    }

    pub fn set(&mut self, range_idx: usize, doppler_idx: usize, value: u16) {
        if let Some(cell) = self.data.get_mut((range_idx, doppler_idx)) {
            *cell = value;
        }
    }

    /// Contiguous samples in range-major order, if the storage allows it.
    pub fn as_slice(&self) -> Option<&[u16]> {
        self.data.as_slice()
    }

    pub fn view(&self) -> ndarray::ArrayView2<'_, u16> {
        self.data.view()
    }
}
