use serde::{Deserialize, Serialize};
use std::fmt;

/// Scan direction of a CFAR pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Scans each range row across all Doppler bins.
    Doppler,
    /// Scans each Doppler column across all range bins.
    Range,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Doppler => f.write_str("Doppler"),
            Direction::Range => f.write_str("range"),
        }
    }
}

/// How the two training half-windows are combined into one noise estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AveragingMode {
    #[default]
    CellAveraging,
    GreatestOf,
    SmallestOf,
}

/// CFAR window geometry and threshold for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CfarConfig {
    pub guard_cells: usize,
    pub training_cells: usize,
    pub threshold_scale: f32,
    #[serde(default)]
    pub averaging: AveragingMode,
    #[serde(default)]
    pub cyclic: bool,
    #[serde(default)]
    pub peak_grouping: bool,
}

impl CfarConfig {
    pub fn new(guard_cells: usize, training_cells: usize, threshold_scale: f32) -> Self {
        Self {
            guard_cells,
            training_cells,
            threshold_scale,
            averaging: AveragingMode::CellAveraging,
            cyclic: false,
            peak_grouping: false,
        }
    }

    /// Cells on one side of the CUT covered by guard plus training.
    pub fn half_span(&self) -> usize {
        self.guard_cells + self.training_cells
    }
}

/// Inclusive field-of-view bounds in physical units (m or m/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FovConfig {
    pub min: f32,
    pub max: f32,
}

impl FovConfig {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Session-lifetime geometry of the detection matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub num_range_bins: usize,
    pub num_doppler_bins: usize,
    pub log2_num_doppler_bins: u8,
    /// Meters per range bin.
    pub range_step: f32,
    /// Meters per second per Doppler bin.
    pub doppler_step: f32,
}

impl StaticConfig {
    pub fn new(num_range_bins: usize, num_doppler_bins: usize, range_step: f32, doppler_step: f32) -> Self {
        Self {
            num_range_bins,
            num_doppler_bins,
            log2_num_doppler_bins: num_doppler_bins.max(1).trailing_zeros() as u8,
            range_step,
            doppler_step,
        }
    }

    pub fn num_cells(&self) -> usize {
        self.num_range_bins * self.num_doppler_bins
    }

    /// Length of one scan line for a pass in `direction`.
    pub fn line_len(&self, direction: Direction) -> usize {
        match direction {
            Direction::Doppler => self.num_doppler_bins,
            Direction::Range => self.num_range_bins,
        }
    }

    pub fn range_meters(&self, range_idx: usize) -> f32 {
        range_idx as f32 * self.range_step
    }

    /// Doppler bins in the upper half of the spectrum are negative velocities.
    pub fn velocity(&self, doppler_idx: usize) -> f32 {
        let signed = if doppler_idx >= self.num_doppler_bins / 2 {
            doppler_idx as i64 - self.num_doppler_bins as i64
        } else {
            doppler_idx as i64
        };
        signed as f32 * self.doppler_step
    }
}

/// Per-frame tunables, updated between frames through the control interface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicConfig {
    pub cfar_range: CfarConfig,
    pub cfar_doppler: CfarConfig,
    pub fov_range: FovConfig,
    pub fov_doppler: FovConfig,
}

impl DynamicConfig {
    pub fn cfar(&self, direction: Direction) -> &CfarConfig {
        match direction {
            Direction::Doppler => &self.cfar_doppler,
            Direction::Range => &self.cfar_range,
        }
    }
}

/// Runtime reconfiguration commands accepted between frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "arg", rename_all = "snake_case")]
pub enum ControlCommand {
    CfarRangeCfg(CfarConfig),
    CfarDopplerCfg(CfarConfig),
    FovRangeCfg(FovConfig),
    FovDopplerCfg(FovConfig),
}
