//! Two-direction confirmation of CFAR candidates.
//!
//! Doppler-pass hits are recorded in the shared bitmask. A range-pass hit is
//! confirmed only if its bit is set, and confirming clears the bit, so
//! replaying the same range records never confirms a cell twice.

use log::debug;

use crate::dpif::bitmask::Bitmask;
use crate::dpif::config::{Direction, DynamicConfig, StaticConfig};
use crate::dpif::detection::FinalDetection;
use crate::dpif::detmatrix::DetMatrix;
use crate::hwa::accelerator::IntermediateDetection;
use crate::math::stats::StatsHelper;
use crate::prelude::{CfarError, CfarResult};

/// Result of the confirmation step, staged before it reaches the caller's list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionOutcome {
    pub detections: Vec<FinalDetection>,
    /// Cells flagged by both passes.
    pub confirmed: usize,
    /// Confirmed cells removed by peak grouping.
    pub grouped_out: usize,
    /// Confirmed cells outside the field of view.
    pub out_of_view: usize,
    /// Surviving cells that did not fit in the list.
    pub dropped: usize,
}

fn cell_of(
    record: &IntermediateDetection,
    direction: Direction,
    static_cfg: &StaticConfig,
) -> CfarResult<(usize, usize)> {
    let (range_idx, doppler_idx) = record.cell(direction);
    if range_idx >= static_cfg.num_range_bins || doppler_idx >= static_cfg.num_doppler_bins {
        return Err(CfarError::Internal(format!(
            "{direction} record at ({range_idx}, {doppler_idx}) outside {}x{} matrix",
            static_cfg.num_range_bins, static_cfg.num_doppler_bins
        )));
    }
    Ok((range_idx, doppler_idx))
}

/// Sets one bit per Doppler-pass candidate; returns the number of records applied.
pub fn mark_doppler_hits(
    bitmask: &mut Bitmask,
    static_cfg: &StaticConfig,
    records: &[IntermediateDetection],
) -> CfarResult<usize> {
    for record in records {
        let (range_idx, doppler_idx) = cell_of(record, Direction::Doppler, static_cfg)?;
        if !bitmask.set(range_idx * static_cfg.num_doppler_bins + doppler_idx) {
            return Err(CfarError::Internal(format!(
                "bitmask of {} bits cannot hold cell ({range_idx}, {doppler_idx})",
                bitmask.capacity_bits()
            )));
        }
    }
    Ok(records.len())
}

/// Whether the cell is at least as strong as its neighbours along `direction`.
fn is_local_peak(
    matrix: &DetMatrix,
    range_idx: usize,
    doppler_idx: usize,
    direction: Direction,
    cyclic: bool,
) -> bool {
    let Some(cut) = matrix.get(range_idx, doppler_idx) else {
        return false;
    };
    let (idx, len) = match direction {
        Direction::Range => (range_idx, matrix.num_range_bins()),
        Direction::Doppler => (doppler_idx, matrix.num_doppler_bins()),
    };
    let neighbour = |i: usize| match direction {
        Direction::Range => matrix.get(i, doppler_idx),
        Direction::Doppler => matrix.get(range_idx, i),
    };
    let prev = match idx.checked_sub(1) {
        Some(i) => neighbour(i),
        None if cyclic => neighbour(len - 1),
        None => None,
    };
    let next = if idx + 1 < len {
        neighbour(idx + 1)
    } else if cyclic {
        neighbour(0)
    } else {
        None
    };
    prev.map_or(true, |v| v <= cut) && next.map_or(true, |v| v <= cut)
}

/// Confirms range-pass candidates against the bitmask, applies peak grouping
/// and field-of-view gating, and stages at most `capacity` detections.
pub fn confirm_range_hits(
    bitmask: &mut Bitmask,
    static_cfg: &StaticConfig,
    dynamic: &DynamicConfig,
    matrix: &DetMatrix,
    records: &[IntermediateDetection],
    capacity: usize,
) -> CfarResult<FusionOutcome> {
    let mut outcome = FusionOutcome::default();
    for record in records {
        let (range_idx, doppler_idx) = cell_of(record, Direction::Range, static_cfg)?;
        if !bitmask.take(range_idx * static_cfg.num_doppler_bins + doppler_idx) {
            continue;
        }
        outcome.confirmed += 1;

        let grouped_out = [Direction::Range, Direction::Doppler].iter().any(|&direction| {
            let cfar = dynamic.cfar(direction);
            cfar.peak_grouping
                && !is_local_peak(matrix, range_idx, doppler_idx, direction, cfar.cyclic)
        });
        if grouped_out {
            outcome.grouped_out += 1;
            continue;
        }

        let range = static_cfg.range_meters(range_idx);
        let velocity = static_cfg.velocity(doppler_idx);
        if !dynamic.fov_range.contains(range) || !dynamic.fov_doppler.contains(velocity) {
            outcome.out_of_view += 1;
            continue;
        }

        if outcome.detections.len() == capacity {
            outcome.dropped += 1;
            continue;
        }
        let magnitude = matrix.get(range_idx, doppler_idx).ok_or_else(|| {
            CfarError::Internal(format!("matrix has no cell ({range_idx}, {doppler_idx})"))
        })?;
        let noise = record.noise as f32;
        outcome.detections.push(FinalDetection {
            range_idx: range_idx as u16,
            doppler_idx: doppler_idx as u16,
            noise,
            snr: StatsHelper::snr(magnitude, noise),
            range,
            velocity,
        });
    }
    if outcome.dropped > 0 {
        debug!(
            "detection list saturated at {capacity}, dropped {}",
            outcome.dropped
        );
    }
    Ok(outcome)
}
