//! One-dimensional cell-averaging CFAR kernel.
//!
//! Edge rule for non-cyclic windows: a side whose guard and training cells
//! would run past the end of the line is dropped and the estimate comes from
//! the other side alone. When neither side fits, the cell is not tested.

use ndarray::ArrayView1;

use crate::dpif::config::{AveragingMode, CfarConfig};
use crate::math::stats::StatsHelper;

/// Cell flagged by a single-direction scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineHit {
    pub cell: usize,
    pub noise: f32,
}

/// Noise estimate for the cell under test at `cut`.
pub fn noise_estimate(line: &ArrayView1<'_, u16>, cut: usize, cfg: &CfarConfig) -> Option<f32> {
    let n = line.len();
    if cut >= n || cfg.training_cells == 0 {
        return None;
    }
    let span = cfg.half_span();

    let (left, right) = if cfg.cyclic {
        if 2 * span + 1 > n {
            return None;
        }
        let left = StatsHelper::mean(
            (cut + n - span..cut + n - cfg.guard_cells).map(|i| line[i % n]),
        );
        let right = StatsHelper::mean(
            (cut + cfg.guard_cells + 1..=cut + span).map(|i| line[i % n]),
        );
        (left, right)
    } else {
        let left = if cut >= span {
            StatsHelper::mean((cut - span..cut - cfg.guard_cells).map(|i| line[i]))
        } else {
            None
        };
        let right = if cut + span < n {
            StatsHelper::mean((cut + cfg.guard_cells + 1..=cut + span).map(|i| line[i]))
        } else {
            None
        };
        (left, right)
    };

    match (left, right) {
        (Some(l), Some(r)) => Some(match cfg.averaging {
            AveragingMode::CellAveraging => (l + r) / 2.0,
            AveragingMode::GreatestOf => l.max(r),
            AveragingMode::SmallestOf => l.min(r),
        }),
        (Some(side), None) | (None, Some(side)) => Some(side),
        (None, None) => None,
    }
}

/// Scans a full line and returns every cell exceeding `noise * threshold_scale`.
pub fn scan_line(line: ArrayView1<'_, u16>, cfg: &CfarConfig) -> Vec<LineHit> {
    (0..line.len())
        .filter_map(|cut| {
            let noise = noise_estimate(&line, cut, cfg)?;
            (line[cut] as f32 > noise * cfg.threshold_scale).then_some(LineHit { cell: cut, noise })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn flat_line_yields_no_hits() {
        let line = arr1(&[10u16; 16]);
        assert!(scan_line(line.view(), &CfarConfig::new(1, 2, 1.5)).is_empty());
    }

    #[test]
    fn peak_in_the_middle_is_detected() {
        let mut values = [10u16; 16];
        values[8] = 80;
        let line = arr1(&values);
        let hits = scan_line(line.view(), &CfarConfig::new(1, 2, 3.0));
        assert_eq!(hits, vec![LineHit { cell: 8, noise: 10.0 }]);
    }

    #[test]
    fn edge_cells_fall_back_to_one_side() {
        let line = arr1(&[90u16, 5, 7, 11, 13]);
        let cfg = CfarConfig::new(1, 1, 2.5);
        // Left side missing: only index 2 trains.
        assert_eq!(noise_estimate(&line.view(), 0, &cfg), Some(7.0));
        // Right side missing: only index 2 trains.
        assert_eq!(noise_estimate(&line.view(), 4, &cfg), Some(7.0));
        assert_eq!(scan_line(line.view(), &cfg), vec![LineHit { cell: 0, noise: 7.0 }]);
    }

    #[test]
    fn short_line_tests_nothing() {
        let line = arr1(&[1u16, 100, 1]);
        let cfg = CfarConfig::new(1, 1, 1.0);
        assert_eq!(noise_estimate(&line.view(), 1, &cfg), None);
        assert!(scan_line(line.view(), &cfg).is_empty());
    }

    #[test]
    fn cyclic_window_wraps_around() {
        let line = arr1(&[50u16, 4, 10, 10, 10, 6]);
        let mut cfg = CfarConfig::new(0, 1, 2.0);
        cfg.cyclic = true;
        // Neighbours of index 0 are index 5 and index 1.
        assert_eq!(noise_estimate(&line.view(), 0, &cfg), Some(5.0));
    }

    #[test]
    fn greatest_and_smallest_of_pick_a_side() {
        let line = arr1(&[2u16, 0, 9, 0, 20]);
        let mut cfg = CfarConfig::new(1, 1, 1.0);
        cfg.averaging = AveragingMode::GreatestOf;
        assert_eq!(noise_estimate(&line.view(), 2, &cfg), Some(20.0));
        cfg.averaging = AveragingMode::SmallestOf;
        assert_eq!(noise_estimate(&line.view(), 2, &cfg), Some(2.0));
        cfg.averaging = AveragingMode::CellAveraging;
        assert_eq!(noise_estimate(&line.view(), 2, &cfg), Some(11.0));
    }
}
