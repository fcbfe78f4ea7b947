//! Wavelength grid generation.
//!
//! A grid is the half-open arithmetic progression `start, start + step, ...`
//! of every value strictly below `end`. `end` itself is never visited, even
//! when it lies exactly on the grid.

use crate::error::{AppResult, SweepError};

/// Relative slack when counting points, so `(end - start) / step` landing a
/// hair above an integer through rounding does not add a point at `end`.
const COUNT_EPSILON: f64 = 1e-9;

/// Fixed-step wavelength grid over `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavelengthGrid {
    start_nm: f64,
    step_nm: f64,
    len: usize,
}

impl WavelengthGrid {
    /// Build the grid, rejecting non-finite bounds and non-positive steps.
    ///
    /// `end <= start` yields an empty grid.
    pub fn new(start_nm: f64, end_nm: f64, step_nm: f64) -> AppResult<Self> {
        if !start_nm.is_finite() || !end_nm.is_finite() || !step_nm.is_finite() {
            return Err(SweepError::InvalidParameter(format!(
                "grid bounds must be finite (start={start_nm}, end={end_nm}, step={step_nm})"
            )));
        }
        if step_nm <= 0.0 {
            return Err(SweepError::InvalidParameter(format!(
                "step_nm must be positive, got {step_nm}"
            )));
        }

        let span = (end_nm - start_nm) / step_nm;
        let len = if span <= 0.0 {
            0
        } else {
            (span - COUNT_EPSILON * span.max(1.0)).ceil().max(0.0) as usize
        };

        Ok(Self {
            start_nm,
            step_nm,
            len,
        })
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the grid has no points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Wavelength of the `index`-th point, if in range.
    pub fn get(&self, index: usize) -> Option<f64> {
        (index < self.len).then(|| self.start_nm + index as f64 * self.step_nm)
    }

    /// Points in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(move |i| self.start_nm + i as f64 * self.step_nm)
    }

    /// Collect the grid into a vector.
    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_end_on_grid() {
        let grid = WavelengthGrid::new(790.0, 793.0, 1.0).unwrap();
        assert_eq!(grid.to_vec(), vec![790.0, 791.0, 792.0]);
    }

    #[test]
    fn includes_last_point_below_end() {
        let grid = WavelengthGrid::new(800.0, 802.5, 1.0).unwrap();
        assert_eq!(grid.to_vec(), vec![800.0, 801.0, 802.0]);
    }

    #[test]
    fn fractional_step_does_not_overshoot() {
        let grid = WavelengthGrid::new(790.0, 791.0, 0.1).unwrap();
        assert_eq!(grid.len(), 10);
        let last = grid.get(9).unwrap();
        assert!((last - 790.9).abs() < 1e-9);
        assert!(grid.get(10).is_none());
    }

    #[test]
    fn empty_when_end_not_above_start() {
        assert!(WavelengthGrid::new(800.0, 800.0, 1.0).unwrap().is_empty());
        assert!(WavelengthGrid::new(810.0, 800.0, 1.0).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_step() {
        assert!(WavelengthGrid::new(790.0, 793.0, 0.0).is_err());
        assert!(WavelengthGrid::new(790.0, 793.0, -0.5).is_err());
        assert!(WavelengthGrid::new(790.0, f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn points_are_ascending() {
        let grid = WavelengthGrid::new(700.0, 900.0, 2.5).unwrap();
        let points = grid.to_vec();
        assert_eq!(points.len(), 80);
        assert!(points.windows(2).all(|w| w[0] < w[1]));
        assert!(points.iter().all(|&p| p < 900.0));
    }
}
