//! Per-run summary table of (wavelength, total count) pairs.
//!
//! The table is plain comma-delimited text with no header, one row per
//! completed grid point, loadable by any delimited-text reader. The sweep
//! rewrites the whole table after every step; the write goes to a sibling
//! temporary file which is then renamed over the table, so readers only ever
//! see a complete table.

use crate::error::{AppResult, SweepError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One completed grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryPoint {
    /// Probe wavelength (nm)
    pub wavelength_nm: f64,
    /// Photon count integrated at that wavelength
    pub total_count: f64,
}

/// Ordered results of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepResult {
    points: Vec<SummaryPoint>,
}

impl SweepResult {
    /// Empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a grid point.
    pub fn push(&mut self, wavelength_nm: f64, total_count: f64) {
        self.points.push(SummaryPoint {
            wavelength_nm,
            total_count,
        });
    }

    /// Points in sweep order.
    pub fn points(&self) -> &[SummaryPoint] {
        &self.points
    }

    /// Number of completed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True before the first point completes.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Replace the table at `path` with every point so far.
    pub fn write(&self, path: &Path) -> AppResult<()> {
        let tmp = temp_path(path);
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)?;
            for point in &self.points {
                writer.serialize(point)?;
            }
            writer
                .flush()
                .map_err(SweepError::storage("write summary table", &tmp))?;
        }
        fs::rename(&tmp, path).map_err(SweepError::storage("replace summary table", path))?;
        Ok(())
    }

    /// Load a table written by [`SweepResult::write`].
    pub fn read(path: &Path) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let points = reader
            .deserialize::<SummaryPoint>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { points })
    }
}

impl From<Vec<SummaryPoint>> for SweepResult {
    fn from(points: Vec<SummaryPoint>) -> Self {
        Self { points }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
