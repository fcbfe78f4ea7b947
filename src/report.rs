//! Text reports for recorded sweeps.
//!
//! Joins a run's ledger row with its summary table. A run whose sweep died
//! before the first point completed has a ledger row but no table; it reports
//! with zero points.

use crate::error::AppResult;
use crate::ledger::{ExperimentLedger, LedgerRow};
use crate::run::RunTimestamp;
use crate::summary::SweepResult;
use std::fmt;

/// Parameters and results of one recorded run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Ledger row for the run
    pub row: LedgerRow,
    /// Completed points, possibly empty
    pub result: SweepResult,
}

impl RunReport {
    /// Load the report for `timestamp`, or `None` if the ledger has no such run.
    pub fn load(ledger: &ExperimentLedger, timestamp: &RunTimestamp) -> AppResult<Option<Self>> {
        let Some(row) = ledger.lookup(timestamp)? else {
            return Ok(None);
        };
        let path = ledger.summary_path(timestamp);
        let result = if path.exists() {
            SweepResult::read(&path)?
        } else {
            SweepResult::new()
        };
        Ok(Some(Self { row, result }))
    }

    /// Wavelength with the highest count.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.result
            .points()
            .iter()
            .max_by(|a, b| a.total_count.total_cmp(&b.total_count))
            .map(|p| (p.wavelength_nm, p.total_count))
    }
}

fn power(watts: Option<f64>, precision: usize) -> String {
    watts.map_or_else(|| "n/a".to_string(), |w| format!("{w:.precision$} W"))
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.row;
        writeln!(f, "Run {}", r.timestamp)?;
        writeln!(
            f,
            "  Range          = ({:.2}, {:.2}, {}) nm",
            r.start_wavelength_nm, r.end_wavelength_nm, r.step_nm
        )?;
        writeln!(f, "  532nm power    = {}", power(r.power_532_w, 3))?;
        writeln!(f, "  Probe power    = {}", power(r.power_probe_w, 3))?;
        writeln!(
            f,
            "  Exposure time  = {:.0} ms",
            r.exposure_time_sec / 1e-3
        )?;
        writeln!(f, "  Wait time      = {:.2} s", r.wait_time_sec)?;
        writeln!(f, "  Points         = {}", self.result.len())?;
        if let Some((nm, count)) = self.peak() {
            writeln!(f, "  Peak           = {count} counts at {nm:.2} nm")?;
        }
        writeln!(f)?;
        writeln!(f, "  wavelength_nm  total_count")?;
        for p in self.result.points() {
            writeln!(f, "  {:>13.2}  {:>11}", p.wavelength_nm, p.total_count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{SweepParams, SweepRun};
    use tempfile::TempDir;

    fn recorded(tmp: &TempDir) -> (ExperimentLedger, RunTimestamp) {
        let ledger = ExperimentLedger::new(tmp.path());
        let ts = RunTimestamp::parse("20250803-104120").unwrap();
        ledger
            .record(&SweepRun::new(
                ts.clone(),
                SweepParams::new(790.0, 830.0, 1.0, 100e-3, 0.05).with_pump_power(10e-3),
            ))
            .unwrap();
        (ledger, ts)
    }

    #[test]
    fn unknown_run_has_no_report() {
        let tmp = TempDir::new().unwrap();
        let (ledger, _) = recorded(&tmp);
        let other = RunTimestamp::parse("20250803-120000").unwrap();
        assert!(RunReport::load(&ledger, &other).unwrap().is_none());
    }

    #[test]
    fn run_without_summary_reports_zero_points() {
        let tmp = TempDir::new().unwrap();
        let (ledger, ts) = recorded(&tmp);
        let report = RunReport::load(&ledger, &ts).unwrap().unwrap();
        assert!(report.result.is_empty());
        assert!(report.peak().is_none());
        assert!(report.to_string().contains("Points         = 0"));
    }

    #[test]
    fn renders_parameters_and_table() {
        let tmp = TempDir::new().unwrap();
        let (ledger, ts) = recorded(&tmp);
        let mut result = SweepResult::new();
        result.push(790.0, 6000.0);
        result.push(791.0, 9000.0);
        result.push(792.0, 7000.0);
        result.write(&ledger.summary_path(&ts)).unwrap();

        let report = RunReport::load(&ledger, &ts).unwrap().unwrap();
        assert_eq!(report.peak(), Some((791.0, 9000.0)));

        let text = report.to_string();
        assert!(text.contains("Run 20250803-104120"));
        assert!(text.contains("Range          = (790.00, 830.00, 1) nm"));
        assert!(text.contains("532nm power    = 0.010 W"));
        assert!(text.contains("Probe power    = n/a"));
        assert!(text.contains("Exposure time  = 100 ms"));
        assert!(text.contains("Wait time      = 0.05 s"));
        assert!(text.contains("Peak           = 9000 counts at 791.00 nm"));
    }
}
