//! Append-only experiment ledger.
//!
//! Every saved sweep gets one row in a process-wide CSV file (`logger.csv`)
//! and its own output directory, laid out as:
//!
//! ```text
//! <data_dir>/
//! ├── logger.csv
//! └── <YYYYMMDD>/
//!     └── <YYYYMMDD-HHMMSS>/
//!         └── data_summary.txt
//! ```
//!
//! Rows are never rewritten or deleted. Lookup is a linear scan that returns
//! the first row carrying the requested timestamp.

use crate::config::StorageConfig;
use crate::error::{AppResult, SweepError};
use crate::run::{RunTimestamp, SweepParams, SweepRun};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Ledger column names, in file order.
pub const LEDGER_HEADER: [&str; 8] = [
    "timestamp",
    "start_wavelength_nm",
    "end_wavelength_nm",
    "step_nm",
    "power_532_W",
    "power_probe_W",
    "exposure_time_sec",
    "wait_time_sec",
];

/// One persisted sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Run id.
    pub timestamp: RunTimestamp,
    /// First grid wavelength (nm).
    pub start_wavelength_nm: f64,
    /// Exclusive grid bound (nm).
    pub end_wavelength_nm: f64,
    /// Grid spacing (nm).
    pub step_nm: f64,
    /// 532 nm pump power (W).
    #[serde(rename = "power_532_W", deserialize_with = "optional_power")]
    pub power_532_w: Option<f64>,
    /// Probe power (W).
    #[serde(rename = "power_probe_W", deserialize_with = "optional_power")]
    pub power_probe_w: Option<f64>,
    /// Exposure per acquisition (s).
    pub exposure_time_sec: f64,
    /// Settle delay per step (s).
    pub wait_time_sec: f64,
}

impl LedgerRow {
    /// Sweep parameters stored in this row.
    pub fn params(&self) -> SweepParams {
        SweepParams {
            start_nm: self.start_wavelength_nm,
            end_nm: self.end_wavelength_nm,
            step_nm: self.step_nm,
            exposure_time_sec: self.exposure_time_sec,
            wait_time_sec: self.wait_time_sec,
            pump_power_w: self.power_532_w,
            probe_power_w: self.power_probe_w,
        }
    }
}

impl From<&SweepRun> for LedgerRow {
    fn from(run: &SweepRun) -> Self {
        let p = &run.params;
        Self {
            timestamp: run.timestamp.clone(),
            start_wavelength_nm: p.start_nm,
            end_wavelength_nm: p.end_nm,
            step_nm: p.step_nm,
            power_532_w: p.pump_power_w,
            power_probe_w: p.probe_power_w,
            exposure_time_sec: p.exposure_time_sec,
            wait_time_sec: p.wait_time_sec,
        }
    }
}

/// Empty cells and the literal `None` both mean "not recorded".
fn optional_power<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("None") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Filesystem-backed ledger rooted at a data directory.
#[derive(Debug, Clone)]
pub struct ExperimentLedger {
    data_dir: PathBuf,
    ledger_file: String,
    summary_file: String,
}

impl ExperimentLedger {
    /// Ledger under `data_dir` with the default file names.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let defaults = StorageConfig::default();
        Self {
            data_dir: data_dir.into(),
            ledger_file: defaults.ledger_file,
            summary_file: defaults.summary_file,
        }
    }

    /// Ledger laid out per the storage configuration.
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            data_dir: storage.data_dir.clone(),
            ledger_file: storage.ledger_file.clone(),
            summary_file: storage.summary_file.clone(),
        }
    }

    /// Root data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the shared CSV ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }

    /// Output directory of a run.
    pub fn run_dir(&self, timestamp: &RunTimestamp) -> PathBuf {
        self.data_dir
            .join(timestamp.day_bucket())
            .join(timestamp.as_str())
    }

    /// Summary table location of a run.
    pub fn summary_path(&self, timestamp: &RunTimestamp) -> PathBuf {
        self.run_dir(timestamp).join(&self.summary_file)
    }

    /// Create the run's directory and append its parameters to the ledger.
    ///
    /// Returns the run directory. Fails if the run directory already exists
    /// or if any directory or the ledger file cannot be written.
    pub fn record(&self, run: &SweepRun) -> AppResult<PathBuf> {
        let day_dir = self.data_dir.join(run.timestamp.day_bucket());
        fs::create_dir_all(&day_dir)
            .map_err(SweepError::storage("create day directory", &day_dir))?;

        let run_dir = day_dir.join(run.timestamp.as_str());
        fs::create_dir(&run_dir).map_err(SweepError::storage("create run directory", &run_dir))?;

        let ledger_path = self.ledger_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ledger_path)
            .map_err(SweepError::storage("open ledger", &ledger_path))?;
        let needs_header = file
            .metadata()
            .map_err(SweepError::storage("stat ledger", &ledger_path))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(LEDGER_HEADER)?;
        }
        writer.serialize(LedgerRow::from(run))?;
        writer
            .flush()
            .map_err(SweepError::storage("append to ledger", &ledger_path))?;

        tracing::info!(
            timestamp = %run.timestamp,
            run_dir = %run_dir.display(),
            "Recorded sweep in ledger"
        );
        Ok(run_dir)
    }

    /// First ledger row with this timestamp, or `None`.
    ///
    /// A ledger that does not exist yet holds no runs, so that is `None` too.
    pub fn lookup(&self, timestamp: &RunTimestamp) -> AppResult<Option<LedgerRow>> {
        let Some(mut reader) = self.reader()? else {
            return Ok(None);
        };
        let headers = reader.headers()?.clone();

        for record in reader.records() {
            let record = record?;
            if record.get(0).map(str::trim) != Some(timestamp.as_str()) {
                continue;
            }
            let row: LedgerRow = record.deserialize(Some(&headers))?;
            return Ok(Some(row));
        }
        tracing::debug!(timestamp = %timestamp, "No ledger row for timestamp");
        Ok(None)
    }

    /// All ledger rows in insertion order.
    pub fn entries(&self) -> AppResult<Vec<LedgerRow>> {
        let Some(mut reader) = self.reader()? else {
            return Ok(Vec::new());
        };
        reader
            .deserialize::<LedgerRow>()
            .map(|row| row.map_err(SweepError::from))
            .collect()
    }

    fn reader(&self) -> AppResult<Option<csv::Reader<fs::File>>> {
        let path = self.ledger_path();
        match fs::File::open(&path) {
            Ok(file) => Ok(Some(
                csv::ReaderBuilder::new()
                    .has_headers(true)
                    .trim(csv::Trim::All)
                    .from_reader(file),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SweepError::storage("open ledger", &path)(e)),
        }
    }
}
